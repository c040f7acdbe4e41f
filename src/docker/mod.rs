//! Container supervisor.
//!
//! Owns an explicit registry of every container it created. The registry is
//! authoritative: operations targeting an unregistered id fail fast without
//! touching the underlying runtime. Group quota enforcement and creation are
//! serialized behind one write lock (observe-then-act).

mod runtime;

pub use runtime::{ContainerRuntime, DockerCli};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DockerConfig;
use crate::error::ContainerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Running,
    Exited,
    Dead,
}

/// Registry entry for one supervised container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub group_id: String,
    pub image: String,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    /// Advances only on successful script execution, never on create or
    /// destroy. Drives idle reaping.
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateContainer {
    pub group_id: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecuteScript {
    pub container_id: String,
    pub script: String,
    pub timeout: Option<Duration>,
}

pub struct ContainerSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    config: DockerConfig,
    registry: RwLock<HashMap<String, ContainerRecord>>,
}

impl ContainerSupervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: DockerConfig) -> Self {
        Self {
            runtime,
            config,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Create and start a container for `group_id`, enforcing the per-group
    /// quota. The write lock is held across the quota check and the runtime
    /// call so concurrent creates cannot oversubscribe a group.
    pub async fn create_container(
        &self,
        request: CreateContainer,
    ) -> Result<ContainerRecord, ContainerError> {
        let image = request
            .image
            .unwrap_or_else(|| self.config.default_image.clone());
        let id = format!("{}{}", self.config.container_prefix, Uuid::new_v4());

        let mut registry = self.registry.write().await;
        let in_group = registry
            .values()
            .filter(|c| c.group_id == request.group_id)
            .count();
        if in_group >= self.config.container_limit {
            return Err(ContainerError::limit_reached(
                &request.group_id,
                self.config.container_limit,
            ));
        }

        self.runtime
            .run(&id, &image)
            .await
            .map_err(ContainerError::creation_failed)?;

        let now = Utc::now();
        let record = ContainerRecord {
            id: id.clone(),
            group_id: request.group_id,
            image,
            status: ContainerStatus::Running,
            created_at: now,
            last_used: now,
        };
        registry.insert(id.clone(), record.clone());
        info!(container_id = %id, group_id = %record.group_id, "Container created");
        Ok(record)
    }

    /// Registry contents, optionally filtered by group.
    pub async fn list_containers(
        &self,
        group_id: Option<&str>,
    ) -> Result<Vec<ContainerRecord>, ContainerError> {
        let registry = self.registry.read().await;
        let mut containers: Vec<ContainerRecord> = registry
            .values()
            .filter(|c| group_id.map_or(true, |g| c.group_id == g))
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(containers)
    }

    /// Stop (best-effort) and remove a registered container.
    pub async fn destroy_container(&self, id: &str) -> Result<(), ContainerError> {
        {
            let registry = self.registry.read().await;
            if !registry.contains_key(id) {
                return Err(ContainerError::not_found(id));
            }
        }

        // Stop errors are ignored in favour of best-effort removal; the
        // container may already be stopped or gone.
        if let Err(e) = self.runtime.stop(id).await {
            warn!(container_id = %id, error = %e, "Ignoring stop error during destroy");
        }
        self.runtime
            .remove(id)
            .await
            .map_err(ContainerError::destruction_failed)?;

        self.registry.write().await.remove(id);
        info!(container_id = %id, "Container destroyed");
        Ok(())
    }

    /// Run a shell script inside a registered container, starting it first
    /// when stopped. Resolves with the accumulated stdout+stderr.
    pub async fn execute_script(
        &self,
        request: ExecuteScript,
    ) -> Result<String, ContainerError> {
        let id = &request.container_id;
        {
            let registry = self.registry.read().await;
            if !registry.contains_key(id) {
                return Err(ContainerError::not_found(id));
            }
        }

        let running = self
            .runtime
            .is_running(id)
            .await
            .map_err(ContainerError::execution_failed)?;
        if !running {
            self.runtime
                .start(id)
                .await
                .map_err(ContainerError::execution_failed)?;
        }

        let output = self
            .runtime
            .exec_script(id, &request.script, request.timeout)
            .await
            .map_err(ContainerError::execution_failed)?;

        let mut registry = self.registry.write().await;
        if let Some(record) = registry.get_mut(id) {
            record.status = ContainerStatus::Running;
            record.last_used = Utc::now();
        }
        Ok(output)
    }

    /// Destroy every container idle longer than the configured threshold.
    /// Returns the number destroyed.
    pub async fn cleanup_idle_containers(&self) -> Result<usize, ContainerError> {
        let cutoff = Utc::now()
            - chrono::Duration::milliseconds(self.config.idle_timeout_ms as i64);
        let idle: Vec<String> = {
            let registry = self.registry.read().await;
            registry
                .values()
                .filter(|c| c.last_used < cutoff)
                .map(|c| c.id.clone())
                .collect()
        };

        let mut cleaned = 0;
        for id in idle {
            match self.destroy_container(&id).await {
                Ok(()) => cleaned += 1,
                Err(e) => warn!(container_id = %id, error = %e, "Idle cleanup failed"),
            }
        }
        info!(cleaned, "Idle container cleanup finished");
        Ok(cleaned)
    }

    /// Recursively enumerate files under `path` inside the container and
    /// return the manifest as one string.
    pub async fn ingest_directory(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<String, ContainerError> {
        self.execute_script(ExecuteScript {
            container_id: container_id.to_string(),
            script: format!("find '{}' -type f", path.replace('\'', "'\\''")),
            timeout: None,
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn backdate_last_used(&self, id: &str, age: chrono::Duration) {
        let mut registry = self.registry.write().await;
        if let Some(record) = registry.get_mut(id) {
            record.last_used = Utc::now() - age;
        }
    }
}

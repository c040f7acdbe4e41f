//! Container supervisor operations exposed as tools (`dockerManager.*`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::docker::{ContainerSupervisor, CreateContainer, ExecuteScript};

use super::Tool;

#[derive(Debug, Clone, Copy)]
enum DockerOp {
    CreateContainer,
    DestroyContainer,
    ExecuteScript,
    ListContainers,
    CleanupIdleContainers,
}

const ALL_OPS: &[DockerOp] = &[
    DockerOp::CreateContainer,
    DockerOp::DestroyContainer,
    DockerOp::ExecuteScript,
    DockerOp::ListContainers,
    DockerOp::CleanupIdleContainers,
];

/// One tool per supervisor operation.
pub fn docker_tools(supervisor: Arc<ContainerSupervisor>) -> Vec<Arc<dyn Tool>> {
    ALL_OPS
        .iter()
        .map(|&op| {
            Arc::new(DockerTool {
                op,
                supervisor: supervisor.clone(),
            }) as Arc<dyn Tool>
        })
        .collect()
}

struct DockerTool {
    op: DockerOp,
    supervisor: Arc<ContainerSupervisor>,
}

#[async_trait]
impl Tool for DockerTool {
    fn name(&self) -> &str {
        match self.op {
            DockerOp::CreateContainer => "dockerManager.createContainer",
            DockerOp::DestroyContainer => "dockerManager.destroyContainer",
            DockerOp::ExecuteScript => "dockerManager.executeScript",
            DockerOp::ListContainers => "dockerManager.listContainers",
            DockerOp::CleanupIdleContainers => "dockerManager.cleanupIdleContainers",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            DockerOp::CreateContainer => {
                "Create and start an isolated container for the given group"
            }
            DockerOp::DestroyContainer => "Stop and remove a container",
            DockerOp::ExecuteScript => {
                "Run a shell script inside a container and return its output"
            }
            DockerOp::ListContainers => "List managed containers, optionally by group",
            DockerOp::CleanupIdleContainers => {
                "Destroy containers idle past the configured threshold"
            }
        }
    }

    fn parameters(&self) -> Value {
        match self.op {
            DockerOp::CreateContainer => json!({
                "type": "object",
                "properties": {
                    "groupId": { "type": "string", "description": "Quota group for the container" },
                    "image": { "type": "string", "description": "Image to run (optional)" }
                },
                "required": ["groupId"]
            }),
            DockerOp::DestroyContainer => json!({
                "type": "object",
                "properties": {
                    "containerId": { "type": "string" }
                },
                "required": ["containerId"]
            }),
            DockerOp::ExecuteScript => json!({
                "type": "object",
                "properties": {
                    "containerId": { "type": "string" },
                    "script": { "type": "string", "description": "Shell script to run" },
                    "timeout": { "type": "integer", "description": "Timeout in milliseconds (optional)" }
                },
                "required": ["containerId", "script"]
            }),
            DockerOp::ListContainers => json!({
                "type": "object",
                "properties": {
                    "groupId": { "type": "string", "description": "Filter by group (optional)" }
                }
            }),
            DockerOp::CleanupIdleContainers => json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn call(&self, args: &Value) -> anyhow::Result<Value> {
        match self.op {
            DockerOp::CreateContainer => {
                let record = self
                    .supervisor
                    .create_container(CreateContainer {
                        group_id: args["groupId"].as_str().unwrap_or_default().to_string(),
                        image: args["image"].as_str().map(str::to_string),
                    })
                    .await?;
                Ok(serde_json::to_value(record)?)
            }
            DockerOp::DestroyContainer => {
                let id = args["containerId"].as_str().unwrap_or_default();
                self.supervisor.destroy_container(id).await?;
                Ok(json!({ "destroyed": true, "containerId": id }))
            }
            DockerOp::ExecuteScript => {
                let output = self
                    .supervisor
                    .execute_script(ExecuteScript {
                        container_id: args["containerId"].as_str().unwrap_or_default().to_string(),
                        script: args["script"].as_str().unwrap_or_default().to_string(),
                        timeout: args["timeout"].as_u64().map(Duration::from_millis),
                    })
                    .await?;
                Ok(json!({ "output": output }))
            }
            DockerOp::ListContainers => {
                let containers = self
                    .supervisor
                    .list_containers(args["groupId"].as_str())
                    .await?;
                Ok(serde_json::to_value(containers)?)
            }
            DockerOp::CleanupIdleContainers => {
                let cleaned = self.supervisor.cleanup_idle_containers().await?;
                Ok(json!({ "cleaned": cleaned }))
            }
        }
    }
}

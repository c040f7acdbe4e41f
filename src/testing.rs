//! Test infrastructure: FakeRuntime and a fully wired orchestrator harness.
//!
//! The harness assembles the real store, registry, runner and orchestrator
//! around a scripted model provider and a scripted container runtime, so
//! integration tests exercise the production control flow end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::Orchestrator;
use crate::config::{DockerConfig, LlmConfig};
use crate::docker::{ContainerRuntime, ContainerSupervisor};
use crate::github::GithubService;
use crate::llm::testing::MockProvider;
use crate::llm::LlmRunner;
use crate::store::SessionStore;
use crate::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// FakeRuntime
// ---------------------------------------------------------------------------

/// Scripted container runtime. Records every operation and serves canned
/// exec output; failure flags simulate a broken daemon.
#[derive(Default)]
pub struct FakeRuntime {
    ops: Mutex<Vec<String>>,
    exec_outputs: Mutex<VecDeque<String>>,
    running: Mutex<HashMap<String, bool>>,
    pub fail_run: AtomicBool,
    pub fail_exec: AtomicBool,
    pub fail_stop: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every runtime operation seen so far, in order.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn push_exec_output(&self, output: &str) {
        self.exec_outputs
            .lock()
            .unwrap()
            .push_back(output.to_string());
    }

    /// Mark a container as stopped so the supervisor has to restart it.
    pub fn set_stopped(&self, name: &str) {
        self.running.lock().unwrap().insert(name.to_string(), false);
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, name: &str, image: &str) -> anyhow::Result<()> {
        self.record(format!("run {} {}", name, image));
        if self.fail_run.load(Ordering::SeqCst) {
            anyhow::bail!("no such image");
        }
        self.running.lock().unwrap().insert(name.to_string(), true);
        Ok(())
    }

    async fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        Ok(*self.running.lock().unwrap().get(name).unwrap_or(&false))
    }

    async fn start(&self, name: &str) -> anyhow::Result<()> {
        self.record(format!("start {}", name));
        self.running.lock().unwrap().insert(name.to_string(), true);
        Ok(())
    }

    async fn exec_script(
        &self,
        name: &str,
        script: &str,
        _timeout: Option<std::time::Duration>,
    ) -> anyhow::Result<String> {
        self.record(format!("exec {}: {}", name, script));
        if self.fail_exec.load(Ordering::SeqCst) {
            anyhow::bail!("stream error");
        }
        Ok(self
            .exec_outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ok".to_string()))
    }

    async fn stop(&self, name: &str) -> anyhow::Result<()> {
        self.record(format!("stop {}", name));
        if self.fail_stop.load(Ordering::SeqCst) {
            anyhow::bail!("stop failed");
        }
        self.running.lock().unwrap().insert(name.to_string(), false);
        Ok(())
    }

    async fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.record(format!("remove {}", name));
        self.running.lock().unwrap().remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Retry knobs tuned so failure-path tests finish quickly.
pub fn fast_llm_config(max_retries: u32) -> LlmConfig {
    LlmConfig {
        max_retries,
        initial_retry_delay_ms: 1,
        max_retry_delay_ms: 10,
        retry_backoff_factor: 2,
        ..LlmConfig::default()
    }
}

pub struct TestHarness {
    pub store: Arc<SessionStore>,
    pub provider: Arc<MockProvider>,
    pub runtime: Arc<FakeRuntime>,
    pub supervisor: Arc<ContainerSupervisor>,
    pub orchestrator: Orchestrator,
    _db: tempfile::NamedTempFile,
}

impl TestHarness {
    pub async fn new() -> Self {
        let db = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}", db.path().display());
        let store = Arc::new(SessionStore::connect(&url, false).await.unwrap());

        let runtime = Arc::new(FakeRuntime::new());
        let supervisor = Arc::new(ContainerSupervisor::new(
            runtime.clone(),
            DockerConfig::default(),
        ));
        let github = Arc::new(GithubService::new("test-token"));
        let registry = Arc::new(ToolRegistry::with_default_tools(
            supervisor.clone(),
            github,
        ));

        let provider = Arc::new(MockProvider::new());
        let runner = Arc::new(LlmRunner::new(
            provider.clone(),
            registry,
            fast_llm_config(2),
        ));

        let orchestrator = Orchestrator::new(store.clone(), runner);

        Self {
            store,
            provider,
            runtime,
            supervisor,
            orchestrator,
            _db: db,
        }
    }
}

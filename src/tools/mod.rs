//! Tool registry and dispatcher.
//!
//! Tools declare themselves with a universal `{name, description, parameters}`
//! shape (parameters are JSON-schema objects); the provider adapters translate
//! that into each provider's native tool description. Dispatch validates the
//! model's argument map against the declared schema before the executor runs.

mod docker;
mod github;
mod shell;
mod web_fetch;
mod web_search;

pub use docker::docker_tools;
pub use github::github_tools;
pub use shell::ShellCommandTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::docker::ContainerSupervisor;
use crate::error::{CoreError, ErrorKind};
use crate::github::GithubService;

/// A named side-effecting capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-schema-shaped parameter spec: `{type: "object", properties, required?}`.
    fn parameters(&self) -> Value;
    async fn call(&self, args: &Value) -> anyhow::Result<Value>;
}

/// Routes tool invocations to their executors.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Declaration order, kept stable for prompt construction.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let order: Vec<String> = tools.iter().map(|t| t.name().to_string()).collect();
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self { tools, order }
    }

    /// The full default toolbox: shell, web primitives, and the repository /
    /// container operation families.
    pub fn with_default_tools(
        supervisor: Arc<ContainerSupervisor>,
        github: Arc<GithubService>,
    ) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ShellCommandTool),
            Arc::new(WebFetchTool::new()),
            Arc::new(WebSearchTool::new()),
        ];
        tools.extend(github_tools(github, supervisor.clone()));
        tools.extend(docker_tools(supervisor));
        Self::new(tools)
    }

    /// Universal declarations in registration order.
    pub fn declarations(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters(),
                })
            })
            .collect()
    }

    /// Validate `args` against the tool's declared schema and invoke it.
    pub async fn execute_tool(&self, name: &str, args: &Value) -> anyhow::Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| {
            CoreError::new(ErrorKind::ToolUnknown, format!("Unknown tool: {}", name))
        })?;

        validate_arguments(name, &tool.parameters(), args)?;

        debug!(tool = name, "Dispatching tool call");
        tool.call(args).await
    }
}

/// Check the argument map against a declared parameter schema: required keys
/// must be present, and any declared primitive type must match.
fn validate_arguments(tool: &str, parameters: &Value, args: &Value) -> anyhow::Result<()> {
    let invalid = |detail: String| -> anyhow::Error {
        CoreError::new(
            ErrorKind::ToolArgumentInvalid,
            format!("Invalid arguments for {}: {}", tool, detail),
        )
        .into()
    };

    let Some(map) = args.as_object() else {
        return Err(invalid("arguments must be an object".to_string()));
    };

    if let Some(required) = parameters["required"].as_array() {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !map.contains_key(key) {
                return Err(invalid(format!("missing required argument '{}'", key)));
            }
        }
    }

    if let Some(properties) = parameters["properties"].as_object() {
        for (key, value) in map {
            let Some(expected) = properties.get(key).and_then(|p| p["type"].as_str()) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(invalid(format!(
                    "argument '{}' must be of type {}",
                    key, expected
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests;

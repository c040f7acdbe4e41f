use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::config::DockerConfig;
use crate::docker::ContainerSupervisor;
use crate::error::{error_kind, ErrorKind};
use crate::github::GithubService;
use crate::testing::FakeRuntime;

/// Minimal tool that echoes its arguments back.
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the arguments"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "count": { "type": "integer" }
            },
            "required": ["text"]
        })
    }

    async fn call(&self, args: &Value) -> anyhow::Result<Value> {
        Ok(args.clone())
    }
}

fn registry() -> ToolRegistry {
    ToolRegistry::new(vec![Arc::new(EchoTool)])
}

#[tokio::test]
async fn dispatch_reaches_the_executor() {
    let result = registry()
        .execute_tool("echo", &json!({"text": "hi"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"text": "hi"}));
}

#[tokio::test]
async fn unknown_tool_is_rejected_by_name() {
    let err = registry()
        .execute_tool("unknown_tool", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ToolUnknown));
    assert_eq!(err.to_string(), "Unknown tool: unknown_tool");
}

#[tokio::test]
async fn missing_required_argument_is_invalid() {
    let err = registry()
        .execute_tool("echo", &json!({"count": 2}))
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ToolArgumentInvalid));
    assert!(err.to_string().contains("'text'"));
}

#[tokio::test]
async fn wrong_argument_type_is_invalid() {
    let err = registry()
        .execute_tool("echo", &json!({"text": "hi", "count": "three"}))
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ToolArgumentInvalid));
    assert!(err.to_string().contains("integer"));
}

#[tokio::test]
async fn non_object_arguments_are_invalid() {
    let err = registry()
        .execute_tool("echo", &json!("just a string"))
        .await
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::ToolArgumentInvalid));
}

#[tokio::test]
async fn undeclared_arguments_pass_through() {
    // Extra keys are the model's business; only declared types are checked.
    let result = registry()
        .execute_tool("echo", &json!({"text": "hi", "extra": true}))
        .await
        .unwrap();
    assert_eq!(result["extra"], json!(true));
}

#[tokio::test]
async fn shell_tool_reports_stdout_and_exit_code() {
    let tool = ShellCommandTool;
    let result = tool.call(&json!({"command": "echo hello"})).await.unwrap();
    assert_eq!(result["stdout"], json!("hello\n"));
    assert_eq!(result["exit_code"], json!(0));

    let result = tool.call(&json!({"command": "exit 3"})).await.unwrap();
    assert_eq!(result["exit_code"], json!(3));
}

#[tokio::test]
async fn default_toolbox_declares_the_full_surface() {
    let runtime = Arc::new(FakeRuntime::new());
    let supervisor = Arc::new(ContainerSupervisor::new(
        runtime,
        DockerConfig::default(),
    ));
    let github = Arc::new(GithubService::new("t"));
    let registry = ToolRegistry::with_default_tools(supervisor, github);

    let declarations = registry.declarations();
    let names: Vec<&str> = declarations
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();

    for expected in [
        "run_shell_command",
        "web_fetch",
        "google_web_search",
        "githubService.createRepository",
        "githubService.createPullRequest",
        "githubService.closeIssue",
        "githubService.configureGitClientInContainer",
        "dockerManager.createContainer",
        "dockerManager.destroyContainer",
        "dockerManager.executeScript",
        "dockerManager.listContainers",
        "dockerManager.cleanupIdleContainers",
    ] {
        assert!(names.contains(&expected), "missing declaration: {expected}");
    }

    // Every declaration carries a JSON-schema object parameter spec.
    for declaration in &declarations {
        assert_eq!(declaration["parameters"]["type"], json!("object"));
        assert!(declaration["parameters"]["properties"].is_object());
    }
}

#[tokio::test]
async fn docker_tools_route_into_the_supervisor() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.push_exec_output("done\n");
    let supervisor = Arc::new(ContainerSupervisor::new(
        runtime,
        DockerConfig::default(),
    ));
    let github = Arc::new(GithubService::new("t"));
    let registry = ToolRegistry::with_default_tools(supervisor, github);

    let created = registry
        .execute_tool("dockerManager.createContainer", &json!({"groupId": "g"}))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let output = registry
        .execute_tool(
            "dockerManager.executeScript",
            &json!({"containerId": id, "script": "make build"}),
        )
        .await
        .unwrap();
    assert_eq!(output["output"], json!("done\n"));

    let listed = registry
        .execute_tool("dockerManager.listContainers", &json!({"groupId": "g"}))
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    registry
        .execute_tool("dockerManager.destroyContainer", &json!({"containerId": id}))
        .await
        .unwrap();
    let listed = registry
        .execute_tool("dockerManager.listContainers", &json!({"groupId": "g"}))
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn supervisor_failures_surface_as_tool_errors() {
    let runtime = Arc::new(FakeRuntime::new());
    let supervisor = Arc::new(ContainerSupervisor::new(
        runtime,
        DockerConfig::default(),
    ));
    let github = Arc::new(GithubService::new("t"));
    let registry = ToolRegistry::with_default_tools(supervisor, github);

    let err = registry
        .execute_tool(
            "dockerManager.destroyContainer",
            &json!({"containerId": "ghost"}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Container not found: ghost");
}

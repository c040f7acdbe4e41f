//! Repository-host operations exposed as tools (`githubService.*`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::docker::ContainerSupervisor;
use crate::github::{to_value, GithubService};

use super::Tool;

#[derive(Debug, Clone, Copy)]
enum GithubOp {
    CreateRepository,
    ListRepositories,
    GetRepository,
    CreatePullRequest,
    GetPullRequest,
    UpdatePullRequest,
    ClosePullRequest,
    CreateIssue,
    GetIssue,
    UpdateIssue,
    CloseIssue,
    ConfigureGitClientInContainer,
}

const ALL_OPS: &[GithubOp] = &[
    GithubOp::CreateRepository,
    GithubOp::ListRepositories,
    GithubOp::GetRepository,
    GithubOp::CreatePullRequest,
    GithubOp::GetPullRequest,
    GithubOp::UpdatePullRequest,
    GithubOp::ClosePullRequest,
    GithubOp::CreateIssue,
    GithubOp::GetIssue,
    GithubOp::UpdateIssue,
    GithubOp::CloseIssue,
    GithubOp::ConfigureGitClientInContainer,
];

/// One tool per adapter operation.
pub fn github_tools(
    service: Arc<GithubService>,
    supervisor: Arc<ContainerSupervisor>,
) -> Vec<Arc<dyn Tool>> {
    ALL_OPS
        .iter()
        .map(|&op| {
            Arc::new(GithubTool {
                op,
                service: service.clone(),
                supervisor: supervisor.clone(),
            }) as Arc<dyn Tool>
        })
        .collect()
}

struct GithubTool {
    op: GithubOp,
    service: Arc<GithubService>,
    supervisor: Arc<ContainerSupervisor>,
}

fn owner_repo_params(extra: Value) -> Value {
    let mut properties = json!({
        "owner": { "type": "string" },
        "repo": { "type": "string" }
    });
    let mut required = vec![json!("owner"), json!("repo")];
    if let Some(map) = extra.as_object() {
        for (key, schema) in map {
            properties[key] = schema.clone();
            if schema["required"] == json!(true) {
                required.push(json!(key));
            }
        }
    }
    // The inline "required" marker is our own shorthand; strip it from the
    // emitted schema.
    if let Some(map) = properties.as_object_mut() {
        for schema in map.values_mut() {
            if let Some(obj) = schema.as_object_mut() {
                obj.remove("required");
            }
        }
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

#[async_trait]
impl Tool for GithubTool {
    fn name(&self) -> &str {
        match self.op {
            GithubOp::CreateRepository => "githubService.createRepository",
            GithubOp::ListRepositories => "githubService.listRepositories",
            GithubOp::GetRepository => "githubService.getRepository",
            GithubOp::CreatePullRequest => "githubService.createPullRequest",
            GithubOp::GetPullRequest => "githubService.getPullRequest",
            GithubOp::UpdatePullRequest => "githubService.updatePullRequest",
            GithubOp::ClosePullRequest => "githubService.closePullRequest",
            GithubOp::CreateIssue => "githubService.createIssue",
            GithubOp::GetIssue => "githubService.getIssue",
            GithubOp::UpdateIssue => "githubService.updateIssue",
            GithubOp::CloseIssue => "githubService.closeIssue",
            GithubOp::ConfigureGitClientInContainer => {
                "githubService.configureGitClientInContainer"
            }
        }
    }

    fn description(&self) -> &str {
        match self.op {
            GithubOp::CreateRepository => "Create a repository for the authenticated user",
            GithubOp::ListRepositories => "List repositories for the authenticated user",
            GithubOp::GetRepository => "Fetch a repository by owner and name",
            GithubOp::CreatePullRequest => "Open a pull request",
            GithubOp::GetPullRequest => "Fetch a pull request by number",
            GithubOp::UpdatePullRequest => "Update a pull request's title or body",
            GithubOp::ClosePullRequest => "Close a pull request",
            GithubOp::CreateIssue => "Open an issue",
            GithubOp::GetIssue => "Fetch an issue by number",
            GithubOp::UpdateIssue => "Update an issue's title or body",
            GithubOp::CloseIssue => "Close an issue",
            GithubOp::ConfigureGitClientInContainer => {
                "Install git identity and credentials inside a container"
            }
        }
    }

    fn parameters(&self) -> Value {
        match self.op {
            GithubOp::CreateRepository => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "private": { "type": "boolean" }
                },
                "required": ["name"]
            }),
            GithubOp::ListRepositories => json!({
                "type": "object",
                "properties": {}
            }),
            GithubOp::GetRepository => owner_repo_params(json!({})),
            GithubOp::CreatePullRequest => owner_repo_params(json!({
                "title": { "type": "string", "required": true },
                "head": { "type": "string", "required": true },
                "base": { "type": "string", "required": true },
                "body": { "type": "string" }
            })),
            GithubOp::GetPullRequest | GithubOp::ClosePullRequest => {
                owner_repo_params(json!({
                    "number": { "type": "integer", "required": true }
                }))
            }
            GithubOp::UpdatePullRequest => owner_repo_params(json!({
                "number": { "type": "integer", "required": true },
                "title": { "type": "string" },
                "body": { "type": "string" }
            })),
            GithubOp::CreateIssue => owner_repo_params(json!({
                "title": { "type": "string", "required": true },
                "body": { "type": "string" }
            })),
            GithubOp::GetIssue | GithubOp::CloseIssue => owner_repo_params(json!({
                "number": { "type": "integer", "required": true }
            })),
            GithubOp::UpdateIssue => owner_repo_params(json!({
                "number": { "type": "integer", "required": true },
                "title": { "type": "string" },
                "body": { "type": "string" }
            })),
            GithubOp::ConfigureGitClientInContainer => json!({
                "type": "object",
                "properties": {
                    "containerId": { "type": "string" },
                    "username": { "type": "string" },
                    "token": { "type": "string" }
                },
                "required": ["containerId", "username", "token"]
            }),
        }
    }

    async fn call(&self, args: &Value) -> anyhow::Result<Value> {
        let owner = args["owner"].as_str().unwrap_or_default();
        let repo = args["repo"].as_str().unwrap_or_default();
        let number = args["number"].as_u64().unwrap_or_default();
        let title = args["title"].as_str();
        let body = args["body"].as_str();

        match self.op {
            GithubOp::CreateRepository => {
                let created = self
                    .service
                    .create_repository(
                        args["name"].as_str().unwrap_or_default(),
                        args["description"].as_str(),
                        args["private"].as_bool().unwrap_or(false),
                    )
                    .await?;
                Ok(to_value(&created))
            }
            GithubOp::ListRepositories => {
                Ok(to_value(&self.service.list_repositories().await?))
            }
            GithubOp::GetRepository => {
                match self.service.get_repository(owner, repo).await? {
                    Some(found) => Ok(to_value(&found)),
                    None => Ok(Value::Null),
                }
            }
            GithubOp::CreatePullRequest => {
                let pr = self
                    .service
                    .create_pull_request(
                        owner,
                        repo,
                        title.unwrap_or_default(),
                        args["head"].as_str().unwrap_or_default(),
                        args["base"].as_str().unwrap_or_default(),
                        body,
                    )
                    .await?;
                Ok(to_value(&pr))
            }
            GithubOp::GetPullRequest => {
                Ok(to_value(&self.service.get_pull_request(owner, repo, number).await?))
            }
            GithubOp::UpdatePullRequest => Ok(to_value(
                &self
                    .service
                    .update_pull_request(owner, repo, number, title, body)
                    .await?,
            )),
            GithubOp::ClosePullRequest => {
                Ok(to_value(&self.service.close_pull_request(owner, repo, number).await?))
            }
            GithubOp::CreateIssue => Ok(to_value(
                &self
                    .service
                    .create_issue(owner, repo, title.unwrap_or_default(), body)
                    .await?,
            )),
            GithubOp::GetIssue => {
                Ok(to_value(&self.service.get_issue(owner, repo, number).await?))
            }
            GithubOp::UpdateIssue => Ok(to_value(
                &self
                    .service
                    .update_issue(owner, repo, number, title, body)
                    .await?,
            )),
            GithubOp::CloseIssue => {
                Ok(to_value(&self.service.close_issue(owner, repo, number).await?))
            }
            GithubOp::ConfigureGitClientInContainer => {
                let output = self
                    .service
                    .configure_git_client_in_container(
                        &self.supervisor,
                        args["containerId"].as_str().unwrap_or_default(),
                        args["username"].as_str().unwrap_or_default(),
                        args["token"].as_str().unwrap_or_default(),
                    )
                    .await?;
                Ok(json!({ "output": output }))
            }
        }
    }
}

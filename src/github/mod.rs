//! Repository-host adapter.
//!
//! Thin, stateless client over the GitHub REST API. Remote API errors are
//! surfaced as-is (message carries status and body); callers that need them
//! embedded in tool-results wrap them at the dispatch layer.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::docker::{ContainerSupervisor, ExecuteScript};
use crate::utils::truncate_str;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("autodev/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
}

pub struct GithubService {
    client: Client,
    base_url: String,
    token: String,
}

impl GithubService {
    pub fn new(token: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("failed to build HTTP client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("GitHub API error ({}): {}", status, truncate_str(&body, 300))
    }

    // -----------------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------------

    pub async fn create_repository(
        &self,
        name: &str,
        description: Option<&str>,
        private: bool,
    ) -> anyhow::Result<Repository> {
        debug!(name, private, "Creating repository");
        let mut body = json!({ "name": name, "private": private });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let resp = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn list_repositories(&self) -> anyhow::Result<Vec<Repository>> {
        let resp = self
            .request(reqwest::Method::GET, "/user/repos")
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// `None` when the repository does not exist.
    pub async fn get_repository(
        &self,
        owner: &str,
        repo: &str,
    ) -> anyhow::Result<Option<Repository>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/repos/{}/{}", owner, repo))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(resp).await?.json().await?))
    }

    // -----------------------------------------------------------------------
    // Pull requests
    // -----------------------------------------------------------------------

    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
        body: Option<&str>,
    ) -> anyhow::Result<PullRequest> {
        let mut payload = json!({ "title": title, "head": head, "base": base });
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", owner, repo),
            )
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<PullRequest> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
            )
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn update_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> anyhow::Result<PullRequest> {
        let mut payload = json!({});
        if let Some(title) = title {
            payload["title"] = json!(title);
        }
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
            )
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn close_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<PullRequest> {
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
            )
            .json(&json!({ "state": "closed" }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    // -----------------------------------------------------------------------
    // Issues
    // -----------------------------------------------------------------------

    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: Option<&str>,
    ) -> anyhow::Result<Issue> {
        let mut payload = json!({ "title": title });
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/issues", owner, repo),
            )
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> anyhow::Result<Issue> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/issues/{}", owner, repo, number),
            )
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn update_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> anyhow::Result<Issue> {
        let mut payload = json!({});
        if let Some(title) = title {
            payload["title"] = json!(title);
        }
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/issues/{}", owner, repo, number),
            )
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn close_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<Issue> {
        let resp = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{}/{}/issues/{}", owner, repo, number),
            )
            .json(&json!({ "state": "closed" }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    // -----------------------------------------------------------------------
    // In-container git setup
    // -----------------------------------------------------------------------

    /// Install a global git identity and a stored credential for github.com
    /// inside the container, so scripts can push without prompting.
    pub async fn configure_git_client_in_container(
        &self,
        supervisor: &ContainerSupervisor,
        container_id: &str,
        username: &str,
        token: &str,
    ) -> anyhow::Result<String> {
        let script = git_credential_script(username, token);
        let output = supervisor
            .execute_script(ExecuteScript {
                container_id: container_id.to_string(),
                script,
                timeout: None,
            })
            .await?;
        Ok(output)
    }
}

/// Serialize to a tool-result payload; the registry exposes these operations
/// to the model.
pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn git_credential_script(username: &str, token: &str) -> String {
    format!(
        "git config --global user.name {user} && \
         git config --global user.email {email} && \
         git config --global credential.helper store && \
         printf 'https://%s:%s@github.com\\n' {user} {token} > ~/.git-credentials",
        user = shell_quote(username),
        email = shell_quote(&format!("{}@users.noreply.github.com", username)),
        token = shell_quote(token),
    )
}

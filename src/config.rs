//! Runtime configuration.
//!
//! Everything is read from the environment (a `.env` file is loaded by the
//! binary before this runs) into a validated struct. Ranges and defaults are
//! enforced in [`AppConfig::validate`]; construction never panics.

use std::fmt;

use serde::Deserialize;

/// Which model provider family the runner talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Gemini,
    Openai,
    Anthropic,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::Openai => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(LlmProvider::Gemini),
            "openai" => Some(LlmProvider::Openai),
            "anthropic" => Some(LlmProvider::Anthropic),
            _ => None,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model-runner knobs: provider selection, credentials, retry policy.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub gemini_api_key: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    /// Retry budget for transient upstream failures (0–20).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds (100–10000).
    pub initial_retry_delay_ms: u64,
    /// Backoff ceiling in milliseconds (1000–60000).
    pub max_retry_delay_ms: u64,
    /// Backoff multiplier (1–5).
    pub retry_backoff_factor: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            gemini_api_key: String::new(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            max_retries: 10,
            initial_retry_delay_ms: 1_000,
            max_retry_delay_ms: 10_000,
            retry_backoff_factor: 2,
        }
    }
}

impl LlmConfig {
    /// The API key matching the selected provider.
    pub fn active_api_key(&self) -> &str {
        match self.provider {
            LlmProvider::Gemini => &self.gemini_api_key,
            LlmProvider::Openai => &self.openai_api_key,
            LlmProvider::Anthropic => &self.anthropic_api_key,
        }
    }
}

/// Container supervisor knobs.
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Name prefix for created containers.
    pub container_prefix: String,
    /// Per-group container quota.
    pub container_limit: usize,
    /// Idle-reap threshold in milliseconds.
    pub idle_timeout_ms: u64,
    /// Image used when `create_container` omits one.
    pub default_image: String,
    /// Runtime socket override, e.g. `unix:///var/run/docker.sock`.
    pub socket_path: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            container_prefix: "builder6-container-".to_string(),
            container_limit: 5,
            idle_timeout_ms: 600_000,
            default_image: "debian:stable-slim".to_string(),
            socket_path: None,
        }
    }
}

/// Repository-host credentials.
#[derive(Debug, Clone, Default)]
pub struct GithubConfig {
    pub token: String,
}

/// Top-level application configuration consumed by the store, runner,
/// supervisor and adapter.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub github: GithubConfig,
    pub docker: DockerConfig,
    pub database_url: String,
    pub debug_enabled: bool,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Read configuration from the process environment. Unset keys fall back
    /// to their defaults; validation happens separately in [`validate`].
    ///
    /// [`validate`]: AppConfig::validate
    pub fn from_env() -> Self {
        let llm_defaults = LlmConfig::default();
        let docker_defaults = DockerConfig::default();

        Self {
            llm: LlmConfig {
                provider: env_var("LLM_PROVIDER")
                    .and_then(|v| LlmProvider::parse(&v))
                    .unwrap_or_default(),
                gemini_api_key: env_var("GEMINI_API_KEY").unwrap_or_default(),
                openai_api_key: env_var("OPENAI_API_KEY").unwrap_or_default(),
                anthropic_api_key: env_var("ANTHROPIC_API_KEY").unwrap_or_default(),
                max_retries: env_parse("LLM_MAX_RETRIES", llm_defaults.max_retries),
                initial_retry_delay_ms: env_parse(
                    "LLM_INITIAL_RETRY_DELAY",
                    llm_defaults.initial_retry_delay_ms,
                ),
                max_retry_delay_ms: env_parse(
                    "LLM_MAX_RETRY_DELAY",
                    llm_defaults.max_retry_delay_ms,
                ),
                retry_backoff_factor: env_parse(
                    "LLM_RETRY_BACKOFF_FACTOR",
                    llm_defaults.retry_backoff_factor,
                ),
            },
            github: GithubConfig {
                token: env_var("GITHUB_TOKEN").unwrap_or_default(),
            },
            docker: DockerConfig {
                container_prefix: env_var("DOCKER_CONTAINER_PREFIX")
                    .unwrap_or(docker_defaults.container_prefix),
                container_limit: env_parse(
                    "DOCKER_CONTAINER_LIMIT",
                    docker_defaults.container_limit,
                ),
                idle_timeout_ms: env_parse("DOCKER_IDLE_TIMEOUT", docker_defaults.idle_timeout_ms),
                default_image: env_var("DOCKER_DEFAULT_IMAGE")
                    .unwrap_or(docker_defaults.default_image),
                socket_path: env_var("DOCKER_SOCKET_PATH"),
            },
            database_url: env_var("DATABASE_URL").unwrap_or_default(),
            debug_enabled: env_var("DEBUG")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Enforce presence and ranges. Returns every problem found, not just the
    /// first, so a misconfigured deployment can be fixed in one pass.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut problems = Vec::new();

        if self.llm.active_api_key().trim().is_empty() {
            problems.push(format!(
                "missing API key for selected provider '{}'",
                self.llm.provider
            ));
        }
        if self.llm.max_retries > 20 {
            problems.push(format!(
                "LLM_MAX_RETRIES must be 0-20, got {}",
                self.llm.max_retries
            ));
        }
        if !(100..=10_000).contains(&self.llm.initial_retry_delay_ms) {
            problems.push(format!(
                "LLM_INITIAL_RETRY_DELAY must be 100-10000 ms, got {}",
                self.llm.initial_retry_delay_ms
            ));
        }
        if !(1_000..=60_000).contains(&self.llm.max_retry_delay_ms) {
            problems.push(format!(
                "LLM_MAX_RETRY_DELAY must be 1000-60000 ms, got {}",
                self.llm.max_retry_delay_ms
            ));
        }
        if !(1..=5).contains(&self.llm.retry_backoff_factor) {
            problems.push(format!(
                "LLM_RETRY_BACKOFF_FACTOR must be 1-5, got {}",
                self.llm.retry_backoff_factor
            ));
        }
        if self.github.token.trim().is_empty() {
            problems.push("GITHUB_TOKEN must be set".to_string());
        }
        if self.docker.container_limit == 0 {
            problems.push("DOCKER_CONTAINER_LIMIT must be at least 1".to_string());
        }
        if self.database_url.trim().is_empty() {
            problems.push("DATABASE_URL must be set".to_string());
        } else if self.database_url.starts_with("postgresql://") {
            problems.push(
                "DATABASE_URL: postgresql is not supported by this build; \
                 use a sqlite:// URL or sqlite::memory:"
                    .to_string(),
            );
        } else if !self.database_url.starts_with("sqlite:") {
            problems.push(format!(
                "DATABASE_URL must be a sqlite: URL, got '{}'",
                self.database_url
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", problems.join("\n  - "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            llm: LlmConfig {
                provider: LlmProvider::Openai,
                openai_api_key: "sk-test".to_string(),
                ..LlmConfig::default()
            },
            github: GithubConfig {
                token: "ghp_test".to_string(),
            },
            docker: DockerConfig::default(),
            database_url: "sqlite://autodev.db".to_string(),
            debug_enabled: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn missing_provider_key_is_rejected() {
        let mut cfg = valid_config();
        cfg.llm.openai_api_key.clear();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("openai"), "unexpected error: {err}");
    }

    #[test]
    fn retry_ranges_are_enforced() {
        let mut cfg = valid_config();
        cfg.llm.max_retries = 21;
        cfg.llm.initial_retry_delay_ms = 50;
        cfg.llm.retry_backoff_factor = 0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("LLM_MAX_RETRIES"));
        assert!(err.contains("LLM_INITIAL_RETRY_DELAY"));
        assert!(err.contains("LLM_RETRY_BACKOFF_FACTOR"));
    }

    #[test]
    fn postgres_urls_are_rejected() {
        let mut cfg = valid_config();
        cfg.database_url = "postgresql://localhost/autodev".to_string();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("sqlite"));
    }

    #[test]
    fn provider_parse_roundtrip() {
        for p in [
            LlmProvider::Gemini,
            LlmProvider::Openai,
            LlmProvider::Anthropic,
        ] {
            assert_eq!(LlmProvider::parse(p.as_str()), Some(p));
        }
        assert_eq!(LlmProvider::parse("mistral"), None);
    }
}

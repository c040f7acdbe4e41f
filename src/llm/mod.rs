//! Provider-agnostic model runner.
//!
//! The narrow waist is [`ProviderResponse`]: every provider maps its native
//! wire format into `{content, tool_calls, usage}`, and everything above the
//! trait (token budgeting, retry, tool-call dispatch) is provider-blind.

pub mod providers;
#[cfg(test)]
pub mod testing;
pub mod token_limits;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{CoreError, ErrorKind};
use crate::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// Universal shapes
// ---------------------------------------------------------------------------

/// One tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id, unique within one model response.
    pub id: String,
    pub name: String,
    /// Structured argument map, validated against the tool's declared
    /// parameter schema before dispatch.
    pub arguments: Value,
}

/// The dispatched result for one tool call, correlated by id. A failed
/// dispatch carries `{"error": message}` rather than propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallOutcome {
    pub tool_call_id: String,
    pub result: Value,
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A provider's response: content text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

/// Structured response mode requested for a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Free-form text / tool-call behavior.
    #[default]
    Text,
    /// The provider should return a JSON object response.
    JsonObject,
}

/// Per-call provider controls.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub response_mode: ResponseMode,
}

/// Model provider — sends messages + tool declarations, gets back a response.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider family name, e.g. "openai".
    fn name(&self) -> &'static str;

    /// Model used when the caller does not pick one.
    fn default_model(&self) -> &str;

    /// Token count for a prompt. Providers without native counting use the
    /// character approximation of one token per four characters, rounded up.
    fn count_tokens(&self, text: &str, _model: &str) -> usize {
        text.len().div_ceil(4)
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        options: &ChatOptions,
    ) -> anyhow::Result<ProviderResponse>;
}

/// A full generation result with provenance.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Like [`LlmResponse`], plus any tool calls the provider signalled.
#[derive(Debug, Clone)]
pub struct ToolsResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub provider: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Upper bound on the uniform jitter added to each backoff delay.
const RETRY_JITTER_MS: u64 = 1_000;

/// Drives a [`ModelProvider`] with pre-flight token budgeting and
/// retry-with-backoff for transient upstream failure, and dispatches the
/// model's tool calls through the [`ToolRegistry`].
pub struct LlmRunner {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    config: LlmConfig,
    model: String,
}

impl LlmRunner {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        config: LlmConfig,
    ) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            registry,
            config,
            model,
        }
    }

    /// Override the model the runner generates with.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Plain text generation.
    pub async fn generate_content(&self, prompt: &str) -> anyhow::Result<String> {
        let resp = self.generate(prompt, &[], &ChatOptions::default()).await?;
        Ok(resp.content.unwrap_or_default())
    }

    /// Text generation with provenance and usage.
    pub async fn generate_response(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let resp = self.generate(prompt, &[], &ChatOptions::default()).await?;
        Ok(LlmResponse {
            content: resp.content.unwrap_or_default(),
            provider: self.provider.name().to_string(),
            model: self.model.clone(),
            usage: resp.usage,
        })
    }

    /// JSON-mode generation. A response fenced inside a markdown code span is
    /// stripped and the inner text parsed.
    pub async fn generate_json(&self, prompt: &str) -> anyhow::Result<Value> {
        let options = ChatOptions {
            response_mode: ResponseMode::JsonObject,
        };
        let resp = self.generate(prompt, &[], &options).await?;
        let text = resp.content.unwrap_or_default();
        let inner = strip_code_fence(&text);
        serde_json::from_str(inner).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse JSON from model response: {} (text was: {})",
                e,
                crate::utils::truncate_str(&text, 200)
            )
        })
    }

    /// Generation with the registry's tool declarations attached.
    pub async fn generate_with_tools(&self, prompt: &str) -> anyhow::Result<ToolsResponse> {
        let declarations = self.registry.declarations();
        let resp = self
            .generate(prompt, &declarations, &ChatOptions::default())
            .await?;
        Ok(ToolsResponse {
            content: resp.content,
            tool_calls: resp.tool_calls,
            provider: self.provider.name().to_string(),
            model: self.model.clone(),
            usage: resp.usage,
        })
    }

    /// Dispatch every tool call through the registry. Failures become
    /// `{"error": message}` payloads; this never fails as a whole.
    pub async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Vec<ToolCallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.registry.execute_tool(&call.name, &call.arguments).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "Tool dispatch failed");
                    json!({ "error": err.to_string() })
                }
            };
            outcomes.push(ToolCallOutcome {
                tool_call_id: call.id.clone(),
                result,
            });
        }
        outcomes
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn generate(
        &self,
        prompt: &str,
        tools: &[Value],
        options: &ChatOptions,
    ) -> anyhow::Result<ProviderResponse> {
        self.validate_prompt_size(prompt)?;
        let messages = vec![json!({ "role": "user", "content": prompt })];
        self.chat_with_retry(&messages, tools, options).await
    }

    /// Pre-flight size check: fail before any upstream request is issued.
    fn validate_prompt_size(&self, prompt: &str) -> anyhow::Result<()> {
        let tokens = self.provider.count_tokens(prompt, &self.model);
        let limit = token_limits::limit_for_model(&self.model);
        if tokens > limit {
            return Err(CoreError::new(
                ErrorKind::PromptTooLarge,
                format!(
                    "Prompt too large: {} tokens exceeds {} limit of {} tokens",
                    tokens, self.model, limit
                ),
            )
            .into());
        }
        // Non-fatal headroom warning at 80% of the limit.
        if tokens * 10 > limit * 8 {
            warn!(
                tokens,
                limit,
                model = %self.model,
                "Prompt approaching model token limit"
            );
        }
        Ok(())
    }

    async fn chat_with_retry(
        &self,
        messages: &[Value],
        tools: &[Value],
        options: &ChatOptions,
    ) -> anyhow::Result<ProviderResponse> {
        let mut attempt: u32 = 0;
        let mut delay_ms = self.config.initial_retry_delay_ms;

        loop {
            match self
                .provider
                .chat(&self.model, messages, tools, options)
                .await
            {
                Ok(resp) => {
                    debug!(
                        model = %self.model,
                        attempt,
                        has_content = resp.content.is_some(),
                        tool_calls = resp.tool_calls.len(),
                        "Model response received"
                    );
                    return Ok(resp);
                }
                Err(err) if is_transient_upstream(&err) => {
                    if attempt >= self.config.max_retries {
                        return Err(CoreError::new(
                            ErrorKind::ModelUpstreamFatal,
                            format!(
                                "Model upstream still unavailable after {} attempts: {}",
                                attempt + 1,
                                err
                            ),
                        )
                        .into());
                    }
                    attempt += 1;
                    let backoff = delay_ms.min(self.config.max_retry_delay_ms);
                    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                    warn!(
                        attempt,
                        backoff_ms = backoff + jitter,
                        error = %err,
                        "Transient model upstream failure, backing off"
                    );
                    // Small preventive delay smooths burst rates before the
                    // real backoff sleep.
                    tokio::time::sleep(Duration::from_millis(backoff.min(100))).await;
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    delay_ms = backoff
                        .saturating_mul(self.config.retry_backoff_factor as u64)
                        .min(self.config.max_retry_delay_ms);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A failure worth retrying: upstream overload or temporary unavailability.
fn is_transient_upstream(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("503") || msg.contains("Service Unavailable") || msg.contains("overloaded")
}

/// Strip a surrounding markdown code fence (``` or ```json) if present.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

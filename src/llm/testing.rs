//! Programmable test substitute for the model provider.
//!
//! Scripted responses drain in FIFO order; a substring pattern map answers
//! prompt-specific queries; a separate FIFO serves tool-enabled calls; an
//! error queue simulates upstream failure for retry tests. Every call is
//! recorded for assertions.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{ChatOptions, ModelProvider, ProviderResponse, TokenUsage, ToolCall};

/// A recorded call to [`MockProvider::chat`].
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    /// Content of the last user message in the request.
    pub prompt: String,
    pub tool_count: usize,
}

#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    tool_responses: Mutex<VecDeque<ProviderResponse>>,
    patterns: Mutex<Vec<(String, ProviderResponse)>>,
    errors: Mutex<VecDeque<String>>,
    latency: Option<Duration>,
    pub call_log: Mutex<Vec<MockCall>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a response served in FIFO order.
    pub async fn push_response(&self, response: ProviderResponse) {
        self.responses.lock().await.push_back(response);
    }

    /// Queue a response served only to tool-enabled calls, ahead of the main
    /// FIFO.
    pub async fn push_tool_response(&self, response: ProviderResponse) {
        self.tool_responses.lock().await.push_back(response);
    }

    /// Answer any prompt containing `pattern` with `response`. Patterns take
    /// priority over the FIFO queues.
    pub async fn push_pattern(&self, pattern: &str, response: ProviderResponse) {
        self.patterns
            .lock()
            .await
            .push((pattern.to_string(), response));
    }

    /// Queue an upstream failure; drained before any response.
    pub async fn push_error(&self, message: &str) {
        self.errors.lock().await.push_back(message.to_string());
    }

    /// Helper: a text-only response.
    pub fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
        }
    }

    /// Helper: a single-tool-call response with the given correlation id.
    pub fn tool_call_response(id: &str, tool_name: &str, arguments: Value) -> ProviderResponse {
        ProviderResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: tool_name.to_string(),
                arguments,
            }],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
        }
    }

    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }

    /// All prompts seen so far, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.call_log
            .lock()
            .await
            .iter()
            .map(|c| c.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        _options: &ChatOptions,
    ) -> anyhow::Result<ProviderResponse> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m["role"] == json!("user"))
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();

        self.call_log.lock().await.push(MockCall {
            model: model.to_string(),
            prompt: prompt.clone(),
            tool_count: tools.len(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.errors.lock().await.pop_front() {
            anyhow::bail!("{}", message);
        }

        if let Some((_, response)) = self
            .patterns
            .lock()
            .await
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
        {
            return Ok(response.clone());
        }

        if !tools.is_empty() {
            if let Some(response) = self.tool_responses.lock().await.pop_front() {
                return Ok(response);
            }
        }

        if let Some(response) = self.responses.lock().await.pop_front() {
            return Ok(response);
        }

        Ok(Self::text_response("Mock response"))
    }
}

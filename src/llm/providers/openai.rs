//! OpenAI chat-completions adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{ChatOptions, ModelProvider, ProviderResponse, ResponseMode, TokenUsage, ToolCall};

use super::{api_error, build_http_client};

const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: build_http_client(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Universal `{name, description, parameters}` declarations → OpenAI
    /// function-tool wrappers.
    fn convert_tools(tools: &[Value]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| json!({ "type": "function", "function": t }))
            .collect()
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: &[Value],
        options: &ChatOptions,
    ) -> anyhow::Result<ProviderResponse> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::convert_tools(tools));
        }
        if options.response_mode == ResponseMode::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(model, "Calling OpenAI chat completions");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(api_error("OpenAI", status, &text).into());
        }

        let data: Value = serde_json::from_str(&text)?;
        let message = &data["choices"][0]["message"];

        let content = message["content"].as_str().map(str::to_string);
        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for tc in calls {
                // OpenAI encodes arguments as a JSON string.
                let arguments = tc["function"]["arguments"]
                    .as_str()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_else(|| json!({}));
                tool_calls.push(ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_string(),
                    name: tc["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments,
                });
            }
        }

        let usage = data.get("usage").map(|u| TokenUsage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ProviderResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

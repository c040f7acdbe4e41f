//! Anthropic Messages API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{ChatOptions, ModelProvider, ProviderResponse, ResponseMode, TokenUsage, ToolCall};

use super::{api_error, build_http_client};

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: build_http_client(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Chat-style messages → Anthropic messages + top-level system prompt.
    fn convert_messages(messages: &[Value]) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut converted = Vec::new();
        for msg in messages {
            let text = msg["content"].as_str().unwrap_or_default();
            match msg["role"].as_str().unwrap_or("user") {
                "system" => system = Some(text.to_string()),
                role => converted.push(json!({ "role": role, "content": text })),
            }
        }
        (system, converted)
    }

    /// Universal declarations → Anthropic tools (`input_schema` field).
    fn convert_tools(tools: &[Value]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t["name"],
                    "description": t["description"],
                    "input_schema": t["parameters"],
                })
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let (system, mut converted) = Self::convert_messages(messages);

        // JSON prefill: force the assistant turn to begin with "{" so the
        // model completes a bare JSON object, then re-prepend it below.
        let json_prefill = options.response_mode == ResponseMode::JsonObject;
        if json_prefill {
            converted.push(json!({ "role": "assistant", "content": "{" }));
        }

        let mut body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": converted,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(Self::convert_tools(tools));
        }

        debug!(model, "Calling Anthropic messages");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(api_error("Anthropic", status, &text).into());
        }

        let data: Value = serde_json::from_str(&text)?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        if let Some(blocks) = data["content"].as_array() {
            for block in blocks {
                match block["type"].as_str().unwrap_or_default() {
                    "text" => {
                        if let Some(t) = block["text"].as_str() {
                            content.push_str(t);
                        }
                    }
                    "tool_use" => {
                        tool_calls.push(ToolCall {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                        });
                    }
                    _ => {}
                }
            }
        }
        if json_prefill && !content.is_empty() {
            content.insert(0, '{');
        }

        let usage = data.get("usage").map(|u| TokenUsage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ProviderResponse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_lifted_out() {
        let messages = vec![
            json!({"role": "system", "content": "be brief"}),
            json!({"role": "user", "content": "hello"}),
        ];
        let (system, converted) = AnthropicProvider::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["role"], json!("user"));
    }

    #[test]
    fn declarations_use_input_schema() {
        let universal = vec![json!({
            "name": "web_fetch",
            "description": "Fetch a URL",
            "parameters": { "type": "object", "properties": {} }
        })];
        let converted = AnthropicProvider::convert_tools(&universal);
        assert_eq!(converted[0]["name"], json!("web_fetch"));
        assert_eq!(converted[0]["input_schema"]["type"], json!("object"));
        assert!(converted[0].get("parameters").is_none());
    }
}

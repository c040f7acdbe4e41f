//! Google Generative Language API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{ChatOptions, ModelProvider, ProviderResponse, ResponseMode, TokenUsage, ToolCall};

use super::{api_error, build_http_client};

const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: build_http_client(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Chat-style messages → Gemini `contents`. "assistant" maps to the
    /// "model" role; system text becomes a `system_instruction`.
    fn convert_messages(messages: &[Value]) -> (Option<Value>, Vec<Value>) {
        let mut system_instruction = None;
        let mut contents = Vec::new();
        for msg in messages {
            let text = msg["content"].as_str().unwrap_or_default();
            match msg["role"].as_str().unwrap_or("user") {
                "system" => {
                    system_instruction = Some(json!({ "parts": [{ "text": text }] }));
                }
                "assistant" => {
                    contents.push(json!({ "role": "model", "parts": [{ "text": text }] }));
                }
                _ => {
                    contents.push(json!({ "role": "user", "parts": [{ "text": text }] }));
                }
            }
        }
        (system_instruction, contents)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
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
        let (system_instruction, contents) = Self::convert_messages(messages);

        let mut body = json!({ "contents": contents });
        if let Some(system) = system_instruction {
            body["system_instruction"] = system;
        }
        if !tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": tools }]);
        }
        if options.response_mode == ResponseMode::JsonObject {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        debug!(model, "Calling Gemini generateContent");

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, model, self.api_key
            ))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(api_error("Gemini", status, &text).into());
        }

        let data: Value = serde_json::from_str(&text)?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        if let Some(parts) = data["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(t) = part["text"].as_str() {
                    content.push_str(t);
                } else if let Some(fc) = part.get("functionCall") {
                    // Gemini carries no correlation ids; synthesize one per
                    // call, unique within this response.
                    tool_calls.push(ToolCall {
                        id: format!("call_{}", tool_calls.len()),
                        name: fc["name"].as_str().unwrap_or_default().to_string(),
                        arguments: fc.get("args").cloned().unwrap_or_else(|| json!({})),
                    });
                }
            }
        }

        let usage = data.get("usageMetadata").map(|u| TokenUsage {
            input_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
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
    fn roles_map_to_gemini_contents() {
        let messages = vec![
            json!({"role": "system", "content": "be brief"}),
            json!({"role": "user", "content": "hello"}),
            json!({"role": "assistant", "content": "hi"}),
        ];
        let (system, contents) = GeminiProvider::convert_messages(&messages);
        assert_eq!(
            system.unwrap()["parts"][0]["text"],
            json!("be brief")
        );
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], json!("user"));
        assert_eq!(contents[1]["role"], json!("model"));
        assert_eq!(contents[1]["parts"][0]["text"], json!("hi"));
    }
}

//! Provider adapters.
//!
//! Each adapter speaks its provider's native wire format and maps the result
//! into the universal [`ProviderResponse`](super::ProviderResponse) shape.
//! Tool declarations arrive in the registry's universal
//! `{name, description, parameters}` form and are converted per provider.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{CoreError, ErrorKind};
use crate::utils::truncate_str;

use super::ModelProvider;

pub(crate) fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("failed to build HTTP client")
}

/// Classify an HTTP error response. Server-side outages become
/// `ModelUpstreamTransient` so the runner's retry matcher sees the status
/// text; everything else is surfaced as-is for the caller.
pub(crate) fn api_error(provider: &str, status: reqwest::StatusCode, body: &str) -> CoreError {
    let kind = if status.is_server_error() {
        ErrorKind::ModelUpstreamTransient
    } else {
        ErrorKind::Internal
    };
    CoreError::new(
        kind,
        format!(
            "{} API error ({}): {}",
            provider,
            status,
            truncate_str(body, 300)
        ),
    )
}

/// Instantiate the adapter selected by configuration.
pub fn provider_from_config(config: &LlmConfig) -> Arc<dyn ModelProvider> {
    match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiProvider::new(&config.gemini_api_key)),
        LlmProvider::Openai => Arc::new(OpenAiProvider::new(&config.openai_api_key)),
        LlmProvider::Anthropic => Arc::new(AnthropicProvider::new(&config.anthropic_api_key)),
    }
}

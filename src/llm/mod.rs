//! LLM integration for the trip planner.
//!
//! Every supported backend speaks the OpenAI-compatible chat completions
//! protocol (OpenAI, Groq, Chutes, or a local vLLM server), so one rig-core
//! client covers them; only the base URL and key differ. The `RigAdapter`
//! bridges rig's `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Default API base for OpenAI itself.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Base URL up to and including the version segment, e.g. `https://api.groq.com/openai/v1`.
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAICompletionsExt> =
        openai::CompletionsClient::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(config.base_url.trim_end_matches('/'))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI-compatible client: {}", e),
            })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, base_url = %config.base_url, "Using OpenAI-compatible LLM provider");
    Ok(Arc::new(
        RigAdapter::new(model, &config.model).with_timeout(config.request_timeout),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, model: &str) -> LlmConfig {
        LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn create_provider_without_network() {
        // rig-core clients accept any string as API key at construction time;
        // auth problems surface on the first request.
        let provider = create_provider(&config(DEFAULT_API_BASE, "gpt-4o-mini"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o-mini");
    }

    #[test]
    fn create_provider_with_custom_base() {
        let provider = create_provider(&config("https://api.groq.com/openai/v1/", "llama3-8b-8192"));
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "llama3-8b-8192");
    }
}

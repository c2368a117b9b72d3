//! External inference — proposes slot values and a reply for each user turn.
//!
//! Two transports share one contract: a REST chat backend, or a language model
//! called directly with the travel-planner prompt. The tracker treats both
//! outputs as untrusted hints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::normalize::ProposedSlots;
use super::prompts;
use super::slots::TripSlots;
use crate::error::InferenceError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// What the tracker sends to an inference backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub schema_field_values: TripSlots,
    pub last_assistant_message: String,
    pub user_message: String,
    pub today: NaiveDate,
}

/// What an inference backend proposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub reply: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, alias = "field_updates", alias = "extracted")]
    pub variables: ProposedSlots,
    #[serde(default)]
    pub done: bool,
}

/// An inference capability.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Backend name, for logging and errors.
    fn name(&self) -> &str;

    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError>;
}

/// Which transport supplies inference.
pub enum InferenceBackend {
    Rest(RestInference),
    Model(ModelInference),
}

#[async_trait]
impl InferenceClient for InferenceBackend {
    fn name(&self) -> &str {
        match self {
            Self::Rest(rest) => rest.name(),
            Self::Model(model) => model.name(),
        }
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        match self {
            Self::Rest(rest) => rest.infer(request).await,
            Self::Model(model) => model.infer(request).await,
        }
    }
}

// ── REST backend ────────────────────────────────────────────────────────

/// Request body for the chat backend's `/api/chat`.
#[derive(Debug, Serialize)]
struct RestChatBody<'a> {
    message: &'a str,
    #[serde(flatten)]
    request: &'a InferenceRequest,
}

/// Inference via a chat backend that already runs the model server side.
pub struct RestInference {
    client: reqwest::Client,
    endpoint: String,
}

impl RestInference {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Unavailable {
                backend: "rest".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> InferenceError {
        InferenceError::Unavailable {
            backend: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for RestInference {
    fn name(&self) -> &str {
        "rest"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let body = RestChatBody {
            message: &request.user_message,
            request,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.unavailable("request timed out")
                } else {
                    self.unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {status}")));
        }

        let mut parsed: InferenceResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse {
                    backend: self.name().to_string(),
                    reason: e.to_string(),
                })?;

        if parsed.suggestions.is_empty() {
            let (reply, suggestions) = prompts::split_inline_suggestions(&parsed.reply);
            parsed.reply = reply;
            parsed.suggestions = suggestions;
        }
        debug!(
            variables = parsed.variables.0.len(),
            done = parsed.done,
            "Chat backend proposed update"
        );
        Ok(parsed)
    }
}

// ── Model backend ───────────────────────────────────────────────────────

/// Sampling settings for model-backed inference.
#[derive(Debug, Clone)]
pub struct ModelInferenceConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelInferenceConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 380,
        }
    }
}

/// Inference by prompting a language model directly.
pub struct ModelInference {
    llm: Arc<dyn LlmProvider>,
    config: ModelInferenceConfig,
}

impl ModelInference {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ModelInferenceConfig) -> Self {
        Self { llm, config }
    }

    /// Parse the model's text into a response.
    fn parse_output(&self, text: &str) -> Result<InferenceResponse, InferenceError> {
        let invalid = |reason: String| InferenceError::InvalidResponse {
            backend: self.name().to_string(),
            reason,
        };
        let json = prompts::extract_json_object(text)
            .ok_or_else(|| invalid("no JSON object in model output".to_string()))?;
        serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, output = text, "Failed to parse model output");
            invalid(e.to_string())
        })
    }
}

#[async_trait]
impl InferenceClient for ModelInference {
    fn name(&self) -> &str {
        "model"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(request.today)),
            ChatMessage::user(prompts::user_prompt(
                &request.schema_field_values,
                &request.last_assistant_message,
                &request.user_message,
            )),
        ];
        let completion = CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(completion).await?;
        debug!(
            model = %self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Model inference complete"
        );
        self.parse_output(&response.content)
    }
}

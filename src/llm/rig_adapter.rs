//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use std::time::Duration;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{AssistantContent, CompletionModel, Message};
use tracing::debug;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};
use crate::error::LlmError;

/// Wraps any rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    timeout: Duration,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Upper bound on one request, including reading the response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failed(&self, reason: impl Into<String>) -> LlmError {
        LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: reason.into(),
        }
    }
}

/// A chat transcript split the way rig consumes it.
#[derive(Debug, PartialEq)]
struct SplitMessages<'a> {
    preamble: Option<String>,
    history: Vec<&'a ChatMessage>,
    prompt: &'a str,
}

/// System messages join into the preamble; the final user message is the prompt.
fn split_messages(messages: &[ChatMessage]) -> Option<SplitMessages<'_>> {
    let (last, rest) = messages.split_last()?;
    if last.role != Role::User {
        return None;
    }

    let system: Vec<&str> = rest
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));

    Some(SplitMessages {
        preamble,
        history: rest.iter().filter(|m| m.role != Role::System).collect(),
        prompt: &last.content,
    })
}

fn to_rig_message(message: &ChatMessage) -> Message {
    match message.role {
        Role::Assistant => Message::assistant(message.content.clone()),
        Role::User | Role::System => Message::user(message.content.clone()),
    }
}

fn collect_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let split = split_messages(&request.messages)
            .ok_or_else(|| self.failed("request must end with a user message"))?;

        let mut builder = self
            .model
            .completion_request(Message::user(split.prompt.to_string()))
            .messages(split.history.iter().map(|m| to_rig_message(m)).collect());
        if let Some(preamble) = split.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        debug!(model = %self.model_name, messages = request.messages.len(), "Sending completion request");
        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(result) => result.map_err(|e| self.failed(e.to_string()))?,
            Err(_) => return Err(self.failed(format!("timed out after {:?}", self.timeout))),
        };

        let content = collect_text(&response.choice).trim().to_string();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "no text in completion".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

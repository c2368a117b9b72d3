//! Error types for the trip planner.

use std::time::Duration;

use chrono::NaiveDate;

use crate::trip::schema::SlotField;

/// Top-level error type for the planner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Itinerary error: {0}")]
    Itinerary(#[from] ItineraryError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Validation failures for a single proposed slot value.
///
/// These never reach the caller as errors: the tracker leaves the slot unset
/// and asks for it again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("Could not read '{input}' as a start date: {reason}")]
    MalformedDate { input: String, reason: String },

    #[error("Start date {date} is not after {today}")]
    DateNotInFuture { date: NaiveDate, today: NaiveDate },

    #[error("Invalid trip duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("Unsupported value type for {field}: expected {expected}")]
    InvalidType { field: SlotField, expected: String },
}

impl SlotError {
    /// Whether this rejection concerns the start date.
    pub fn is_date_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedDate { .. } | Self::DateNotInFuture { .. }
        )
    }
}

/// Tracker contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Trip details are incomplete, missing: {}", format_fields(.missing))]
    IncompleteSlots { missing: Vec<SlotField> },

    #[error("Conversation {0} not found")]
    ConversationNotFound(uuid::Uuid),

    #[error("Conversation is complete; reset to change {field}")]
    ConversationComplete { field: SlotField },

    #[error("Rejected correction for {field}: {source}")]
    InvalidCorrection {
        field: SlotField,
        #[source]
        source: SlotError,
    },
}

fn format_fields(fields: &[SlotField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures of the external inference capability. All are retryable.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Inference backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("Invalid response from inference backend {backend}: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Failures of one chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Inference failed; the conversation is unchanged and the turn may be retried.
    #[error("{source}")]
    Inference {
        conversation_id: uuid::Uuid,
        #[source]
        source: InferenceError,
    },
}

/// Failures of the itinerary generation service.
#[derive(Debug, thiserror::Error)]
pub enum ItineraryError {
    #[error("Itinerary service unavailable: {0}")]
    Unavailable(String),

    #[error("Itinerary service timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid itinerary response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Result type alias for the planner.
pub type Result<T> = std::result::Result<T, Error>;

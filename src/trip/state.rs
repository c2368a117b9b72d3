//! Conversation state — slots, turn history, and the derived completion flag.
//!
//! Progresses `Collecting → Complete`. The only way back to `Collecting` is a
//! full [`ConversationState::reset`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::normalize::{self, ProposedSlots, SlotRejection};
use super::prompts;
use super::request::ItineraryRequest;
use super::schema::SlotField;
use super::slots::TripSlots;
use crate::error::TrackerError;

/// Maximum number of suggestions passed through to the client.
pub const MAX_SUGGESTIONS: usize = 4;

/// Coarse conversation phase, derived from the slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collecting,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "collecting"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of applying an inference proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    /// Fields that were written by this update.
    pub accepted: Vec<SlotField>,
    /// Proposed values that failed validation and will be asked for again.
    pub rejected: Vec<SlotRejection>,
    /// Proposal keys outside the schema.
    pub ignored: Vec<String>,
    /// Whether the proposal was dropped because the conversation is complete.
    pub frozen: bool,
    /// Derived completion after the merge.
    pub done: bool,
}

/// The single owned state of one trip-planning conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    slots: TripSlots,
    history: Vec<Turn>,
    /// Field named in the most recent question, to avoid asking twice in a row.
    last_asked: Option<SlotField>,
    /// Snapshot taken the moment the slots became complete.
    itinerary_request: Option<ItineraryRequest>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &TripSlots {
        &self.slots
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// True iff every slot is filled. Never set independently.
    pub fn done(&self) -> bool {
        self.slots.is_complete()
    }

    pub fn phase(&self) -> Phase {
        if self.done() {
            Phase::Complete
        } else {
            Phase::Collecting
        }
    }

    pub fn next_missing_field(&self) -> Option<SlotField> {
        self.slots.next_missing_field()
    }

    /// The snapshot for the itinerary service, present once complete.
    pub fn itinerary_request(&self) -> Option<&ItineraryRequest> {
        self.itinerary_request.as_ref()
    }

    /// Text of the latest assistant turn, if any.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
            .map(|t| t.text.as_str())
    }

    /// Append a user turn. Slots are not touched.
    pub fn record_user_message(&mut self, text: &str) {
        self.push_turn(Speaker::User, text);
    }

    pub fn record_assistant_message(&mut self, text: &str) {
        self.push_turn(Speaker::Assistant, text);
    }

    fn push_turn(&mut self, speaker: Speaker, text: &str) {
        self.history.push(Turn {
            speaker,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Apply an untrusted proposal from an inference backend.
    ///
    /// Every value is validated before merging, and `done` is recomputed from
    /// the slots; `proposed_done` is only compared for logging. Once complete,
    /// proposals are dropped.
    pub fn apply_inferred_update(
        &mut self,
        proposed: &ProposedSlots,
        proposed_done: bool,
        today: NaiveDate,
    ) -> AppliedUpdate {
        if self.done() {
            if !proposed.is_empty() {
                debug!("Conversation complete, dropping inferred slot update");
            }
            return AppliedUpdate {
                accepted: Vec::new(),
                rejected: Vec::new(),
                ignored: Vec::new(),
                frozen: true,
                done: true,
            };
        }

        let validated = normalize::validate_proposal(proposed, today);
        for rejection in &validated.rejected {
            warn!(field = %rejection.field, reason = %rejection.reason, "Rejected inferred slot value");
        }
        if !validated.ignored.is_empty() {
            warn!(keys = ?validated.ignored, "Ignored slots outside the schema");
        }

        let accepted: Vec<SlotField> = SlotField::ALL
            .into_iter()
            .filter(|f| validated.update.is_set(*f))
            .collect();
        self.slots.merge(&validated.update);

        let done = self.done();
        if proposed_done != done {
            warn!(
                proposed = proposed_done,
                derived = done,
                "Inference completion hint disagrees with slots, using slots"
            );
        }
        if done {
            self.take_snapshot();
        }

        AppliedUpdate {
            accepted,
            rejected: validated.rejected,
            ignored: validated.ignored,
            frozen: false,
            done,
        }
    }

    /// Explicit user-directed correction of one slot.
    ///
    /// `None` clears the slot. Only allowed while collecting.
    pub fn correct_slot(
        &mut self,
        field: SlotField,
        raw: Option<&str>,
        today: NaiveDate,
    ) -> Result<(), TrackerError> {
        if self.done() {
            return Err(TrackerError::ConversationComplete { field });
        }

        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => {
                self.slots.clear(field);
                if self.last_asked == Some(field) {
                    self.last_asked = None;
                }
            }
            Some(text) => {
                let mut update = TripSlots::default();
                let value = serde_json::Value::String(text.to_string());
                normalize::apply_value(&mut update, field, &value, today)
                    .map_err(|source| TrackerError::InvalidCorrection { field, source })?;
                self.slots.merge(&update);
                if self.done() {
                    self.take_snapshot();
                }
            }
        }
        Ok(())
    }

    fn take_snapshot(&mut self) {
        if self.itinerary_request.is_some() {
            return;
        }
        match ItineraryRequest::build(&self.slots) {
            Ok(request) => self.itinerary_request = Some(request),
            Err(e) => warn!(error = %e, "Failed to snapshot itinerary request"),
        }
    }

    /// Build the reply shown to the user for this turn.
    ///
    /// When complete the reply is the trip summary and no question follows.
    /// Otherwise rejected fields are explained, and the next missing field is
    /// asked for unless it was already the subject of the previous question.
    pub fn compose_reply(&mut self, inference_reply: &str, rejected: &[SlotRejection]) -> String {
        if self.done() {
            self.last_asked = None;
            return prompts::completion_summary(&self.slots);
        }

        let mut parts: Vec<String> = Vec::new();
        let base = inference_reply.trim();
        if !base.is_empty() {
            parts.push(base.to_string());
        }

        let mut reprompted = false;
        for rejection in rejected {
            if self.slots.is_set(rejection.field) {
                continue;
            }
            parts.push(prompts::reprompt(rejection));
            reprompted = true;
        }

        if let Some(next) = self.slots.next_missing_field() {
            if reprompted || self.last_asked != Some(next) || parts.is_empty() {
                parts.push(next.question().to_string());
            }
            self.last_asked = Some(next);
        }

        parts.join(" ")
    }

    /// Clear slots, history, and snapshot. Calling it twice equals calling it once.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Trim, de-duplicate, and cap suggestions. Complete conversations get none.
pub fn sanitize_suggestions(suggestions: &[String], done: bool) -> Vec<String> {
    if done {
        return Vec::new();
    }
    let mut out: Vec<String> = Vec::new();
    for s in suggestions {
        let trimmed = s.trim();
        if trimmed.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        out.push(trimmed.to_string());
        if out.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    out
}

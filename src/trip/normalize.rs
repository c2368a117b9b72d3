//! Normalization of untrusted slot proposals.
//!
//! Inference output arrives as loose JSON. Every known field is checked and
//! converted to its typed form here before it may enter the slot store;
//! unknown keys are dropped.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::schema::{Budget, SlotField, TripType};
use super::slots::TripSlots;
use crate::error::SlotError;

/// Longest trip the itinerary backend accepts.
pub const MAX_TRIP_DAYS: u32 = 21;

/// Raw field values proposed by an inference backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposedSlots(pub serde_json::Map<String, serde_json::Value>);

impl ProposedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and stub backends.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A proposed value that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRejection {
    pub field: SlotField,
    pub reason: String,
    #[serde(skip)]
    pub error: SlotError,
}

impl SlotRejection {
    fn new(field: SlotField, error: SlotError) -> Self {
        Self {
            field,
            reason: error.to_string(),
            error,
        }
    }
}

/// Outcome of validating a proposal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedProposal {
    /// Typed values that passed validation.
    pub update: TripSlots,
    /// Fields whose proposed value was rejected.
    pub rejected: Vec<SlotRejection>,
    /// Keys that are not part of the schema.
    pub ignored: Vec<String>,
}

/// Validate every key of a proposal against the schema.
pub fn validate_proposal(proposed: &ProposedSlots, today: NaiveDate) -> ValidatedProposal {
    let mut out = ValidatedProposal::default();

    for (key, value) in &proposed.0 {
        let Some(field) = SlotField::from_key(key) else {
            debug!(key = %key, "Ignoring unknown slot in proposal");
            out.ignored.push(key.clone());
            continue;
        };
        if let Err(error) = apply_value(&mut out.update, field, value, today) {
            out.rejected.push(SlotRejection::new(field, error));
        }
    }

    // Keep rejections in schema order regardless of JSON key order.
    out.rejected.sort_by_key(|r| r.field);
    out
}

/// Validate a single raw value and, if it is non-empty and valid, store it in
/// `update`.
pub fn apply_value(
    update: &mut TripSlots,
    field: SlotField,
    value: &serde_json::Value,
    today: NaiveDate,
) -> Result<(), SlotError> {
    let Some(text) = value_text(field, value)? else {
        return Ok(());
    };

    match field {
        SlotField::Destination => update.destination = Some(text),
        SlotField::DepartureCity => update.departure_city = Some(text),
        SlotField::StartDate => update.start_date = Some(normalize_start_date(&text, today)?),
        SlotField::NumDays => update.num_days = Some(normalize_num_days(&text)?),
        SlotField::Budget => update.budget = Budget::parse(&text),
        SlotField::TripType => update.trip_type = TripType::parse(&text),
    }
    Ok(())
}

/// Flatten a JSON value to trimmed text. `null` and blank strings mean
/// "nothing proposed".
fn value_text(field: SlotField, value: &serde_json::Value) -> Result<Option<String>, SlotError> {
    use serde_json::Value;

    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(SlotError::InvalidType {
                field,
                expected: "a string or number".to_string(),
            });
        }
    };
    Ok((!text.is_empty()).then_some(text))
}

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());

static RELATIVE_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^in\s+(\d+|a|one)\s+(day|days|week|weeks)$").unwrap());

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})$").unwrap());

const VAGUE_PHRASES: [&str; 9] = [
    "next week",
    "next weekend",
    "this weekend",
    "next month",
    "this month",
    "next year",
    "soon",
    "later",
    "sometime",
];

const NAMED_MONTH_FORMATS: [&str; 7] = [
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B, %Y",
];

/// Coerce a proposed start date to a calendar date strictly after `today`.
pub fn normalize_start_date(input: &str, today: NaiveDate) -> Result<NaiveDate, SlotError> {
    let date = parse_date(input, today)?;
    if date <= today {
        return Err(SlotError::DateNotInFuture { date, today });
    }
    Ok(date)
}

fn malformed(input: &str, reason: &str) -> SlotError {
    SlotError::MalformedDate {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate, SlotError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "tomorrow" {
        return today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| malformed(input, "date out of range"));
    }

    if let Some(caps) = RELATIVE_OFFSET.captures(&lower) {
        let count: u64 = match &caps[1] {
            "a" | "one" => 1,
            n => n.parse().map_err(|_| malformed(input, "offset too large"))?,
        };
        let days = if caps[2].starts_with("week") {
            count
                .checked_mul(7)
                .ok_or_else(|| malformed(input, "offset too large"))?
        } else {
            count
        };
        return today
            .checked_add_days(Days::new(days))
            .ok_or_else(|| malformed(input, "date out of range"));
    }

    if VAGUE_PHRASES.iter().any(|p| lower.contains(p)) {
        return Err(malformed(input, "too vague, an exact calendar date is needed"));
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date);
        }
    }

    // ISO datetime ("2026-12-20T09:00:00Z"): keep the date part.
    if let (Some(prefix), Some(sep)) = (trimmed.get(..10), trimmed.get(10..11)) {
        if sep == "T" || sep == " " {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Ok(date);
            }
        }
    }

    if let Some(caps) = NUMERIC_DATE.captures(trimmed) {
        let a: u32 = caps[1].parse().map_err(|_| malformed(input, "bad day or month"))?;
        let b: u32 = caps[2].parse().map_err(|_| malformed(input, "bad day or month"))?;
        let year: i32 = caps[3].parse().map_err(|_| malformed(input, "bad year"))?;
        let day_first = NaiveDate::from_ymd_opt(year, b, a);
        let month_first = NaiveDate::from_ymd_opt(year, a, b);
        return match (day_first, month_first) {
            (Some(d), Some(m)) if d != m => Err(malformed(
                input,
                "ambiguous day/month order, use YYYY-MM-DD",
            )),
            (Some(d), _) => Ok(d),
            (None, Some(m)) => Ok(m),
            (None, None) => Err(malformed(input, "no such calendar date")),
        };
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(trimmed, "$1");
    for fmt in NAMED_MONTH_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Ok(date);
        }
    }

    Err(malformed(input, "unrecognized date format"))
}

static DAY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*(?:-|–|—|to)\s*(\d+)(?:\s*(?:days?|nights?))?$").unwrap()
});

static DAY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+)(?:\.0+)?(?:\s*(?:days?|nights?))?$").unwrap());

static WEEK_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(a|one|\d+)\s*weeks?$").unwrap());

/// Coerce a proposed trip length to a day count in `1..=MAX_TRIP_DAYS`.
///
/// Ranges ("5-7 days") resolve to their midpoint.
pub fn normalize_num_days(input: &str) -> Result<u32, SlotError> {
    let lower = input.trim().to_lowercase();
    let invalid = |reason: &str| SlotError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let days: i64 = if let Some(caps) = DAY_RANGE.captures(&lower) {
        let low: i64 = caps[1].parse().map_err(|_| invalid("number too large"))?;
        let high: i64 = caps[2].parse().map_err(|_| invalid("number too large"))?;
        low.checked_add(high)
            .ok_or_else(|| invalid("number too large"))?
            / 2
    } else if let Some(caps) = DAY_COUNT.captures(&lower) {
        caps[1].parse().map_err(|_| invalid("number too large"))?
    } else if let Some(caps) = WEEK_COUNT.captures(&lower) {
        let weeks: i64 = match &caps[1] {
            "a" | "one" => 1,
            n => n.parse().map_err(|_| invalid("number too large"))?,
        };
        weeks.saturating_mul(7)
    } else {
        return Err(invalid("not a number of days"));
    };

    if days < 1 {
        return Err(invalid("must be at least one day"));
    }
    if days > i64::from(MAX_TRIP_DAYS) {
        return Err(invalid(&format!("trips are limited to {MAX_TRIP_DAYS} days")));
    }
    u32::try_from(days).map_err(|_| invalid("number too large"))
}

//! Reply templates, the model prompt, and parsing helpers for model output.

use chrono::NaiveDate;

use super::normalize::{MAX_TRIP_DAYS, SlotRejection};
use super::schema::SlotField;
use super::slots::TripSlots;

/// Summary shown once every slot is filled.
pub fn completion_summary(slots: &TripSlots) -> String {
    let value = |field: SlotField| slots.get_display(field).unwrap_or_default();
    format!(
        "All details collected! Here's your trip summary:\n\n\
         • Destination: {}\n\
         • Departing from: {}\n\
         • Start date: {}\n\
         • Duration: {} days\n\
         • Budget: {}\n\
         • Trip type: {}\n\n\
         You can now generate your itinerary!",
        value(SlotField::Destination),
        value(SlotField::DepartureCity),
        value(SlotField::StartDate),
        value(SlotField::NumDays),
        value(SlotField::Budget),
        value(SlotField::TripType),
    )
}

/// Short explanation for a rejected value.
pub fn reprompt(rejection: &SlotRejection) -> String {
    match rejection.field {
        SlotField::StartDate => format!(
            "I couldn't use that as a start date ({}). Please give an exact future date such as 2026-12-20.",
            rejection.reason
        ),
        SlotField::NumDays => format!(
            "I need the trip length as a number of days between 1 and {MAX_TRIP_DAYS}."
        ),
        field => format!("I didn't catch a usable {}.", field.label()),
    }
}

/// System prompt for model-backed inference.
pub fn system_prompt(today: NaiveDate) -> String {
    format!(
        "\
You are a friendly AI travel planner collecting trip details one at a time.

We are gathering, in this order: destination, departure_city, start_date, num_days, budget, trip_type.

GENERAL RULES:
- When the user greets you, greet them back and ask for their destination.
- Keep answers short, warm, and easy to read.
- Ask only for the first missing detail. Never ask again for a detail that is already known.
- After the user gives information, acknowledge it and move on.

DESTINATION RULES:
- Accept real places: cities (Paris, Tokyo), regions (Swiss Alps), named parks (Banff).
- Reject generic nature words (beach, mountains, island, forest, desert). Ask which specific place and offer 3-5 real examples.

DATE RULES:
- Today is {today}.
- Report start_date exactly as the user said it, or as YYYY-MM-DD when the user gave a full date.
- Dates must be in the future.

VALUE RULES:
- num_days is a whole number of days between 1 and {MAX_TRIP_DAYS}.
- budget is Low, Medium, High, or a range like \"$2000-$4000\".
- trip_type is Leisure, Adventure, Family, Romantic, Business, or the user's own words.

SUGGESTION RULES:
- Suggestions relate to the next missing detail only.
- At most 4 suggestions, each 1-4 words.
- Use single-hyphen numeric ranges: \"$4000-$6000\".

RETURN JSON ONLY, with this shape:
{{\"reply\": \"text\", \"variables\": {{\"field\": \"value\"}}, \"suggestions\": [\"one\", \"two\"], \"done\": false}}
Only include variables the user has just provided.",
        today = today.format("%Y-%m-%d"),
    )
}

/// User prompt for model-backed inference.
pub fn user_prompt(slots: &TripSlots, last_assistant_message: &str, user_message: &str) -> String {
    let known = serde_json::to_string(slots).unwrap_or_else(|_| "{}".to_string());
    let next = slots
        .next_missing_field()
        .map(|f| f.key())
        .unwrap_or("none");
    format!(
        "Current known info: {known}\n\
         Next missing detail: {next}\n\
         Your previous message: \"{last_assistant_message}\"\n\
         User said: \"{user_message}\""
    )
}

/// Extract a JSON object from model output that may contain markdown or
/// surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Split a trailing `suggestions: a, b, c` segment out of a reply.
///
/// Some chat backends embed suggestions inline rather than returning them as
/// a list.
pub fn split_inline_suggestions(reply: &str) -> (String, Vec<String>) {
    let lower = reply.to_ascii_lowercase();
    let Some(pos) = lower.rfind("suggestions:") else {
        return (reply.trim().to_string(), Vec::new());
    };

    let text = reply[..pos].trim().to_string();
    let suggestions = reply[pos + "suggestions:".len()..]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (text, suggestions)
}

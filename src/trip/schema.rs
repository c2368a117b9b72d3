//! The fixed, ordered set of trip fields and their value types.

use serde::{Deserialize, Serialize};

/// One field of trip information collected during the conversation.
///
/// Declaration order is the canonical elicitation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotField {
    Destination,
    DepartureCity,
    StartDate,
    NumDays,
    Budget,
    TripType,
}

impl SlotField {
    /// All fields, in the order they are asked for.
    pub const ALL: [SlotField; 6] = [
        SlotField::Destination,
        SlotField::DepartureCity,
        SlotField::StartDate,
        SlotField::NumDays,
        SlotField::Budget,
        SlotField::TripType,
    ];

    /// Wire name, identical to the serde representation.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::DepartureCity => "departure_city",
            Self::StartDate => "start_date",
            Self::NumDays => "num_days",
            Self::Budget => "budget",
            Self::TripType => "trip_type",
        }
    }

    /// Look a field up by its wire name.
    pub fn from_key(key: &str) -> Option<SlotField> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Human-readable label used in replies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::DepartureCity => "departure city",
            Self::StartDate => "start date",
            Self::NumDays => "trip length",
            Self::Budget => "budget",
            Self::TripType => "trip type",
        }
    }

    /// The question asked when this field is the next one missing.
    pub fn question(&self) -> &'static str {
        match self {
            Self::Destination => "Where would you like to go?",
            Self::DepartureCity => "Which city will you be leaving from?",
            Self::StartDate => "When would you like to start your trip? (for example 2026-12-20)",
            Self::NumDays => "How many days will you travel?",
            Self::Budget => "What budget should I plan for? (Low, Medium, High, or a range)",
            Self::TripType => {
                "What kind of trip is this? (Leisure, Adventure, Family, Romantic, Business)"
            }
        }
    }
}

impl std::fmt::Display for SlotField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Enumerated budget tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetTier {
    Low,
    Medium,
    High,
}

impl BudgetTier {
    fn from_text(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "low" | "cheap" | "budget" | "economy" => Some(Self::Low),
            "medium" | "mid" | "moderate" | "mid-range" | "midrange" => Some(Self::Medium),
            "high" | "luxury" | "premium" | "no limit" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// A budget: either a known tier or the user's own wording ("$1000-$2000").
///
/// Serialized as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Budget {
    Tier(BudgetTier),
    Custom(String),
}

impl Budget {
    /// Normalize free text into a budget. Blank input yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match BudgetTier::from_text(trimmed) {
            Some(tier) => Self::Tier(tier),
            None => Self::Custom(trimmed.to_string()),
        })
    }
}

impl std::fmt::Display for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier(tier) => write!(f, "{tier}"),
            Self::Custom(text) => write!(f, "{text}"),
        }
    }
}

impl TryFrom<String> for Budget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "budget must not be empty".to_string())
    }
}

impl From<Budget> for String {
    fn from(value: Budget) -> Self {
        value.to_string()
    }
}

/// Enumerated trip kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripKind {
    Leisure,
    Adventure,
    Family,
    Romantic,
    Business,
}

impl TripKind {
    fn from_text(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "leisure" | "relaxing" | "relaxation" | "vacation" => Some(Self::Leisure),
            "adventure" | "adventurous" => Some(Self::Adventure),
            "family" => Some(Self::Family),
            "romantic" | "honeymoon" | "couple" => Some(Self::Romantic),
            "business" | "work" => Some(Self::Business),
            _ => None,
        }
    }
}

impl std::fmt::Display for TripKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Leisure => "Leisure",
            Self::Adventure => "Adventure",
            Self::Family => "Family",
            Self::Romantic => "Romantic",
            Self::Business => "Business",
        };
        write!(f, "{s}")
    }
}

/// A trip type: a known kind or the user's own wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TripType {
    Tier(TripKind),
    Custom(String),
}

impl TripType {
    /// Normalize free text into a trip type. Blank input yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match TripKind::from_text(trimmed) {
            Some(kind) => Self::Tier(kind),
            None => Self::Custom(trimmed.to_string()),
        })
    }
}

impl std::fmt::Display for TripType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier(kind) => write!(f, "{kind}"),
            Self::Custom(text) => write!(f, "{text}"),
        }
    }
}

impl TryFrom<String> for TripType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "trip type must not be empty".to_string())
    }
}

impl From<TripType> for String {
    fn from(value: TripType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_in_elicitation_order() {
        use SlotField::*;
        assert_eq!(
            SlotField::ALL,
            [Destination, DepartureCity, StartDate, NumDays, Budget, TripType]
        );
        let mut sorted = SlotField::ALL;
        sorted.sort();
        assert_eq!(sorted, SlotField::ALL);
    }

    #[test]
    fn display_matches_serde() {
        for field in SlotField::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(format!("\"{field}\""), json, "mismatch for {field:?}");
            assert_eq!(SlotField::from_key(field.key()), Some(field));
        }
        assert_eq!(SlotField::from_key("hotel"), None);
    }

    #[test]
    fn budget_tiers_and_synonyms() {
        assert_eq!(Budget::parse("low"), Some(Budget::Tier(BudgetTier::Low)));
        assert_eq!(Budget::parse(" Luxury "), Some(Budget::Tier(BudgetTier::High)));
        assert_eq!(Budget::parse("mid-range"), Some(Budget::Tier(BudgetTier::Medium)));
        assert_eq!(
            Budget::parse("$1000-$2000"),
            Some(Budget::Custom("$1000-$2000".into()))
        );
        assert_eq!(Budget::parse("   "), None);
    }

    #[test]
    fn trip_type_tiers_and_custom() {
        assert_eq!(TripType::parse("honeymoon"), Some(TripType::Tier(TripKind::Romantic)));
        assert_eq!(TripType::parse("FAMILY"), Some(TripType::Tier(TripKind::Family)));
        assert_eq!(
            TripType::parse("food tour"),
            Some(TripType::Custom("food tour".into()))
        );
        assert_eq!(TripType::parse(""), None);
    }

    #[test]
    fn tiered_values_serialize_as_plain_strings() {
        let budget = Budget::Tier(BudgetTier::Medium);
        assert_eq!(serde_json::to_string(&budget).unwrap(), "\"Medium\"");

        let parsed: TripType = serde_json::from_str("\"adventure\"").unwrap();
        assert_eq!(parsed, TripType::Tier(TripKind::Adventure));

        assert!(serde_json::from_str::<Budget>("\"  \"").is_err());
    }
}

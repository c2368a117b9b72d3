//! Slot store: the known trip values, one optional entry per schema field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::schema::{Budget, SlotField, TripType};

/// Current known trip values.
///
/// Also used as a partial update for [`TripSlots::merge`]: `None` means
/// "no change".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSlots {
    pub destination: Option<String>,
    pub departure_city: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub num_days: Option<u32>,
    pub budget: Option<Budget>,
    pub trip_type: Option<TripType>,
}

fn filled_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl TripSlots {
    /// Whether a single field holds a non-empty value.
    pub fn is_set(&self, field: SlotField) -> bool {
        match field {
            SlotField::Destination => filled_text(&self.destination),
            SlotField::DepartureCity => filled_text(&self.departure_city),
            SlotField::StartDate => self.start_date.is_some(),
            SlotField::NumDays => self.num_days.is_some_and(|n| n > 0),
            SlotField::Budget => self.budget.is_some(),
            SlotField::TripType => self.trip_type.is_some(),
        }
    }

    /// Merge a partial update.
    ///
    /// Present, non-empty values overwrite; absent or empty values leave the
    /// stored field untouched, so a populated field never regresses to empty.
    pub fn merge(&mut self, update: &TripSlots) -> &TripSlots {
        if filled_text(&update.destination) {
            self.destination = update.destination.as_ref().map(|s| s.trim().to_string());
        }
        if filled_text(&update.departure_city) {
            self.departure_city = update.departure_city.as_ref().map(|s| s.trim().to_string());
        }
        if update.start_date.is_some() {
            self.start_date = update.start_date;
        }
        if update.num_days.is_some_and(|n| n > 0) {
            self.num_days = update.num_days;
        }
        if update.budget.is_some() {
            self.budget = update.budget.clone();
        }
        if update.trip_type.is_some() {
            self.trip_type = update.trip_type.clone();
        }
        self
    }

    /// True iff every schema field is non-empty.
    pub fn is_complete(&self) -> bool {
        SlotField::ALL.iter().all(|f| self.is_set(*f))
    }

    /// First unset field in schema order, or `None` when complete.
    pub fn next_missing_field(&self) -> Option<SlotField> {
        SlotField::ALL.into_iter().find(|f| !self.is_set(*f))
    }

    /// All unset fields in schema order.
    pub fn missing_fields(&self) -> Vec<SlotField> {
        SlotField::ALL
            .into_iter()
            .filter(|f| !self.is_set(*f))
            .collect()
    }

    pub fn filled_count(&self) -> usize {
        SlotField::ALL.iter().filter(|f| self.is_set(**f)).count()
    }

    /// Render a field's value as text, if set.
    pub fn get_display(&self, field: SlotField) -> Option<String> {
        if !self.is_set(field) {
            return None;
        }
        match field {
            SlotField::Destination => self.destination.clone(),
            SlotField::DepartureCity => self.departure_city.clone(),
            SlotField::StartDate => self.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
            SlotField::NumDays => self.num_days.map(|n| n.to_string()),
            SlotField::Budget => self.budget.as_ref().map(|b| b.to_string()),
            SlotField::TripType => self.trip_type.as_ref().map(|t| t.to_string()),
        }
    }

    /// Clear one field. Only explicit corrections reach this.
    pub(crate) fn clear(&mut self, field: SlotField) {
        match field {
            SlotField::Destination => self.destination = None,
            SlotField::DepartureCity => self.departure_city = None,
            SlotField::StartDate => self.start_date = None,
            SlotField::NumDays => self.num_days = None,
            SlotField::Budget => self.budget = None,
            SlotField::TripType => self.trip_type = None,
        }
    }
}

//! The immutable snapshot sent to the itinerary service.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::slots::TripSlots;
use crate::error::TrackerError;

/// All six trip values, guaranteed present.
///
/// Owned copies, so later changes to the live slots never reach a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryRequest {
    pub destination: String,
    pub departure_city: String,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub budget: String,
    pub trip_type: String,
}

impl ItineraryRequest {
    /// Snapshot complete slots. Fails with `IncompleteSlots` otherwise.
    pub fn build(slots: &TripSlots) -> Result<Self, TrackerError> {
        let incomplete = || TrackerError::IncompleteSlots {
            missing: slots.missing_fields(),
        };
        if !slots.is_complete() {
            return Err(incomplete());
        }

        Ok(Self {
            destination: slots.destination.clone().ok_or_else(incomplete)?,
            departure_city: slots.departure_city.clone().ok_or_else(incomplete)?,
            start_date: slots.start_date.ok_or_else(incomplete)?,
            num_days: slots.num_days.ok_or_else(incomplete)?,
            budget: slots
                .budget
                .as_ref()
                .map(|b| b.to_string())
                .ok_or_else(incomplete)?,
            trip_type: slots
                .trip_type
                .as_ref()
                .map(|t| t.to_string())
                .ok_or_else(incomplete)?,
        })
    }
}

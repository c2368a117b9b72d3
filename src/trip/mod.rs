//! Trip slot-filling tracker.
//!
//! A conversation collects six trip details (destination, departure city,
//! start date, trip length, budget, trip type) one turn at a time. External
//! inference proposes values; the tracker validates and merges them, decides
//! what to ask next, and once every slot is filled snapshots an
//! `ItineraryRequest` for the itinerary service.

pub mod inference;
pub mod itinerary;
pub mod manager;
pub mod normalize;
pub mod prompts;
pub mod request;
pub mod routes;
pub mod schema;
pub mod slots;
pub mod state;

pub use inference::{
    InferenceBackend, InferenceClient, InferenceRequest, InferenceResponse, ModelInference,
    ModelInferenceConfig, RestInference,
};
pub use itinerary::{HttpItineraryService, ItineraryDocument, ItineraryService};
pub use manager::{ChatOutcome, ConversationManager, ConversationView, ManagerConfig, TurnOutcome};
pub use normalize::{ProposedSlots, SlotRejection};
pub use request::ItineraryRequest;
pub use routes::{PlannerRouteState, planner_routes};
pub use schema::{Budget, BudgetTier, SlotField, TripKind, TripType};
pub use slots::TripSlots;
pub use state::{AppliedUpdate, ConversationState, Phase, Speaker, Turn};

//! REST endpoints for the trip planner chat.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;

use super::manager::{ChatOutcome, ConversationManager};
use super::schema::SlotField;
use crate::error::{ChatError, ItineraryError, TrackerError};

/// Shared state for planner routes.
#[derive(Clone)]
pub struct PlannerRouteState {
    pub manager: Arc<ConversationManager>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    conversation_id: Option<Uuid>,
    message: String,
    /// Override for the reference date; defaults to the server's local date.
    today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ConversationBody {
    conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CorrectionBody {
    conversation_id: Uuid,
    field: SlotField,
    value: Option<String>,
    today: Option<NaiveDate>,
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn error_json(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn tracker_error_response(err: &TrackerError) -> Response {
    match err {
        TrackerError::ConversationNotFound(_) => {
            error_json(StatusCode::NOT_FOUND, json!({"error": err.to_string()}))
        }
        TrackerError::IncompleteSlots { missing } => error_json(
            StatusCode::CONFLICT,
            json!({"error": err.to_string(), "missing": missing}),
        ),
        TrackerError::ConversationComplete { .. } => {
            error_json(StatusCode::CONFLICT, json!({"error": err.to_string()}))
        }
        TrackerError::InvalidCorrection { field, .. } => error_json(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"error": err.to_string(), "field": field}),
        ),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "trip-planner"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

/// POST /api/chat
async fn chat(State(state): State<PlannerRouteState>, Json(body): Json<ChatBody>) -> Response {
    let message = body.message.trim();
    if message.is_empty() {
        return error_json(
            StatusCode::BAD_REQUEST,
            json!({"error": "message must not be empty"}),
        );
    }

    let today = body.today.unwrap_or_else(local_today);

    match state
        .manager
        .handle_message(body.conversation_id, message, today)
        .await
    {
        Ok(ChatOutcome::Applied(turn)) => Json(turn).into_response(),
        Ok(ChatOutcome::StaleResultDiscarded { conversation_id }) => error_json(
            StatusCode::CONFLICT,
            json!({"error": "stale_result_discarded", "conversation_id": conversation_id}),
        ),
        Err(ChatError::Tracker(e)) => tracker_error_response(&e),
        Err(ChatError::Inference {
            conversation_id,
            source,
        }) => {
            warn!(conversation_id = %conversation_id, error = %source, "Chat turn failed");
            error_json(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": source.to_string(),
                    "retryable": true,
                    "conversation_id": conversation_id,
                }),
            )
        }
    }
}

/// GET /api/chat/{id}
async fn get_conversation(
    State(state): State<PlannerRouteState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.manager.view(id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => tracker_error_response(&e),
    }
}

/// POST /api/reset_chat
async fn reset_chat(
    State(state): State<PlannerRouteState>,
    Json(body): Json<ConversationBody>,
) -> Response {
    match state.manager.reset(body.conversation_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => tracker_error_response(&e),
    }
}

/// POST /api/correct_slot
///
/// A missing `value` clears the slot.
async fn correct_slot(
    State(state): State<PlannerRouteState>,
    Json(body): Json<CorrectionBody>,
) -> Response {
    let today = body.today.unwrap_or_else(local_today);
    match state
        .manager
        .correct_slot(body.conversation_id, body.field, body.value.as_deref(), today)
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => tracker_error_response(&e),
    }
}

// ── Itinerary ───────────────────────────────────────────────────────────

/// POST /api/generate_itinerary
async fn generate_itinerary(
    State(state): State<PlannerRouteState>,
    Json(body): Json<ConversationBody>,
) -> Response {
    let id = body.conversation_id;
    match state.manager.generate_itinerary(id).await {
        Ok(itinerary) => Json(json!({ "itinerary": itinerary })).into_response(),
        Err(ItineraryError::Tracker(e)) => tracker_error_response(&e),
        Err(e) => {
            warn!(conversation_id = %id, error = %e, "Itinerary generation failed");
            error_json(StatusCode::BAD_GATEWAY, json!({"error": e.to_string()}))
        }
    }
}

/// CORS policy for the configured origins. `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Build the planner REST routes.
pub fn planner_routes(state: PlannerRouteState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/chat/{id}", get(get_conversation))
        .route("/api/reset_chat", post(reset_chat))
        .route("/api/correct_slot", post(correct_slot))
        .route("/api/generate_itinerary", post(generate_itinerary))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

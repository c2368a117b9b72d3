//! Integration tests for the planner REST API.
//!
//! Each test spins up an Axum server on a random port and talks to it with
//! reqwest. Inference and itinerary generation are stubbed, except where a
//! test stands up a fake chat backend to exercise `RestInference` end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use trip_planner::error::{InferenceError, ItineraryError};
use trip_planner::trip::{
    ConversationManager, HttpItineraryService, InferenceClient, InferenceRequest,
    InferenceResponse, ItineraryDocument, ItineraryRequest, ItineraryService, ManagerConfig,
    PlannerRouteState, ProposedSlots, RestInference, planner_routes,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const TODAY: &str = "2025-01-01";

/// Stub inference that reads `key=value` pairs out of the user message.
///
/// `destination=Paris; num_days=5` proposes those two slots.
struct KeyValueInference;

#[async_trait]
impl InferenceClient for KeyValueInference {
    fn name(&self) -> &str {
        "key_value"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let mut variables = ProposedSlots::new();
        for pair in request.user_message.split(';') {
            if let Some((k, v)) = pair.split_once('=') {
                variables = variables.with(k.trim(), v.trim());
            }
        }
        Ok(InferenceResponse {
            reply: "Thanks!".to_string(),
            suggestions: vec!["Option A".into(), "option a".into(), "Option B".into()],
            variables,
            done: false,
        })
    }
}

/// Stub itinerary service that counts calls.
struct StubItinerary {
    calls: AtomicUsize,
}

#[async_trait]
impl ItineraryService for StubItinerary {
    async fn generate(&self, request: &ItineraryRequest) -> Result<ItineraryDocument, ItineraryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ItineraryDocument(json!({
            "destination": request.destination,
            "days": (1..=request.num_days).map(|d| json!({"day": d})).collect::<Vec<_>>(),
        })))
    }
}

/// Bind a router to a random port and serve it in the background.
async fn serve(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

/// Start the planner with the given inference and itinerary stubs.
async fn start_planner(
    inference: Arc<dyn InferenceClient>,
    itinerary: Arc<dyn ItineraryService>,
) -> String {
    let manager = Arc::new(ConversationManager::new(
        inference,
        itinerary,
        ManagerConfig::default(),
    ));
    serve(planner_routes(PlannerRouteState { manager }, &["*".to_string()])).await
}

async fn chat(client: &reqwest::Client, base: &str, id: Option<&str>, message: &str) -> (u16, Value) {
    let mut body = json!({"message": message, "today": TODAY});
    if let Some(id) = id {
        body["conversation_id"] = json!(id);
    }
    let response = client
        .post(format!("{base}/api/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn full_trip_conversation_over_http() {
    timeout(TEST_TIMEOUT, async {
        let itinerary = Arc::new(StubItinerary {
            calls: AtomicUsize::new(0),
        });
        let base = start_planner(Arc::new(KeyValueInference), itinerary.clone()).await;
        let client = reqwest::Client::new();

        let (status, first) = chat(&client, &base, None, "destination=Paris").await;
        assert_eq!(status, 200);
        let id = first["conversation_id"].as_str().unwrap().to_string();
        assert_eq!(first["next_field"], "departure_city");
        assert_eq!(first["suggestions"], json!(["Option A", "Option B"]));
        assert!(first["reply"].as_str().unwrap().contains("leaving from"));

        // A vague date is rejected and re-asked; the other values still land.
        let (_, second) = chat(
            &client,
            &base,
            Some(&id),
            "departure_city=London; start_date=next week",
        )
        .await;
        assert_eq!(second["variables"]["departure_city"], "London");
        assert!(second["variables"]["start_date"].is_null());
        assert_eq!(second["rejected"][0]["field"], "start_date");
        assert_eq!(second["next_field"], "start_date");

        let (_, third) = chat(
            &client,
            &base,
            Some(&id),
            "start_date=2025-03-10; num_days=5; budget=medium; trip_type=romantic",
        )
        .await;
        assert_eq!(third["done"], true);
        assert!(third["next_field"].is_null());
        assert_eq!(third["suggestions"], json!([]));
        assert_eq!(third["variables"]["start_date"], "2025-03-10");

        let state: Value = client
            .get(format!("{base}/api/chat/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["phase"], "complete");
        assert_eq!(state["history"].as_array().unwrap().len(), 6);
        assert_eq!(state["itinerary_request"]["num_days"], 5);

        for _ in 0..2 {
            let response = client
                .post(format!("{base}/api/generate_itinerary"))
                .json(&json!({"conversation_id": id}))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 200);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["itinerary"]["destination"], "Paris");
            assert_eq!(body["itinerary"]["days"].as_array().unwrap().len(), 5);
        }
        assert_eq!(itinerary.calls.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reset_starts_over() {
    timeout(TEST_TIMEOUT, async {
        let itinerary = Arc::new(StubItinerary {
            calls: AtomicUsize::new(0),
        });
        let base = start_planner(Arc::new(KeyValueInference), itinerary).await;
        let client = reqwest::Client::new();

        let (_, first) = chat(&client, &base, None, "destination=Rome; departure_city=Oslo").await;
        let id = first["conversation_id"].as_str().unwrap().to_string();

        let reset: Value = client
            .post(format!("{base}/api/reset_chat"))
            .json(&json!({"conversation_id": id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(reset["variables"]["destination"].is_null());
        assert_eq!(reset["history"], json!([]));
        assert_eq!(reset["next_field"], "destination");

        let response = client
            .post(format!("{base}/api/generate_itinerary"))
            .json(&json!({"conversation_id": id}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn correction_overwrites_slot() {
    timeout(TEST_TIMEOUT, async {
        let itinerary = Arc::new(StubItinerary {
            calls: AtomicUsize::new(0),
        });
        let base = start_planner(Arc::new(KeyValueInference), itinerary).await;
        let client = reqwest::Client::new();

        let (_, first) = chat(&client, &base, None, "destination=Rome; departure_city=Oslo").await;
        let id = first["conversation_id"].as_str().unwrap().to_string();

        let corrected: Value = client
            .post(format!("{base}/api/correct_slot"))
            .json(&json!({
                "conversation_id": id,
                "field": "destination",
                "value": "Florence",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(corrected["variables"]["destination"], "Florence");
        assert_eq!(corrected["variables"]["departure_city"], "Oslo");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_inference_against_chat_backend() {
    timeout(TEST_TIMEOUT, async {
        // Fake chat backend: inline suggestions, no structured list.
        let backend = axum::Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["message"], "Somewhere warm");
                assert_eq!(body["today"], TODAY);
                Json(json!({
                    "reply": "How about one of these? suggestions: Lisbon, Seville",
                    "variables": {},
                    "done": false,
                }))
            }),
        );
        let backend_base = serve(backend).await;

        let inference = RestInference::new(&backend_base, Duration::from_secs(2)).unwrap();
        let request = InferenceRequest {
            schema_field_values: Default::default(),
            last_assistant_message: String::new(),
            user_message: "Somewhere warm".to_string(),
            today: TODAY.parse().unwrap(),
        };
        let response = inference.infer(&request).await.unwrap();
        assert_eq!(response.reply, "How about one of these?");
        assert_eq!(response.suggestions, vec!["Lisbon", "Seville"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_chat_backend_is_503() {
    timeout(TEST_TIMEOUT, async {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let inference =
            RestInference::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(1)).unwrap();
        let itinerary = Arc::new(StubItinerary {
            calls: AtomicUsize::new(0),
        });
        let base = start_planner(Arc::new(inference), itinerary).await;
        let client = reqwest::Client::new();

        let (status, body) = chat(&client, &base, None, "hello").await;
        assert_eq!(status, 503);
        assert_eq!(body["retryable"], true);

        let id = body["conversation_id"].as_str().unwrap();
        let state: Value = client
            .get(format!("{base}/api/chat/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["history"], json!([]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_itinerary_service_unwraps_document() {
    timeout(TEST_TIMEOUT, async {
        let service_app = axum::Router::new().route(
            "/api/generate_itinerary",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "itinerary": {
                        "destination": body["destination"],
                        "start_date": body["start_date"],
                    }
                }))
            }),
        );
        let service_base = serve(service_app).await;
        let service = HttpItineraryService::new(&service_base, Duration::from_secs(2)).unwrap();

        let request = ItineraryRequest {
            destination: "Kyoto".to_string(),
            departure_city: "Seoul".to_string(),
            start_date: "2025-04-01".parse().unwrap(),
            num_days: 4,
            budget: "high".to_string(),
            trip_type: "leisure".to_string(),
        };
        let doc = service.generate(&request).await.unwrap();
        assert_eq!(doc.0["destination"], "Kyoto");
        assert_eq!(doc.0["start_date"], "2025-04-01");
    })
    .await
    .expect("test timed out");
}

//! Client for the external itinerary-generation service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::request::ItineraryRequest;
use crate::error::ItineraryError;

/// An itinerary produced by the service. Its shape belongs to the
/// presentation layer, so it is carried as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItineraryDocument(pub serde_json::Value);

/// An itinerary generator.
#[async_trait]
pub trait ItineraryService: Send + Sync {
    async fn generate(&self, request: &ItineraryRequest) -> Result<ItineraryDocument, ItineraryError>;
}

/// Itinerary service reached over HTTP at `{base}/api/generate_itinerary`.
pub struct HttpItineraryService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpItineraryService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ItineraryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ItineraryError::Unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate_itinerary", base_url.trim_end_matches('/')),
        })
    }
}

/// The service wraps its document in `{"itinerary": ...}`; accept a bare
/// document too.
fn unwrap_document(mut body: serde_json::Value) -> Result<ItineraryDocument, ItineraryError> {
    if !body.is_object() {
        return Err(ItineraryError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    }
    match body.get_mut("itinerary").map(serde_json::Value::take) {
        Some(serde_json::Value::Null) => Err(ItineraryError::InvalidResponse(
            "itinerary is null".to_string(),
        )),
        Some(doc) => Ok(ItineraryDocument(doc)),
        None => Ok(ItineraryDocument(body)),
    }
}

#[async_trait]
impl ItineraryService for HttpItineraryService {
    async fn generate(&self, request: &ItineraryRequest) -> Result<ItineraryDocument, ItineraryError> {
        info!(
            destination = %request.destination,
            start_date = %request.start_date,
            num_days = request.num_days,
            "Requesting itinerary"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ItineraryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItineraryError::Unavailable(format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ItineraryError::InvalidResponse(e.to_string()))?;
        unwrap_document(body)
    }
}

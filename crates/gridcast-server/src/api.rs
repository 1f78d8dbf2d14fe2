//! API handlers for the gridcast server.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use gridcast_auth::AuthError;
use gridcast_events::EventError;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::AppState;

/// API error type mapping to HTTP status codes.
///
/// Every error response carries the wire body
/// `{"error": {"code": "<string>", "message": "<string>"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::PayloadTooLarge(_) => "PayloadTooLarge",
            ApiError::NotFound(_) => "NotFound",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (self.status(), body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

impl From<EventError> for ApiError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::PayloadTooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

/// Handler for `GET /api/health`.
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Fallback for unknown routes, so every error response carries the wire
/// error body.
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("resource not found".to_string())
}

/// Handler for the topic's publish route.
///
/// Authenticates the publisher, parses and validates the body against the
/// topic's schema, then hands the accepted events to the fan-out engine.
/// The response never waits on deliveries: once the request itself is
/// valid, the publisher gets a success regardless of subscriber outcomes.
pub async fn publish_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let topic = &state.topic;

    gridcast_auth::authenticate(
        &topic.key,
        header_str(&headers, gridcast_auth::SAS_KEY_HEADER),
        header_str(&headers, gridcast_auth::SAS_TOKEN_HEADER),
        header_str(&headers, "authorization"),
        Utc::now(),
    )?;

    let mut events = gridcast_events::parse_events(&body, topic.schema)?;
    for event in &mut events {
        event.assign_topic(&topic.name);
    }

    tracing::info!(
        topic = %topic.name,
        count = events.len(),
        "accepted published events"
    );
    state.dispatcher.fan_out(topic, events);

    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    id: Uuid,
}

/// Handler for `GET /validate?id=<code>`, the out-of-band completion path
/// for webhook subscribers that cannot echo the validation code inline.
pub async fn validate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let matched = state
        .topic
        .webhook_subscribers
        .iter()
        .find(|subscriber| subscriber.try_manual_validation(query.id, now));

    match matched {
        Some(subscriber) => {
            tracing::info!(
                topic = %state.topic.name,
                subscriber = %subscriber.name,
                "webhook subscription validated via callback"
            );
            Ok(Json(json!({ "validated": true })))
        }
        None => Err(ApiError::BadRequest(
            "unknown or expired validation code".to_string(),
        )),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

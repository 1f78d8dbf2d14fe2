//! Gridcast server library logic.
//!
//! Each topic gets its own listener and its own router: the publish route
//! matching the topic's wire schema, the health probe, and the manual
//! validation callback. The binary in `main.rs` builds one of these routers
//! per enabled topic.

pub mod api;
pub mod config;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use gridcast_dispatch::Dispatcher;
use gridcast_types::{SchemaKind, Topic};
use tower_http::trace::TraceLayer;

/// Maximum request body size (16 MiB). Individual events are capped far
/// lower by the per-event ceiling; this only protects against OOM from
/// unbounded bodies.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// State shared by all handlers of one topic listener.
#[derive(Clone)]
pub struct AppState {
    /// The topic this listener serves.
    pub topic: Arc<Topic>,
    /// The shared fan-out engine.
    pub dispatcher: Arc<Dispatcher>,
}

/// Builds the router for one topic listener.
///
/// The publish route depends on the topic's schema: event-grid topics accept
/// `POST /api/events`, cloud-event topics accept
/// `POST /api/events/cloudevent`. Publishing the wrong schema to a topic
/// falls through to a 404.
pub fn topic_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(api::health_handler))
        .route("/validate", get(api::validate_handler));

    let router = match state.topic.schema {
        SchemaKind::EventGrid => router.route("/api/events", post(api::publish_handler)),
        SchemaKind::CloudEvent => {
            router.route("/api/events/cloudevent", post(api::publish_handler))
        }
    };

    router
        .fallback(api::not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(Extension(Arc::new(state)))
}

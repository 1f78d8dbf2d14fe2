//! Event fan-out to webhook and Service-Bus subscribers.
//!
//! Dispatch is fire-and-forget: for every accepted event, each eligible
//! subscriber gets its own detached delivery task. The publisher's response
//! never waits on a delivery, failures are logged and never retried, and no
//! ordering is guaranteed between events delivered to the same subscriber.

pub mod handshake;
mod servicebus;
mod webhook;

pub use servicebus::{build_message, ServiceBusMessage};

use std::sync::Arc;

use gridcast_events::{Event, EventFields};
use gridcast_types::Topic;

/// Delivery header names shared by both transports.
pub mod headers {
    pub const EVENT_TYPE: &str = "aeg-event-type";
    pub const SUBSCRIPTION_NAME: &str = "aeg-subscription-name";
    pub const DATA_VERSION: &str = "aeg-data-version";
    pub const METADATA_VERSION: &str = "aeg-metadata-version";
    pub const DELIVERY_COUNT: &str = "aeg-delivery-count";
}

/// `aeg-event-type` value for live deliveries.
pub const NOTIFICATION_EVENT_TYPE: &str = "Notification";

/// Per-subscriber delivery failures. Logged, never surfaced to publishers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The fan-out engine. Holds one HTTP client per transport; built once at
/// startup and shared across all listeners. Cloning is cheap (the underlying
/// clients are reference-counted), which is how each spawned delivery task
/// gets its own handle.
#[derive(Clone)]
pub struct Dispatcher {
    webhook: webhook::WebhookSender,
    service_bus: servicebus::ServiceBusSender,
}

impl Dispatcher {
    pub fn new() -> Result<Self, DispatchError> {
        Ok(Self {
            webhook: webhook::WebhookSender::new()?,
            service_bus: servicebus::ServiceBusSender::new()?,
        })
    }

    /// Fans `events` out to every eligible subscriber of `topic`.
    ///
    /// Each delivery runs on its own spawned task; this function returns as
    /// soon as all tasks are launched. Subscribers that are disabled, not
    /// yet validated, or whose filter rejects the event are skipped.
    pub fn fan_out(&self, topic: &Arc<Topic>, events: Vec<Event>) {
        for event in events {
            for subscriber in &topic.webhook_subscribers {
                if subscriber.disabled {
                    tracing::debug!(subscriber = %subscriber.name, "skipping disabled subscriber");
                    continue;
                }
                if !subscriber.is_eligible() {
                    tracing::info!(
                        subscriber = %subscriber.name,
                        event_id = %event.id(),
                        "skipping webhook subscriber awaiting validation"
                    );
                    continue;
                }
                if !gridcast_filter::accepts(subscriber.filter.as_ref(), &event) {
                    tracing::debug!(
                        subscriber = %subscriber.name,
                        event_id = %event.id(),
                        "filter rejected event"
                    );
                    continue;
                }

                let dispatcher = self.clone();
                let subscriber = subscriber.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    match dispatcher.webhook.deliver(&subscriber, &event).await {
                        Ok(()) => tracing::info!(
                            subscriber = %subscriber.name,
                            event_id = %event.id(),
                            "delivered event to webhook subscriber"
                        ),
                        Err(e) => tracing::warn!(
                            subscriber = %subscriber.name,
                            event_id = %event.id(),
                            "webhook delivery failed: {e}"
                        ),
                    }
                });
            }

            for subscriber in &topic.servicebus_subscribers {
                if subscriber.disabled {
                    tracing::debug!(subscriber = %subscriber.name, "skipping disabled subscriber");
                    continue;
                }
                if !gridcast_filter::accepts(subscriber.filter.as_ref(), &event) {
                    tracing::debug!(
                        subscriber = %subscriber.name,
                        event_id = %event.id(),
                        "filter rejected event"
                    );
                    continue;
                }

                let dispatcher = self.clone();
                let subscriber = subscriber.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    match dispatcher.service_bus.deliver(&subscriber, &event).await {
                        Ok(()) => tracing::info!(
                            subscriber = %subscriber.name,
                            event_id = %event.id(),
                            "delivered event to service bus subscriber"
                        ),
                        Err(e) => tracing::warn!(
                            subscriber = %subscriber.name,
                            event_id = %event.id(),
                            "service bus delivery failed: {e}"
                        ),
                    }
                });
            }
        }
    }
}

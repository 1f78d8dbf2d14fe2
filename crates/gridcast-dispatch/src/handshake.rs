//! The webhook subscription-validation handshake.
//!
//! Before live delivery begins, each webhook subscriber must prove it is the
//! intended receiver: the server POSTs a synthetic validation event carrying
//! a deterministic code, and the endpoint must echo the code back in its
//! response body. Endpoints that cannot answer inline may instead call the
//! topic's `GET /validate?id=<code>` endpoint within the validation window.
//!
//! A failed attempt is never retried automatically; the subscriber stays
//! ineligible until the manual callback completes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gridcast_events::EventGridEvent;
use gridcast_types::{Topic, TopicRegistry, ValidationState, WebhookSubscriber};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::headers;

/// Event type of the synthetic validation event.
pub const SUBSCRIPTION_VALIDATION_EVENT_TYPE: &str =
    "Microsoft.EventGrid.SubscriptionValidationEvent";

/// `aeg-event-type` header value for validation deliveries.
pub const SUBSCRIPTION_VALIDATION_HEADER: &str = "SubscriptionValidation";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Handshake failures; logged with a manual-validation hint, never retried.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("validation response body was malformed")]
    MalformedResponse,

    #[error("validation response did not echo the expected code")]
    CodeMismatch,
}

#[derive(Debug, Deserialize)]
struct ValidationReply {
    #[serde(rename = "validationResponse")]
    validation_response: String,
}

/// Runs validation handshakes against webhook subscribers. Cloning is cheap;
/// the startup sweep clones one handle per spawned attempt.
#[derive(Clone)]
pub struct HandshakeRunner {
    client: reqwest::Client,
    /// Host name advertised in callback URLs.
    host: String,
}

impl HandshakeRunner {
    pub fn new(host: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(HANDSHAKE_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }

    /// Startup sweep: validates every enabled, handshake-enabled webhook
    /// subscriber of every enabled topic. Each subscriber is validated on
    /// its own task so one hung endpoint cannot stall the rest.
    pub fn sweep(&self, registry: &TopicRegistry) {
        for topic in registry.topics() {
            if topic.disabled {
                continue;
            }
            for subscriber in &topic.webhook_subscribers {
                if subscriber.disabled || subscriber.disable_validation_handshake {
                    continue;
                }
                let runner = self.clone();
                let topic = Arc::clone(topic);
                let subscriber = subscriber.clone();
                tokio::spawn(async move {
                    runner.validate_subscriber(&topic, &subscriber).await;
                });
            }
        }
    }

    /// Re-runs the handshake for every pending webhook subscriber of one
    /// topic.
    pub async fn run_topic(&self, topic: &Arc<Topic>) {
        for subscriber in &topic.webhook_subscribers {
            if subscriber.disabled || subscriber.disable_validation_handshake {
                continue;
            }
            if subscriber.validation.state() == ValidationState::Successful {
                continue;
            }
            self.validate_subscriber(topic, subscriber).await;
        }
    }

    /// Sends one validation event and applies the resulting state
    /// transition.
    pub async fn validate_subscriber(&self, topic: &Arc<Topic>, subscriber: &WebhookSubscriber) {
        let code = subscriber.validation_code();
        let callback = format!(
            "https://{}:{}/validate?id={}",
            self.host, topic.port, code
        );

        subscriber.validation.set_state(ValidationState::EventSent);

        match self.challenge(subscriber, code, &callback).await {
            Ok(()) => {
                subscriber.validation.set_state(ValidationState::Successful);
                tracing::info!(
                    topic = %topic.name,
                    subscriber = %subscriber.name,
                    "webhook subscription validated"
                );
            }
            Err(e) => {
                subscriber.validation.set_state(ValidationState::Failed);
                tracing::warn!(
                    topic = %topic.name,
                    subscriber = %subscriber.name,
                    "webhook subscription validation failed: {e}; \
                     the endpoint can complete validation manually via {callback}"
                );
            }
        }
    }

    async fn challenge(
        &self,
        subscriber: &WebhookSubscriber,
        code: Uuid,
        callback: &str,
    ) -> Result<(), HandshakeError> {
        let event = validation_event(code, callback);

        let response = self
            .client
            .post(&subscriber.endpoint)
            .header(headers::EVENT_TYPE, SUBSCRIPTION_VALIDATION_HEADER)
            .header(headers::SUBSCRIPTION_NAME, subscriber.name.to_uppercase())
            .header(headers::DATA_VERSION, event.data_version.as_str())
            .header(headers::METADATA_VERSION, "1")
            .header(headers::DELIVERY_COUNT, "0")
            .json(&[&event])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HandshakeError::Status(response.status()));
        }

        let reply: ValidationReply = response
            .json()
            .await
            .map_err(|_| HandshakeError::MalformedResponse)?;
        let echoed =
            Uuid::parse_str(&reply.validation_response).map_err(|_| HandshakeError::CodeMismatch)?;
        if echoed != code {
            return Err(HandshakeError::CodeMismatch);
        }
        Ok(())
    }
}

/// Builds the synthetic validation event delivered to the endpoint.
fn validation_event(code: Uuid, callback: &str) -> EventGridEvent {
    EventGridEvent {
        id: Uuid::new_v4().to_string(),
        topic: String::new(),
        subject: String::new(),
        event_type: SUBSCRIPTION_VALIDATION_EVENT_TYPE.to_string(),
        event_time: Utc::now().to_rfc3339(),
        data_version: "2".to_string(),
        metadata_version: Some("1".to_string()),
        data: Some(json!({
            "validationCode": code.to_string(),
            "validationUrl": callback,
        })),
    }
}

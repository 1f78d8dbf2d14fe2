//! Topics and their subscribers.
//!
//! A topic binds one port, one shared key, and one wire schema, and owns the
//! subscribers that accepted events fan out to. Everything is immutable after
//! load except the webhook validation cell.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ConfigError, FilterConfig};

/// How long a webhook subscriber may complete validation after load.
pub const VALIDATION_WINDOW_SECS: i64 = 300;

/// The wire schema a topic accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaKind {
    /// The proprietary event-grid schema (`/api/events`).
    #[serde(rename = "eventgrid")]
    EventGrid,
    /// The cloud-events schema (`/api/events/cloudevent`).
    #[serde(rename = "cloudevent")]
    CloudEvent,
}

impl SchemaKind {
    /// Returns the canonical string label for this schema.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventGrid => "eventgrid",
            Self::CloudEvent => "cloudevent",
        }
    }
}

/// Whether a Service-Bus property mapping carries a literal or a lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingKind {
    /// The configured value is copied verbatim.
    #[serde(rename = "static")]
    Static,
    /// The configured value is a dotted path resolved against the event.
    #[serde(rename = "dynamic")]
    Dynamic,
}

/// One configured broker/user property mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub kind: MappingKind,
    pub value: String,
}

/// Webhook validation handshake states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationState {
    /// No validation attempt has been made yet.
    #[default]
    Unvalidated,
    /// A validation event was sent; awaiting the response.
    EventSent,
    /// The endpoint echoed the expected validation code.
    Successful,
    /// The attempt failed; the subscriber stays ineligible for delivery.
    Failed,
}

impl ValidationState {
    /// Returns the canonical string label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unvalidated => "Unvalidated",
            Self::EventSent => "EventSent",
            Self::Successful => "Successful",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Default)]
struct ValidationInner {
    state: Mutex<(ValidationState, Option<DateTime<Utc>>)>,
}

/// Shared handle to a webhook subscriber's validation state.
///
/// Both the startup handshake task and the inbound `/validate` handler mutate
/// this cell, so access goes through a lock. The lock is never held across an
/// await point.
#[derive(Debug, Clone, Default)]
pub struct ValidationHandle {
    inner: Arc<ValidationInner>,
}

impl ValidationHandle {
    /// Sets the validation deadline relative to `now`. Called once when the
    /// registry is built.
    pub fn arm(&self, now: DateTime<Utc>) {
        let mut guard = self.inner.state.lock().expect("validation lock poisoned");
        guard.1 = Some(now + Duration::seconds(VALIDATION_WINDOW_SECS));
    }

    /// Current state.
    pub fn state(&self) -> ValidationState {
        self.inner.state.lock().expect("validation lock poisoned").0
    }

    /// Deadline for out-of-band validation, if armed.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().expect("validation lock poisoned").1
    }

    /// Unconditionally transitions to `state`.
    pub fn set_state(&self, state: ValidationState) {
        self.inner.state.lock().expect("validation lock poisoned").0 = state;
    }

    /// Forces `Successful` if the deadline has not passed. Returns whether
    /// the transition happened.
    pub fn complete_before_deadline(&self, now: DateTime<Utc>) -> bool {
        let mut guard = self.inner.state.lock().expect("validation lock poisoned");
        match guard.1 {
            Some(deadline) if now <= deadline => {
                guard.0 = ValidationState::Successful;
                true
            }
            _ => false,
        }
    }
}

/// A configured webhook delivery target.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSubscriber {
    /// Subscriber name, unique across all topics.
    pub name: String,
    /// Endpoint URL events are POSTed to.
    pub endpoint: String,
    #[serde(default)]
    pub disabled: bool,
    /// Skips the validation handshake entirely; the subscriber is treated
    /// as validated from the start.
    #[serde(default)]
    pub disable_validation_handshake: bool,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Runtime validation cell; never part of the configuration document.
    #[serde(skip)]
    pub validation: ValidationHandle,
}

impl WebhookSubscriber {
    /// Derives the subscriber's validation code from its endpoint URL:
    /// the URL's UTF-8 bytes reversed, truncated to 16 bytes (zero-padded
    /// if shorter), read as a 128-bit identifier. Deterministic, so a
    /// restarted server issues the same code for the same endpoint.
    pub fn validation_code(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        for (slot, byte) in bytes.iter_mut().zip(self.endpoint.bytes().rev()) {
            *slot = byte;
        }
        Uuid::from_bytes(bytes)
    }

    /// Whether this subscriber may receive live events: it must be enabled
    /// and either exempt from the handshake or successfully validated.
    pub fn is_eligible(&self) -> bool {
        !self.disabled
            && (self.disable_validation_handshake
                || self.validation.state() == ValidationState::Successful)
    }

    /// Handles an inbound `/validate?id=...` callback. Succeeds only when the
    /// code matches and the validation window is still open.
    pub fn try_manual_validation(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        self.validation_code() == id && self.validation.complete_before_deadline(now)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidSubscriberName(self.name.clone()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint(self.name.clone()));
        }
        if let Some(filter) = &self.filter {
            filter.validate(&self.name)?;
        }
        Ok(())
    }
}

/// The nine property names that route to `BrokerProperties`; everything else
/// routes to `UserProperties`.
pub const RESERVED_BROKER_PROPERTIES: [&str; 9] = [
    "MessageId",
    "PartitionKey",
    "SessionId",
    "CorrelationId",
    "Label",
    "ReplyTo",
    "ReplyToSessionId",
    "To",
    "ViaPartitionKey",
];

/// A configured Service-Bus delivery target.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceBusSubscriber {
    /// Subscriber name, unique across all topics.
    pub name: String,
    /// Service-Bus namespace (the `{namespace}.servicebus.windows.net` host).
    pub namespace: String,
    /// Target Service-Bus topic.
    pub topic: String,
    pub shared_access_key_name: String,
    /// Base64 shared access key used to sign outbound SAS tokens.
    pub shared_access_key: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Broker/user property mappings applied to every outbound message.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyMapping>,
}

impl ServiceBusSubscriber {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidSubscriberName(self.name.clone()));
        }
        if !is_valid_namespace(&self.namespace) {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }
        if !is_valid_service_bus_topic(&self.topic) {
            return Err(ConfigError::InvalidServiceBusTopic(self.topic.clone()));
        }
        if base64::engine::general_purpose::STANDARD
            .decode(&self.shared_access_key)
            .is_err()
        {
            return Err(ConfigError::InvalidSharedAccessKey(self.name.clone()));
        }

        if let Some(mapping) = self.properties.get("MessageId") {
            if mapping.kind != MappingKind::Dynamic {
                return Err(ConfigError::InvalidPropertyMapping {
                    subscriber: self.name.clone(),
                    message: "a 'MessageId' mapping must be dynamic".to_string(),
                });
            }
        }
        if self.properties.contains_key("MessageId") && self.properties.contains_key("SessionId") {
            return Err(ConfigError::InvalidPropertyMapping {
                subscriber: self.name.clone(),
                message: "'MessageId' and 'SessionId' mappings cannot both be present".to_string(),
            });
        }

        if let Some(filter) = &self.filter {
            filter.validate(&self.name)?;
        }
        Ok(())
    }
}

/// A named, port-bound virtual event channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    /// Topic name, unique across the configuration.
    pub name: String,
    /// Listener port; doubles as the routing key for inbound requests.
    pub port: u16,
    /// Shared key publishers authenticate with.
    pub key: String,
    /// Wire schema accepted on this topic.
    pub schema: SchemaKind,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub webhook_subscribers: Vec<WebhookSubscriber>,
    #[serde(default)]
    pub servicebus_subscribers: Vec<ServiceBusSubscriber>,
}

impl Topic {
    /// Validates this topic and all of its subscribers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidTopicName(self.name.clone()));
        }
        for subscriber in &self.webhook_subscribers {
            subscriber.validate()?;
        }
        for subscriber in &self.servicebus_subscribers {
            subscriber.validate()?;
        }
        Ok(())
    }

    /// Names of every subscriber attached to this topic, used for the
    /// global uniqueness check.
    pub fn subscriber_names(&self) -> impl Iterator<Item = &str> {
        self.webhook_subscribers
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.servicebus_subscribers.iter().map(|s| s.name.as_str()))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_namespace(namespace: &str) -> bool {
    (6..=50).contains(&namespace.len())
        && namespace.starts_with(|c: char| c.is_ascii_alphabetic())
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !namespace.ends_with('-')
}

fn is_valid_service_bus_topic(topic: &str) -> bool {
    (3..=63).contains(&topic.len())
        && topic
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !topic.starts_with('-')
        && !topic.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn webhook(name: &str, endpoint: &str) -> WebhookSubscriber {
        WebhookSubscriber {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            disabled: false,
            disable_validation_handshake: false,
            filter: None,
            validation: ValidationHandle::default(),
        }
    }

    fn servicebus(name: &str) -> ServiceBusSubscriber {
        ServiceBusSubscriber {
            name: name.to_string(),
            namespace: "my-namespace".to_string(),
            topic: "orders-in".to_string(),
            shared_access_key_name: "RootManageSharedAccessKey".to_string(),
            shared_access_key: base64::engine::general_purpose::STANDARD.encode(b"secret"),
            disabled: false,
            filter: None,
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn validation_code_is_deterministic_and_reversed() {
        let sub = webhook("hook", "https://localhost:5050/endpoint");
        let code = sub.validation_code();
        assert_eq!(code, sub.validation_code());

        // First byte of the code is the last byte of the URL.
        assert_eq!(code.as_bytes()[0], b't');
    }

    #[test]
    fn validation_code_pads_short_endpoints() {
        let sub = webhook("hook", "a:b");
        let bytes = sub.validation_code().into_bytes();
        assert_eq!(&bytes[..3], &[b'b', b':', b'a']);
        assert!(bytes[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn unvalidated_subscriber_is_not_eligible() {
        let sub = webhook("hook", "https://localhost:5050/endpoint");
        assert!(!sub.is_eligible());
    }

    #[test]
    fn successful_validation_makes_subscriber_eligible() {
        let sub = webhook("hook", "https://localhost:5050/endpoint");
        sub.validation.set_state(ValidationState::Successful);
        assert!(sub.is_eligible());
    }

    #[test]
    fn handshake_exempt_subscriber_is_eligible() {
        let mut sub = webhook("hook", "https://localhost:5050/endpoint");
        sub.disable_validation_handshake = true;
        assert!(sub.is_eligible());
    }

    #[test]
    fn disabled_subscriber_is_never_eligible() {
        let mut sub = webhook("hook", "https://localhost:5050/endpoint");
        sub.disable_validation_handshake = true;
        sub.disabled = true;
        assert!(!sub.is_eligible());
    }

    #[test]
    fn manual_validation_respects_deadline() {
        let sub = webhook("hook", "https://localhost:5050/endpoint");
        let now = Utc::now();
        sub.validation.arm(now);

        let wrong_code = Uuid::new_v4();
        assert!(!sub.try_manual_validation(wrong_code, now));

        let late = now + Duration::seconds(VALIDATION_WINDOW_SECS + 1);
        assert!(!sub.try_manual_validation(sub.validation_code(), late));
        assert_eq!(sub.validation.state(), ValidationState::Unvalidated);

        assert!(sub.try_manual_validation(sub.validation_code(), now));
        assert_eq!(sub.validation.state(), ValidationState::Successful);
    }

    #[test]
    fn static_message_id_mapping_is_rejected() {
        let mut sub = servicebus("sb");
        sub.properties.insert(
            "MessageId".to_string(),
            PropertyMapping {
                kind: MappingKind::Static,
                value: "fixed".to_string(),
            },
        );
        assert!(matches!(
            sub.validate(),
            Err(ConfigError::InvalidPropertyMapping { .. })
        ));
    }

    #[test]
    fn message_id_and_session_id_cannot_coexist() {
        let mut sub = servicebus("sb");
        sub.properties.insert(
            "MessageId".to_string(),
            PropertyMapping {
                kind: MappingKind::Dynamic,
                value: "Id".to_string(),
            },
        );
        sub.properties.insert(
            "SessionId".to_string(),
            PropertyMapping {
                kind: MappingKind::Dynamic,
                value: "Subject".to_string(),
            },
        );
        assert!(sub.validate().is_err());
    }

    #[test]
    fn namespace_shape_is_enforced() {
        let mut sub = servicebus("sb");
        sub.namespace = "short".to_string();
        assert!(sub.validate().is_err());

        sub.namespace = "1starts-with-digit".to_string();
        assert!(sub.validate().is_err());

        sub.namespace = "valid-namespace".to_string();
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn service_bus_topic_shape_is_enforced() {
        let mut sub = servicebus("sb");
        sub.topic = "Has-Uppercase".to_string();
        assert!(sub.validate().is_err());

        sub.topic = "ok".to_string();
        assert!(sub.validate().is_err());

        sub.topic = "orders".to_string();
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn bad_base64_key_is_rejected() {
        let mut sub = servicebus("sb");
        sub.shared_access_key = "not base64!!".to_string();
        assert!(sub.validate().is_err());
    }
}

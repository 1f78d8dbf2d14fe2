//! Wire event schemas, parsing, and validation.
//!
//! Two schemas are supported: the proprietary event-grid schema
//! ([`EventGridEvent`]) and the cloud-events schema ([`CloudEvent`]). Both
//! expose the same capability surface through [`EventFields`], which is what
//! the filter engine and the Service-Bus property mapper evaluate against.
//!
//! Parsing accepts a JSON array of events and enforces a per-event
//! serialized-size ceiling before any schema check runs.

mod cloud;
mod grid;

pub use cloud::CloudEvent;
pub use grid::EventGridEvent;

use gridcast_types::SchemaKind;
use serde::Serialize;
use serde_json::Value;

/// Per-event serialized-size ceiling, in bytes. Exceeding it rejects the
/// whole request with a payload-too-large error.
pub const MAX_EVENT_BYTES: usize = 1_049_600;

/// Errors raised while parsing or validating inbound event payloads.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The request body is not a JSON array of objects.
    #[error("request body is not a JSON array of events: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A single event exceeded the serialized-size ceiling. The message is
    /// stable; callers map it to an HTTP 413.
    #[error("event '{id}' exceeds the maximum allowed event size of 1049600 bytes (got {size} bytes)")]
    PayloadTooLarge { id: String, size: usize },

    /// A schema-level validation failure. Callers map it to an HTTP 400.
    #[error("{0}")]
    Invalid(String),
}

/// The capability surface shared by both event schemas: identity fields plus
/// dotted-path lookup for filter evaluation and property mapping.
pub trait EventFields {
    /// The event id.
    fn id(&self) -> &str;

    /// The event subject, if the schema carries one.
    fn subject(&self) -> Option<&str>;

    /// The event type string.
    fn event_type(&self) -> &str;

    /// The data version, if the schema carries one.
    fn data_version(&self) -> Option<&str>;

    /// Resolves a dotted filter key (`Subject`, `Data.Key1`, ...) against
    /// this event. Returns `None` for keys the schema cannot resolve,
    /// including keys that only exist on the other schema.
    fn lookup(&self, key: &str) -> Option<Value>;
}

/// A parsed event of either schema, selected by the topic's schema kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Event {
    Grid(EventGridEvent),
    Cloud(CloudEvent),
}

impl Event {
    /// Stamps the server-assigned topic path onto the event. Only the
    /// event-grid schema carries a topic field; for cloud events this is a
    /// no-op.
    pub fn assign_topic(&mut self, topic_name: &str) {
        if let Event::Grid(event) = self {
            event.topic = format!("/gridcast/topics/{topic_name}");
        }
    }
}

impl EventFields for Event {
    fn id(&self) -> &str {
        match self {
            Event::Grid(e) => e.id(),
            Event::Cloud(e) => e.id(),
        }
    }

    fn subject(&self) -> Option<&str> {
        match self {
            Event::Grid(e) => e.subject(),
            Event::Cloud(e) => e.subject(),
        }
    }

    fn event_type(&self) -> &str {
        match self {
            Event::Grid(e) => e.event_type(),
            Event::Cloud(e) => e.event_type(),
        }
    }

    fn data_version(&self) -> Option<&str> {
        match self {
            Event::Grid(e) => e.data_version(),
            Event::Cloud(e) => e.data_version(),
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        match self {
            Event::Grid(e) => e.lookup(key),
            Event::Cloud(e) => e.lookup(key),
        }
    }
}

/// Parses a raw request body into validated events of the given schema.
///
/// The body must be a JSON array. Each element is size-checked against
/// [`MAX_EVENT_BYTES`] (on its compact serialized form), mapped onto the
/// schema type, and validated. The first failing event fails the whole
/// request.
pub fn parse_events(raw: &[u8], kind: SchemaKind) -> Result<Vec<Event>, EventError> {
    let items: Vec<Value> = serde_json::from_slice(raw)?;

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let size = item.to_string().len();
        if size > MAX_EVENT_BYTES {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            return Err(EventError::PayloadTooLarge { id, size });
        }

        let event = match kind {
            SchemaKind::EventGrid => {
                let event: EventGridEvent = serde_json::from_value(item)
                    .map_err(|e| EventError::Invalid(format!("event is not a valid object: {e}")))?;
                event.validate()?;
                Event::Grid(event)
            }
            SchemaKind::CloudEvent => {
                let event: CloudEvent = serde_json::from_value(item)
                    .map_err(|e| EventError::Invalid(format!("event is not a valid object: {e}")))?;
                event.validate()?;
                Event::Cloud(event)
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Walks a dotted path through a JSON tree, cloning the reached value.
pub(crate) fn walk_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

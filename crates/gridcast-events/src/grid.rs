//! The proprietary event-grid wire schema.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{walk_path, EventError, EventFields};

/// An event in the event-grid schema.
///
/// Unrecognized wire properties are silently dropped during deserialization.
/// Missing string fields deserialize as empty and are caught by
/// [`EventGridEvent::validate`], which keeps the wire-shape mapping and the
/// rule checks separate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGridEvent {
    #[serde(default)]
    pub id: String,

    /// Server-assigned topic path. Must be empty on input; stamped after
    /// the event is accepted.
    #[serde(default)]
    pub topic: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub event_type: String,

    /// Publisher timestamp. Must parse with an explicit UTC offset; naive
    /// timestamps are rejected.
    #[serde(default)]
    pub event_time: String,

    #[serde(default)]
    pub data_version: String,

    /// Must be absent or the literal `"1"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventGridEvent {
    /// Checks the schema rules that cannot be expressed in the type shape.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.id.is_empty() {
            return Err(EventError::Invalid("event 'id' is required".to_string()));
        }
        if self.subject.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'subject' is required",
                self.id
            )));
        }
        if self.event_type.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'eventType' is required",
                self.id
            )));
        }
        if self.event_time.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'eventTime' is required",
                self.id
            )));
        }
        if DateTime::parse_from_rfc3339(&self.event_time).is_err() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'eventTime' must be an RFC 3339 timestamp with an explicit offset",
                self.id
            )));
        }
        if let Some(version) = &self.metadata_version {
            if version != "1" {
                return Err(EventError::Invalid(format!(
                    "event '{}': 'metadataVersion' must be '1' when present",
                    self.id
                )));
            }
        }
        if !self.topic.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'topic' is assigned by the server and must not be supplied",
                self.id
            )));
        }
        Ok(())
    }
}

impl EventFields for EventGridEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn subject(&self) -> Option<&str> {
        Some(&self.subject)
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn data_version(&self) -> Option<&str> {
        Some(&self.data_version)
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        match key {
            "Id" => Some(Value::String(self.id.clone())),
            "Subject" => Some(Value::String(self.subject.clone())),
            "EventType" | "Type" => Some(Value::String(self.event_type.clone())),
            "Topic" => Some(Value::String(self.topic.clone())),
            "DataVersion" => Some(Value::String(self.data_version.clone())),
            "Data" => self.data.clone(),
            // These keys only exist on the cloud schema; a filter naming
            // them can never match an event-grid event.
            "EventId" | "Source" | "EventTypeVersion" => None,
            _ => {
                let path = key.strip_prefix("Data.")?;
                walk_path(self.data.as_ref()?, path)
            }
        }
    }
}

//! The cloud-events wire schema.

use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{walk_path, EventError, EventFields};

/// An event in the cloud-events schema.
///
/// Unlike the event-grid schema, unrecognized wire properties are not
/// dropped: they are captured as extension attributes and validated against
/// the lowercase-alphanumeric naming rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudEvent {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub source: String,

    #[serde(rename = "type", default)]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Must equal `"1.0"` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specversion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataschema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(rename = "data_base64", default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,

    /// Open extension attributes. Names must match `^[a-z0-9]+$`.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl CloudEvent {
    /// Checks the schema rules that cannot be expressed in the type shape.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.id.is_empty() {
            return Err(EventError::Invalid("event 'id' is required".to_string()));
        }
        if self.source.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'source' is required",
                self.id
            )));
        }
        if self.event_type.is_empty() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'type' is required",
                self.id
            )));
        }
        if let Some(version) = &self.specversion {
            if version != "1.0" {
                return Err(EventError::Invalid(format!(
                    "event '{}': 'specversion' must be '1.0' when present",
                    self.id
                )));
            }
        }
        if let Some(time) = &self.time {
            if DateTime::parse_from_rfc3339(time).is_err() {
                return Err(EventError::Invalid(format!(
                    "event '{}': 'time' must be an RFC 3339 timestamp",
                    self.id
                )));
            }
        }
        if self.data.is_some() && self.data_base64.is_some() {
            return Err(EventError::Invalid(format!(
                "event '{}': 'data' and 'data_base64' are mutually exclusive",
                self.id
            )));
        }
        if let Some(encoded) = &self.data_base64 {
            if base64::engine::general_purpose::STANDARD.decode(encoded).is_err() {
                return Err(EventError::Invalid(format!(
                    "event '{}': 'data_base64' is not valid base64",
                    self.id
                )));
            }
        }
        for name in self.extensions.keys() {
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if !valid {
                return Err(EventError::Invalid(format!(
                    "event '{}': extension attribute '{name}' must contain only lowercase letters and digits",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

impl EventFields for CloudEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    // Cloud events carry no data version; delivery headers send it empty.
    fn data_version(&self) -> Option<&str> {
        None
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        match key {
            "Id" => Some(Value::String(self.id.clone())),
            "Source" => Some(Value::String(self.source.clone())),
            "EventType" | "Type" => Some(Value::String(self.event_type.clone())),
            "Subject" => self.subject.clone().map(Value::String),
            "Data" => self.data.clone(),
            // These keys only exist on the event-grid schema; a filter
            // naming them can never match a cloud event.
            "EventId" | "EventTypeVersion" | "Topic" | "DataVersion" => None,
            _ => {
                if let Some(path) = key.strip_prefix("Data.") {
                    return walk_path(self.data.as_ref()?, path);
                }
                self.extensions.get(key).cloned()
            }
        }
    }
}

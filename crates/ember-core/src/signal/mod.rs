pub mod path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

pub use path::Resolved;

/// An inbound signal from an upstream producer (alert feed, metric sample,
/// job outcome, module lifecycle). Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    source: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default = "empty_payload")]
    payload: Value,
    timestamp: DateTime<Utc>,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

impl Event {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let event = Self {
            source: source.into(),
            event_type: event_type.into(),
            payload,
            timestamp,
        };
        event.validate()?;
        Ok(event)
    }

    /// Checks the shape of an event that arrived through deserialization.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.source.trim().is_empty() {
            return Err(DomainError::InvalidEvent("source is empty".into()));
        }
        if self.event_type.trim().is_empty() {
            return Err(DomainError::InvalidEvent("type is empty".into()));
        }
        if !self.payload.is_object() {
            return Err(DomainError::InvalidEvent("payload must be an object".into()));
        }
        Ok(())
    }

    pub fn field(&self, path: &str) -> Resolved<'_> {
        path::resolve(&self.payload, path)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

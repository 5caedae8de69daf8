//! Server-pushed resource events.
//!
//! Events are produced by the real-time channel's decode step and folded
//! into view-local collections by the reducer. They are never persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new entity.
    Create,
    /// A partial change to an existing entity.
    Update,
    /// Removal of an entity.
    Delete,
}

impl Operation {
    /// Returns the operation name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(()),
        }
    }
}

/// A decoded, validated resource event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Resource name, e.g. `"log"` or `"attendance"`.
    pub resource: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Resource-specific fields.
    pub payload: Map<String, Value>,
    /// When the client received the message.
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(resource: impl Into<String>, operation: Operation, payload: Map<String, Value>) -> Self {
        Self {
            resource: resource.into(),
            operation,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Returns the entity ID stored under `field`, normalized to a string.
    ///
    /// String and integer IDs are accepted; anything else yields `None`.
    pub fn entity_id(&self, field: &str) -> Option<String> {
        self.payload.get(field).and_then(normalize_id)
    }
}

/// Normalizes an ID value to its string form.
///
/// Non-empty strings and numbers are IDs; `7` and `"7"` normalize alike.
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! Entities stored in view-local collections.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use attendsync_core::error::AppError;
use attendsync_core::events::normalize_id;
use attendsync_core::result::AppResult;
use attendsync_core::types::string_or_number;

/// Payload field holding the entity ID.
pub const ID_FIELD: &str = "id";

/// An entity that can be built from and patched by event payloads.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Stable ID.
    fn entity_id(&self) -> String;

    /// Build from a `create` payload.
    fn from_payload(payload: &Map<String, Value>) -> AppResult<Self>;

    /// Apply an `update` payload; fields present in `patch` win.
    fn merge(&mut self, patch: &Map<String, Value>) -> AppResult<()>;
}

/// Untyped entity holding the raw payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Normalized ID.
    pub id: String,
    /// All payload fields, including `id`.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Returns a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a string field by name.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

impl Entity for Record {
    fn entity_id(&self) -> String {
        self.id.clone()
    }

    fn from_payload(payload: &Map<String, Value>) -> AppResult<Self> {
        let id = id_of(payload).ok_or_else(|| AppError::malformed("Payload has no usable `id`"))?;
        Ok(Self {
            id,
            fields: payload.clone(),
        })
    }

    fn merge(&mut self, patch: &Map<String, Value>) -> AppResult<()> {
        for (key, value) in patch {
            if key == ID_FIELD {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// One student's check-in for an attendance session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Record ID.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Session the record belongs to.
    #[serde(default)]
    pub session_id: Option<Value>,
    /// Display name of the student.
    #[serde(default)]
    pub student_name: Option<String>,
    /// `present`, `late`, `absent`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// When the QR code was scanned.
    #[serde(default)]
    pub marked_at: Option<DateTime<Utc>>,
}

impl Entity for AttendanceRecord {
    fn entity_id(&self) -> String {
        self.id.clone()
    }

    fn from_payload(payload: &Map<String, Value>) -> AppResult<Self> {
        Ok(serde_json::from_value(Value::Object(payload.clone()))?)
    }

    fn merge(&mut self, patch: &Map<String, Value>) -> AppResult<()> {
        *self = merge_serde(self, patch)?;
        Ok(())
    }
}

/// Field-wise merge for any serde entity: serialize, overlay, deserialize.
pub fn merge_serde<T>(entity: &T, patch: &Map<String, Value>) -> AppResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(mut fields) = serde_json::to_value(entity)? else {
        return Err(AppError::internal("Entity does not serialize to an object"));
    };
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Normalized ID of a payload.
pub fn id_of(payload: &Map<String, Value>) -> Option<String> {
    payload.get(ID_FIELD).and_then(normalize_id)
}

//! Boundary decode from raw frames into typed [`Event`]s.
//!
//! Wire shape: `{ "resource": ..., "operation": "create"|"update"|"delete", ... }`.
//! A nested `payload` object, when present, is the payload; otherwise every
//! field other than `resource` and `operation` is. Nothing downstream of this
//! module re-validates an event.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use attendsync_core::error::AppError;
use attendsync_core::events::{Event, Operation};

use super::validator::validate_inbound;

const RESOURCE_FIELD: &str = "resource";
const OPERATION_FIELD: &str = "operation";
const PAYLOAD_FIELD: &str = "payload";
const TYPE_FIELD: &str = "type";

/// Resources a channel accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceFilter {
    /// Every resource.
    #[default]
    Any,
    /// Only the listed resources.
    Only(BTreeSet<String>),
}

impl ResourceFilter {
    /// Accept only the given resources.
    pub fn only<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourceFilter::Only(resources.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if events for `resource` are accepted.
    pub fn accepts(&self, resource: &str) -> bool {
        match self {
            ResourceFilter::Any => true,
            ResourceFilter::Only(set) => set.contains(resource),
        }
    }
}

/// Why a well-formed message produced no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// The operation is not one of create/update/delete.
    UnknownOperation(String),
    /// The channel does not accept this resource.
    UnknownResource(String),
    /// A server control message (`{"type": ...}` without a resource).
    Control(String),
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ignored::UnknownOperation(op) => write!(f, "unknown operation {op:?}"),
            Ignored::UnknownResource(r) => write!(f, "unknown resource {r:?}"),
            Ignored::Control(t) => write!(f, "control message {t:?}"),
        }
    }
}

/// Outcome of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A valid event.
    Event(Event),
    /// A well-formed message with nothing to apply.
    Ignored(Ignored),
}

/// Decode a raw frame.
///
/// Structurally invalid input yields a `MalformedMessage` error; valid input
/// the channel has no use for yields [`Decoded::Ignored`].
pub fn decode_event(raw: &str, filter: &ResourceFilter) -> Result<Decoded, AppError> {
    validate_inbound(raw)?;

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::malformed(format!("Invalid JSON: {e}")))?;
    let Value::Object(mut fields) = value else {
        return Err(AppError::malformed("Message is not a JSON object"));
    };

    let resource = match fields.remove(RESOURCE_FIELD) {
        Some(Value::String(r)) if !r.trim().is_empty() => r,
        Some(_) => return Err(AppError::malformed("Field `resource` must be a non-empty string")),
        None => {
            if let Some(Value::String(kind)) = fields.get(TYPE_FIELD) {
                return Ok(Decoded::Ignored(Ignored::Control(kind.clone())));
            }
            return Err(AppError::malformed("Missing field `resource`"));
        }
    };

    let operation = match fields.remove(OPERATION_FIELD) {
        Some(Value::String(op)) => op,
        Some(_) => return Err(AppError::malformed("Field `operation` must be a string")),
        None => return Err(AppError::malformed("Missing field `operation`")),
    };

    let payload = extract_payload(fields)?;

    let Ok(operation) = operation.parse::<Operation>() else {
        return Ok(Decoded::Ignored(Ignored::UnknownOperation(operation)));
    };
    if !filter.accepts(&resource) {
        return Ok(Decoded::Ignored(Ignored::UnknownResource(resource)));
    }

    Ok(Decoded::Event(Event::new(resource, operation, payload)))
}

fn extract_payload(mut fields: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
    match fields.remove(PAYLOAD_FIELD) {
        Some(Value::Object(payload)) => Ok(payload),
        Some(_) => Err(AppError::malformed("Field `payload` must be an object")),
        None => Ok(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendsync_core::ErrorKind;
    use serde_json::json;

    fn decode(raw: &str) -> Result<Decoded, AppError> {
        decode_event(raw, &ResourceFilter::Any)
    }

    fn event(decoded: Decoded) -> Event {
        match decoded {
            Decoded::Event(e) => e,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_payload() {
        let ev = event(
            decode(r#"{"resource":"log","operation":"create","payload":{"id":"L1","action":"x"}}"#)
                .unwrap(),
        );
        assert_eq!(ev.resource, "log");
        assert_eq!(ev.operation, Operation::Create);
        assert_eq!(Value::Object(ev.payload), json!({"id": "L1", "action": "x"}));
    }

    #[test]
    fn test_flat_payload() {
        let ev = event(
            decode(r#"{"resource":"attendance","operation":"update","id":5,"status":"late"}"#)
                .unwrap(),
        );
        assert_eq!(ev.entity_id("id").as_deref(), Some("5"));
        assert_eq!(Value::Object(ev.payload), json!({"id": 5, "status": "late"}));
    }

    #[test]
    fn test_malformed_inputs() {
        for raw in [
            "not json",
            "[1,2]",
            r#"{"operation":"create"}"#,
            r#"{"resource":"","operation":"create"}"#,
            r#"{"resource":7,"operation":"create"}"#,
            r#"{"resource":"log"}"#,
            r#"{"resource":"log","operation":1}"#,
            r#"{"resource":"log","operation":"create","payload":"L1"}"#,
        ] {
            let err = decode(raw).unwrap_err();
            assert_eq!(err.kind, ErrorKind::MalformedMessage, "input: {raw}");
        }
    }

    #[test]
    fn test_unknown_combinations_are_ignored() {
        assert_eq!(
            decode(r#"{"resource":"log","operation":"archive","id":"L1"}"#).unwrap(),
            Decoded::Ignored(Ignored::UnknownOperation("archive".into()))
        );

        let filter = ResourceFilter::only(["attendance"]);
        assert_eq!(
            decode_event(r#"{"resource":"log","operation":"create","id":"L1"}"#, &filter).unwrap(),
            Decoded::Ignored(Ignored::UnknownResource("log".into()))
        );

        assert_eq!(
            decode(r#"{"type":"ping"}"#).unwrap(),
            Decoded::Ignored(Ignored::Control("ping".into()))
        );
    }
}

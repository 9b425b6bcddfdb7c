//! Envelope protocol.
//!
//! Correlated messages share the channel with arbitrary other traffic. They
//! are recognised by the `plugin` tag and carry exactly one of `requestId`
//! or `responseId`:
//!
//! ```text
//! { "plugin": "primus-callbacks", "requestId": "…", "data": … }
//! { "plugin": "primus-callbacks", "responseId": "…", "data": …, "error"?: … }
//! ```
//!
//! Field names and the tag value match the JavaScript implementation so
//! both can talk to each other over the same socket.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::{self, RemoteError};

/// Tag value identifying this protocol's messages.
pub const PROTOCOL_TAG: &str = "primus-callbacks";

/// Name of the field carrying [`PROTOCOL_TAG`].
pub const TAG_FIELD: &str = "plugin";

const REQUEST_ID: &str = "requestId";
const RESPONSE_ID: &str = "responseId";
const DATA: &str = "data";
const ERROR: &str = "error";

/// Wire envelope for a request or a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Protocol tag, always [`PROTOCOL_TAG`] for envelopes built here.
    pub plugin: String,
    /// Set on requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Set on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Application payload, opaque to the engine.
    #[serde(default)]
    pub data: Value,
    /// Encoded error, only on failed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(id: impl Into<String>, data: Value) -> Self {
        Self {
            plugin: PROTOCOL_TAG.to_string(),
            request_id: Some(id.into()),
            response_id: None,
            data,
            error: None,
        }
    }

    /// Build a response envelope for the request `id`.
    pub fn response(id: impl Into<String>, data: Value, error: Option<&RemoteError>) -> Self {
        Self {
            plugin: PROTOCOL_TAG.to_string(),
            request_id: None,
            response_id: Some(id.into()),
            data,
            error: error.map(codec::encode),
        }
    }

    /// Correlation id of this envelope, whichever direction it has.
    pub fn id(&self) -> Option<&str> {
        self.request_id
            .as_deref()
            .or(self.response_id.as_deref())
    }

    /// Convert into a generic message for channels that carry JSON values.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert(TAG_FIELD.to_string(), Value::String(self.plugin));
        if let Some(id) = self.request_id {
            map.insert(REQUEST_ID.to_string(), Value::String(id));
        }
        if let Some(id) = self.response_id {
            map.insert(RESPONSE_ID.to_string(), Value::String(id));
        }
        map.insert(DATA.to_string(), self.data);
        if let Some(error) = self.error {
            map.insert(ERROR.to_string(), error);
        }
        Value::Object(map)
    }
}

impl From<Envelope> for Value {
    fn from(envelope: Envelope) -> Self {
        envelope.into_value()
    }
}

/// Result of classifying an arriving message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Not ours; handed back untouched.
    Foreign(Value),
    /// A request from the peer.
    Request {
        id: String,
        payload: Value,
        error: Option<Value>,
    },
    /// A response to one of our requests.
    Response {
        id: String,
        payload: Value,
        error: Option<Value>,
    },
    /// Tagged, but carries no usable id. Dropped.
    Malformed,
}

/// Returns `true` if `message` carries the protocol tag.
pub fn is_tagged(message: &Value) -> bool {
    message.get(TAG_FIELD).and_then(Value::as_str) == Some(PROTOCOL_TAG)
}

/// Classify an arriving message.
///
/// A message with both ids set is treated as a request.
pub fn classify(message: Value) -> Inbound {
    if !is_tagged(&message) {
        return Inbound::Foreign(message);
    }
    let Value::Object(mut map) = message else {
        return Inbound::Malformed;
    };

    let payload = map.remove(DATA).unwrap_or(Value::Null);
    let error = map.remove(ERROR).filter(|e| !e.is_null());

    if let Some(id) = take_id(&mut map, REQUEST_ID) {
        Inbound::Request { id, payload, error }
    } else if let Some(id) = take_id(&mut map, RESPONSE_ID) {
        Inbound::Response { id, payload, error }
    } else {
        Inbound::Malformed
    }
}

fn take_id(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(id) if !id.is_empty() => Some(id),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let value = Envelope::request("r1", json!({ "q": 1 })).into_value();
        assert_eq!(
            value,
            json!({ "plugin": PROTOCOL_TAG, "requestId": "r1", "data": { "q": 1 } })
        );
    }

    #[test]
    fn test_into_value_matches_serde() {
        let error = RemoteError::new("boom");
        let envelope = Envelope::response("r2", json!(null), Some(&error));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            envelope.clone().into_value()
        );
    }

    #[test]
    fn test_classify_request() {
        let message = json!({ "plugin": PROTOCOL_TAG, "requestId": "r1", "data": "ping" });
        assert_eq!(
            classify(message),
            Inbound::Request {
                id: "r1".into(),
                payload: json!("ping"),
                error: None
            }
        );
    }

    #[test]
    fn test_classify_response_with_error() {
        let wire_error = codec::encode(&RemoteError::new("boom"));
        let message = json!({
            "plugin": PROTOCOL_TAG,
            "responseId": "r2",
            "data": null,
            "error": wire_error,
        });

        match classify(message) {
            Inbound::Response { id, payload, error } => {
                assert_eq!(id, "r2");
                assert_eq!(payload, Value::Null);
                assert_eq!(error, Some(wire_error));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_data_reads_as_null() {
        let message = json!({ "plugin": PROTOCOL_TAG, "responseId": "r3" });
        assert!(matches!(
            classify(message),
            Inbound::Response { payload: Value::Null, .. }
        ));
    }

    #[test]
    fn test_untagged_is_foreign_and_untouched() {
        let message = json!({ "requestId": "r1", "data": "not ours" });
        assert_eq!(classify(message.clone()), Inbound::Foreign(message));

        let other_tag = json!({ "plugin": "something-else", "requestId": "r1" });
        assert_eq!(classify(other_tag.clone()), Inbound::Foreign(other_tag));

        assert_eq!(classify(json!("text")), Inbound::Foreign(json!("text")));
    }

    #[test]
    fn test_tagged_without_ids_is_malformed() {
        assert_eq!(
            classify(json!({ "plugin": PROTOCOL_TAG, "data": 1 })),
            Inbound::Malformed
        );
        assert_eq!(
            classify(json!({ "plugin": PROTOCOL_TAG, "requestId": "" })),
            Inbound::Malformed
        );
        assert_eq!(
            classify(json!({ "plugin": PROTOCOL_TAG, "responseId": null })),
            Inbound::Malformed
        );
    }

    #[test]
    fn test_request_id_wins_over_response_id() {
        let message = json!({ "plugin": PROTOCOL_TAG, "requestId": "a", "responseId": "b" });
        assert!(matches!(classify(message), Inbound::Request { id, .. } if id == "a"));
    }

    #[test]
    fn test_constructors_set_one_id() {
        let request = Envelope::request("a", Value::Null);
        assert_eq!(request.id(), Some("a"));
        assert!(request.response_id.is_none());

        let response = Envelope::response("b", Value::Null, None);
        assert_eq!(response.id(), Some("b"));
        assert!(response.request_id.is_none());
        assert!(response.error.is_none());
    }
}

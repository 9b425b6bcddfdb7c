//! Transport-safe error representation.
//!
//! Errors cross the channel as plain JSON objects marked with the
//! `__isError` sentinel. Every field of the error is copied, including
//! custom ones, so the receiving side can rebuild an equivalent value:
//!
//! ```text
//! { "__isError": true, "name": "Error", "message": "boom", "code": 42 }
//! ```
//!
//! The codec is pure and only runs at the envelope boundary. The original
//! error type is not preserved; [`RemoteError`] is the single generic shape
//! that round-trips with full field fidelity.
//!
//! # Example
//!
//! ```
//! use replywire::codec::{decode, encode, RemoteError};
//!
//! let err = RemoteError::new("boom").with_field("code", 42);
//! let wire = encode(&err);
//! let back = decode(wire).into_error().unwrap();
//! assert_eq!(back, err);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Marker field identifying an encoded error.
pub const ERROR_SENTINEL: &str = "__isError";

/// Name given to errors that carry no explicit name.
pub const DEFAULT_ERROR_NAME: &str = "Error";

const NAME: &str = "name";
const MESSAGE: &str = "message";
const STACK: &str = "stack";
const CAUSE: &str = "cause";

/// Generic error value that can travel through the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    name: String,
    message: String,
    stack: Option<String>,
    /// Custom fields. Nested errors are stored in their encoded form.
    fields: Map<String, Value>,
}

impl RemoteError {
    /// Create a generic `Error` with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_ERROR_NAME.to_string(),
            message: message.into(),
            stack: None,
            fields: Map::new(),
        }
    }

    /// Capture a native error.
    ///
    /// The `Display` text becomes the message and the `source()` chain is
    /// captured recursively under the `cause` field.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(remote) = err.downcast_ref::<RemoteError>() {
            return remote.clone();
        }

        let remote = Self::new(err.to_string());
        match err.source() {
            Some(source) => remote.with_error_field(CAUSE, &Self::from_error(source)),
            None => remote,
        }
    }

    /// Rebuild an error from the `error` field of a response envelope.
    ///
    /// Peers that do not use the sentinel may send a bare string or any
    /// other value; those become a generic error carrying the text.
    pub fn from_wire(value: Value) -> Self {
        match decode(value) {
            Revived::Error(error) => error,
            Revived::Value(Value::String(message)) => Self::new(message),
            other => Self::new(other.into_value().to_string()),
        }
    }

    /// Set the error name (defaults to `Error`).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a stack trace or backtrace text.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach a custom field.
    ///
    /// `name`, `message` and `stack` are routed to their dedicated slots.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            NAME => self.name = value_to_text(value),
            MESSAGE => self.message = value_to_text(value),
            STACK => self.stack = Some(value_to_text(value)),
            ERROR_SENTINEL => {}
            _ => {
                self.fields.insert(key, value);
            }
        }
        self
    }

    /// Attach another error as a custom field, encoded recursively.
    pub fn with_error_field(self, key: impl Into<String>, error: &RemoteError) -> Self {
        self.with_field(key, encode(error))
    }

    /// Error name, e.g. `Error` or `TypeError`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Captured stack, if the sender provided one.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Raw custom field as it travelled on the wire.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Custom field with any nested errors rebuilt.
    pub fn field_revived(&self, key: &str) -> Option<Revived> {
        self.fields.get(key).cloned().map(decode)
    }

    /// Custom field decoded as an error, when it holds one.
    pub fn field_error(&self, key: &str) -> Option<RemoteError> {
        self.field_revived(key).and_then(Revived::into_error)
    }

    /// The captured `source()` chain of a native error, if any.
    pub fn cause(&self) -> Option<RemoteError> {
        self.field_error(CAUSE)
    }

    /// All custom fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn from_encoded(mut map: Map<String, Value>) -> Self {
        map.remove(ERROR_SENTINEL);
        let name = map
            .remove(NAME)
            .map(value_to_text)
            .unwrap_or_else(|| DEFAULT_ERROR_NAME.to_string());
        let message = map.remove(MESSAGE).map(value_to_text).unwrap_or_default();
        let stack = match map.remove(STACK) {
            None | Some(Value::Null) => None,
            Some(v) => Some(value_to_text(v)),
        };

        Self {
            name,
            message,
            stack,
            fields: map,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.message)
        } else if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl Serialize for RemoteError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match decode(Value::deserialize(deserializer)?) {
            Revived::Error(error) => Ok(error),
            _ => Err(D::Error::custom("expected an encoded error")),
        }
    }
}

/// A decoded value in which encoded errors have been rebuilt.
///
/// Composites that contain no errors are kept verbatim in
/// [`Revived::Value`]; only the path down to an error is expanded.
#[derive(Debug, Clone, PartialEq)]
pub enum Revived {
    /// Plain value without any encoded error inside.
    Value(Value),
    /// A rebuilt error.
    Error(RemoteError),
    /// Array with at least one error somewhere inside.
    Array(Vec<Revived>),
    /// Object with at least one error somewhere inside.
    Object(BTreeMap<String, Revived>),
}

impl Revived {
    /// Returns `true` if this node is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Revived::Error(_))
    }

    /// Borrow the error at this node.
    pub fn as_error(&self) -> Option<&RemoteError> {
        match self {
            Revived::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Take the error at this node.
    pub fn into_error(self) -> Option<RemoteError> {
        match self {
            Revived::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Look up a key when this node is an object.
    pub fn get(&self, key: &str) -> Option<Revived> {
        match self {
            Revived::Object(map) => map.get(key).cloned(),
            Revived::Value(Value::Object(map)) => map.get(key).cloned().map(Revived::Value),
            _ => None,
        }
    }

    /// Collect every error in this tree, depth first.
    pub fn errors(&self) -> Vec<&RemoteError> {
        let mut out = Vec::new();
        self.collect_errors(&mut out);
        out
    }

    fn collect_errors<'a>(&'a self, out: &mut Vec<&'a RemoteError>) {
        match self {
            Revived::Value(_) => {}
            Revived::Error(error) => out.push(error),
            Revived::Array(items) => items.iter().for_each(|item| item.collect_errors(out)),
            Revived::Object(map) => map.values().for_each(|item| item.collect_errors(out)),
        }
    }

    /// Convert back to a transport-safe value, re-encoding errors.
    pub fn into_value(self) -> Value {
        match self {
            Revived::Value(value) => value,
            Revived::Error(error) => encode(&error),
            Revived::Array(items) => {
                Value::Array(items.into_iter().map(Revived::into_value).collect())
            }
            Revived::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.into_value()))
                    .collect(),
            ),
        }
    }
}

/// Encode an error into its transport-safe shape.
///
/// Only errors need encoding; any other value already survives the wire and
/// is sent as is.
pub fn encode(error: &RemoteError) -> Value {
    let mut map = Map::with_capacity(error.fields.len() + 4);
    map.insert(ERROR_SENTINEL.to_string(), Value::Bool(true));
    map.insert(NAME.to_string(), Value::String(error.name.clone()));
    map.insert(MESSAGE.to_string(), Value::String(error.message.clone()));
    if let Some(stack) = &error.stack {
        map.insert(STACK.to_string(), Value::String(stack.clone()));
    }
    for (key, value) in &error.fields {
        map.insert(key.clone(), value.clone());
    }
    Value::Object(map)
}

/// Walk `value` and rebuild every encoded error inside it.
pub fn decode(value: Value) -> Revived {
    match value {
        Value::Object(map) if map.contains_key(ERROR_SENTINEL) => {
            Revived::Error(RemoteError::from_encoded(map))
        }
        Value::Object(map) => {
            if !map.values().any(contains_encoded_error) {
                return Revived::Value(Value::Object(map));
            }
            Revived::Object(
                map.into_iter()
                    .map(|(key, value)| (key, decode(value)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            if !items.iter().any(contains_encoded_error) {
                return Revived::Value(Value::Array(items));
            }
            Revived::Array(items.into_iter().map(decode).collect())
        }
        other => Revived::Value(other),
    }
}

/// Returns `true` if `value` is, or contains, an encoded error.
pub fn contains_encoded_error(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(ERROR_SENTINEL) || map.values().any(contains_encoded_error)
        }
        Value::Array(items) => items.iter().any(contains_encoded_error),
        _ => false,
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

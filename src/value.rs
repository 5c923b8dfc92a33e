//! Host-side values exchanged with the embedding runtime.
//!
//! The glue never talks to a concrete interpreter; everything crossing the
//! boundary is a [`Value`], and callbacks into the host go through
//! [`HostCallable`]. The optional `python` feature maps these onto pyo3
//! objects.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Dictionary key.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

/// A dynamically typed host value.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// The host's null value.
    #[default]
    None,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string.
    Str(String),
    /// Mutable sequence.
    List(Vec<Value>),
    /// Immutable sequence.
    Tuple(Vec<Value>),
    /// Mapping.
    Dict(BTreeMap<Key, Value>),
}

impl Value {
    /// Host type name, used in type-error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes of a `str` or `bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Returns the elements of a list or tuple.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Key, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Host truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
        }
    }

    /// Looks up a string key in a dict value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(&Key::Str(key.to_string()))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

/// The host's own exception object, kept opaque so the host can re-raise it.
pub type HostPayload = Arc<dyn Any + Send + Sync>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone)]
/// An exception raised by host code, carried through native frames unchanged.
///
/// Equality looks at `kind` and `message` only.
pub struct HostError {
    /// Exception class name (for example `KeyError`).
    pub kind: String,
    /// Exception message.
    pub message: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    payload: Option<HostPayload>,
}

impl HostError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// Attaches the original exception object.
    #[must_use]
    pub fn with_payload(mut self, payload: HostPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload(&self) -> Option<&HostPayload> {
        self.payload.as_ref()
    }
}

impl Debug for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

impl PartialEq for HostError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for HostError {}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for HostError {}

/// A callable object living in the host runtime.
pub trait HostCallable {
    /// Calls the object with positional arguments.
    fn call(&mut self, args: Vec<Value>) -> Result<Value, HostError>;
}

impl<F> HostCallable for F
where
    F: FnMut(Vec<Value>) -> Result<Value, HostError>,
{
    fn call(&mut self, args: Vec<Value>) -> Result<Value, HostError> {
        self(args)
    }
}

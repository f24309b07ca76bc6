//! The serializable value model that crosses instance boundaries.
//!
//! Every argument and result of a cross-instance call is a [`Value`]. The
//! model is deliberately small: scalars, lists, string-keyed maps, plus two
//! reference forms — [`ProxyHandle`] (a stand-in for a variable owned by
//! another instance) and [`FuncRef`] (a callable registered on an
//! instance's function registry). Both reference forms are plain data and
//! serialize like everything else.
//!
//! [`ops`] applies the closed arithmetic/comparison/concatenation operation
//! set to *resolved* values; resolving handles is the proxy layer's job.

pub mod ops;

use crate::types::InstanceId;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A local stand-in for a variable owned by another instance.
///
/// The handle names the owning instance and the variable key. Operations on
/// a handle are forwarded to the owner by the proxy layer; a handle that
/// "returns home" collapses back to the real local value via
/// [`crate::instance::Instance::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHandle {
    /// The instance that owns the underlying variable.
    pub owner: InstanceId,
    /// The variable key in the owner's globals.
    pub key: String,
}

impl ProxyHandle {
    /// Creates a handle for variable `key` owned by `owner`.
    pub fn new(owner: InstanceId, key: impl Into<String>) -> Self {
        Self {
            owner,
            key: key.into(),
        }
    }
}

impl fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.owner)
    }
}

/// A reference to a function registered on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncRef {
    /// The instance whose registry holds the function.
    pub owner: InstanceId,
    /// The registered function name.
    pub name: String,
}

impl FuncRef {
    /// Creates a reference to function `name` on `owner`.
    pub fn new(owner: InstanceId, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()@{}", self.name, self.owner)
    }
}

/// A serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// The absent value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// A string.
    Str(String),
    /// An ordered list.
    List(Vec<Value>),
    /// A string-keyed map with stable iteration order.
    Map(BTreeMap<String, Value>),
    /// A stand-in for a variable owned by another instance.
    Handle(ProxyHandle),
    /// A reference to a registered function.
    Func(FuncRef),
}

impl Value {
    /// Returns a short name for the value's type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Handle(_) => "handle",
            Self::Func(_) => "func",
        }
    }

    /// Returns true unless the value is `Null` or `false`.
    #[must_use]
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float, coercing integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list payload, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the handle payload, if this is a `Handle`.
    #[must_use]
    pub const fn as_handle(&self) -> Option<&ProxyHandle> {
        match self {
            Self::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// Reads a field of a `Map`, or an index of a `List`.
    #[must_use]
    pub fn index(&self, field: &Value) -> Option<&Value> {
        match (self, field) {
            (Self::Map(map), Self::Str(name)) => map.get(name),
            (Self::List(items), Self::Int(i)) => usize::try_from(*i).ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Serializes the value to a JSON string, for hosts whose call
    /// primitive carries strings.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::Error::malformed("value encoding", e.to_string()))
    }

    /// Deserializes a value from a JSON string produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::Error::malformed("value decoding", e.to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Handle(h) => write!(f, "<{h}>"),
            Self::Func(fr) => write!(f, "<{fr}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<ProxyHandle> for Value {
    fn from(h: ProxyHandle) -> Self {
        Self::Handle(h)
    }
}

impl From<FuncRef> for Value {
    fn from(fr: FuncRef) -> Self {
        Self::Func(fr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn json_round_trip_preserves_handles() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Handle(ProxyHandle::new(InstanceId::new(7), "score")),
            Value::Map(BTreeMap::from([("k".to_owned(), Value::Float(0.5))])),
        ]);
        let json = v.to_json().unwrap();
        assert_eq!(Value::from_json(&json).unwrap(), v);
    }

    #[test]
    fn index_reads_maps_and_lists() {
        let map = Value::Map(BTreeMap::from([("hp".to_owned(), Value::Int(10))]));
        assert_eq!(map.index(&Value::from("hp")), Some(&Value::Int(10)));
        assert_eq!(map.index(&Value::from("mp")), None);

        let list = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(list.index(&Value::Int(1)), Some(&Value::from("b")));
        assert_eq!(list.index(&Value::Int(-1)), None);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(Value::from_json("{not json").is_err());
    }
}

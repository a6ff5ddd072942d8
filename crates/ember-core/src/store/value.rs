//! The value types a key can hold.

use std::collections::HashSet;

use bytes::Bytes;

/// Everything a key can be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A binary-safe string, the only type `SET`/`GET` operate on.
    Str(Bytes),
    /// An ordered list, carried for snapshot compatibility.
    List(Vec<Bytes>),
    /// An unordered set of distinct members, carried for snapshot compatibility.
    Set(HashSet<Bytes>),
}

impl Value {
    /// The RDB-style type tag for this value, as written by the snapshot codec.
    #[must_use]
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Str(_) => 0x00,
            Value::List(_) => 0x01,
            Value::Set(_) => 0x02,
        }
    }

    /// Returns the inner string bytes, if this value is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&Bytes> {
        match self {
            Value::Str(b) => Some(b),
            _ => None,
        }
    }
}

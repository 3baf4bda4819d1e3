//! Structured lookup keys and their canonical tokens.
//!
//! Every entry written to the log carries one or more [`Key`]s. Before any
//! index lookup or mutation a key is reduced to a [`CanonicalKey`]: a string
//! token that is equal for structurally-equal keys and distinct otherwise.
//!
//! The token uses CBOR diagnostic notation with maps sorted by key token:
//!
//! ```text
//! 42                 integer
//! "users"            text (JSON string escaping)
//! h'cafe'            bytes
//! [1,"a"]            array
//! {"a":1,"b":2}      map
//! ```

use crate::error::{CodecError, CodecResult};
use ciborium::value::Value as Cbor;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// A structured lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Null key.
    Null,
    /// Boolean key.
    Bool(bool),
    /// Signed integer key.
    Integer(i64),
    /// Text key (UTF-8).
    Text(String),
    /// Byte string key.
    Bytes(Vec<u8>),
    /// Composite key.
    Array(Vec<Key>),
    /// Map key; pair order does not affect the canonical token.
    Map(Vec<(Key, Key)>),
}

impl Key {
    /// Create a map key with pairs in canonical order.
    pub fn map(mut pairs: Vec<(Key, Key)>) -> Self {
        pairs.sort_by_cached_key(|(k, _)| k.canonical());
        Key::Map(pairs)
    }

    /// Returns the canonical token for this key.
    #[must_use]
    pub fn canonical(&self) -> CanonicalKey {
        let mut token = String::new();
        self.write_canonical(&mut token);
        CanonicalKey(token)
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Key::Null => out.push_str("null"),
            Key::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Key::Integer(n) => {
                let _ = write!(out, "{n}");
            }
            Key::Text(s) => {
                // Serializing a str to JSON cannot fail.
                let quoted = serde_json::to_string(s).unwrap_or_default();
                out.push_str(&quoted);
            }
            Key::Bytes(bytes) => {
                out.push_str("h'");
                for byte in bytes {
                    let _ = write!(out, "{byte:02x}");
                }
                out.push('\'');
            }
            Key::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Key::Map(pairs) => {
                let mut rendered: Vec<(String, String)> = pairs
                    .iter()
                    .map(|(k, v)| (k.canonical().0, v.canonical().0))
                    .collect();
                rendered.sort();
                out.push('{');
                for (i, (k, v)) in rendered.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push(':');
                    out.push_str(v);
                }
                out.push('}');
            }
        }
    }

    fn to_cbor(&self) -> Cbor {
        match self {
            Key::Null => Cbor::Null,
            Key::Bool(b) => Cbor::Bool(*b),
            Key::Integer(n) => Cbor::Integer((*n).into()),
            Key::Text(s) => Cbor::Text(s.clone()),
            Key::Bytes(b) => Cbor::Bytes(b.clone()),
            Key::Array(items) => Cbor::Array(items.iter().map(Key::to_cbor).collect()),
            Key::Map(pairs) => Cbor::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_cbor(), v.to_cbor()))
                    .collect(),
            ),
        }
    }

    fn from_cbor(value: Cbor) -> CodecResult<Self> {
        match value {
            Cbor::Null => Ok(Key::Null),
            Cbor::Bool(b) => Ok(Key::Bool(b)),
            Cbor::Integer(n) => i64::try_from(n)
                .map(Key::Integer)
                .map_err(|_| CodecError::decoding_failed("integer key out of i64 range")),
            Cbor::Text(s) => Ok(Key::Text(s)),
            Cbor::Bytes(b) => Ok(Key::Bytes(b)),
            Cbor::Array(items) => items
                .into_iter()
                .map(Key::from_cbor)
                .collect::<CodecResult<Vec<_>>>()
                .map(Key::Array),
            Cbor::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| Ok((Key::from_cbor(k)?, Key::from_cbor(v)?)))
                .collect::<CodecResult<Vec<_>>>()
                .map(Key::Map),
            Cbor::Tag(_, inner) => Key::from_cbor(*inner),
            Cbor::Float(_) => Err(CodecError::unsupported_type("float")),
            _ => Err(CodecError::unsupported_type("unknown")),
        }
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Integer(i64::from(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Integer(i64::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Integer(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key::Bytes(value)
    }
}

impl From<Vec<Key>> for Key {
    fn from(value: Vec<Key>) -> Self {
        Key::Array(value)
    }
}

/// The canonical string token of a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Key> for CanonicalKey {
    fn from(key: &Key) -> Self {
        key.canonical()
    }
}

/// Encodes a key list as a CBOR array.
///
/// # Errors
///
/// Returns an error if the CBOR writer fails.
pub fn encode_keys(keys: &[Key]) -> CodecResult<Vec<u8>> {
    let array = Cbor::Array(keys.iter().map(Key::to_cbor).collect());
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&array, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a key list written by [`encode_keys`].
///
/// # Errors
///
/// Returns an error if the bytes are not a CBOR array of keys.
pub fn decode_keys(bytes: &[u8]) -> CodecResult<Vec<Key>> {
    let value: Cbor = ciborium::de::from_reader(bytes)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    match value {
        Cbor::Array(items) => items.into_iter().map(Key::from_cbor).collect(),
        _ => Err(CodecError::decoding_failed("key list is not an array")),
    }
}

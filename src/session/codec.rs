//! Binding snapshot codec.
//!
//! Encodes the persistable subset of an interpreter's global bindings into
//! an opaque, versioned binary blob and reverses the operation.
//!
//! Blob layout: `[4-byte magic][1-byte format version][32-byte blake3 of
//! payload][preserves-packed payload]`. The checksum and version byte let a
//! decoder reject corrupt or foreign blobs with a structured error instead
//! of reviving garbage state; callers treat every decode failure as "no
//! prior state".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{Binding, Value};

/// Magic bytes opening every state blob.
const STATE_MAGIC: &[u8; 4] = b"RPST";

/// Current state blob format version. Bump on any layout change so old
/// blobs degrade to [`DecodeError::UnsupportedVersion`].
pub const STATE_FORMAT_VERSION: u8 = 1;

const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = 4 + 1 + CHECKSUM_LEN;

/// Failure to produce a state blob from a binding snapshot.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A persistable binding holds a value with no portable representation
    /// (e.g. a list with a closure inside).
    #[error("binding '{name}' holds a non-portable {kind} value")]
    NotPortable {
        /// Name of the offending binding.
        name: String,
        /// Kind label of the offending value.
        kind: &'static str,
    },

    /// Payload serialization failed.
    #[error("state serialization failed: {0}")]
    Serialize(String),
}

/// Failure to revive a binding snapshot from a blob.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Blob is shorter than the fixed header.
    #[error("state blob truncated at {0} bytes")]
    Truncated(usize),

    /// Blob does not open with the state magic.
    #[error("state blob has unrecognized magic")]
    BadMagic,

    /// Blob was written by an unknown format version.
    #[error("unsupported state format version {0}")]
    UnsupportedVersion(u8),

    /// Payload bytes do not match the recorded checksum.
    #[error("state blob checksum mismatch")]
    ChecksumMismatch,

    /// Payload is not a well-formed binding snapshot.
    #[error("state payload malformed: {0}")]
    Malformed(String),
}

/// Portable mirror of the `Data`-kind subset of [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum StateValue {
    Symbol(String),
    Keyword(String),
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<StateValue>),
}

/// On-the-wire snapshot: named entries in enumeration order.
#[derive(Debug, Serialize, Deserialize)]
struct StateImage {
    entries: Vec<(String, StateValue)>,
}

/// Encode the persistable subset of a binding snapshot.
///
/// Non-`Data` bindings are filtered out up front; a `Data`-kind binding
/// whose value turns out to be non-portable inside (nested callable) fails
/// the whole encode with [`EncodeError::NotPortable`] rather than being
/// silently dropped. Output is deterministic for the same bindings in the
/// same order.
pub fn encode(bindings: &[Binding]) -> Result<Vec<u8>, EncodeError> {
    let mut entries = Vec::new();
    for binding in bindings {
        if !binding.value.is_persistable() {
            continue;
        }
        let value = portable(&binding.name, &binding.value)?;
        entries.push((binding.name.clone(), value));
    }

    let image = StateImage { entries };

    use preserves::PackedWriter;
    let mut payload = Vec::new();
    let mut writer = PackedWriter::new(&mut payload);
    preserves::serde::to_writer(&mut writer, &image)
        .map_err(|err| EncodeError::Serialize(err.to_string()))?;

    let checksum = blake3::hash(&payload);
    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(STATE_MAGIC);
    blob.push(STATE_FORMAT_VERSION);
    blob.extend_from_slice(checksum.as_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Decode a state blob back into bindings, in the order they were encoded.
pub fn decode(blob: &[u8]) -> Result<Vec<Binding>, DecodeError> {
    if blob.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(blob.len()));
    }
    if &blob[..4] != STATE_MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = blob[4];
    if version != STATE_FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let checksum = &blob[5..HEADER_LEN];
    let payload = &blob[HEADER_LEN..];
    if blake3::hash(payload).as_bytes().as_slice() != checksum {
        return Err(DecodeError::ChecksumMismatch);
    }

    let image: StateImage = preserves::serde::from_bytes(payload)
        .map_err(|err| DecodeError::Malformed(err.to_string()))?;

    Ok(image
        .entries
        .into_iter()
        .map(|(name, value)| Binding::new(name, revive(value)))
        .collect())
}

fn portable(name: &str, value: &Value) -> Result<StateValue, EncodeError> {
    match value {
        Value::Symbol(sym) => Ok(StateValue::Symbol(sym.clone())),
        Value::Keyword(kw) => Ok(StateValue::Keyword(kw.clone())),
        Value::Text(text) => Ok(StateValue::Text(text.clone())),
        Value::Integer(num) => Ok(StateValue::Integer(*num)),
        Value::Float(num) => Ok(StateValue::Float(*num)),
        Value::Boolean(flag) => Ok(StateValue::Boolean(*flag)),
        Value::List(items) => {
            let converted = items
                .iter()
                .map(|item| portable(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StateValue::List(converted))
        }
        other => Err(EncodeError::NotPortable {
            name: name.to_string(),
            kind: other.kind().label(),
        }),
    }
}

fn revive(value: StateValue) -> Value {
    match value {
        StateValue::Symbol(sym) => Value::Symbol(sym),
        StateValue::Keyword(kw) => Value::Keyword(kw),
        StateValue::Text(text) => Value::Text(text),
        StateValue::Integer(num) => Value::Integer(num),
        StateValue::Float(num) => Value::Float(num),
        StateValue::Boolean(flag) => Value::Boolean(flag),
        StateValue::List(items) => Value::List(items.into_iter().map(revive).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::value::Closure;
    use std::sync::Arc;

    fn sample_bindings() -> Vec<Binding> {
        vec![
            Binding::new("x", Value::Integer(5)),
            Binding::new("name", Value::Text("ada".into())),
            Binding::new(
                "xs",
                Value::List(vec![Value::Integer(1), Value::Boolean(true)]),
            ),
        ]
    }

    #[test]
    fn round_trip_preserves_names_values_and_order() {
        let bindings = sample_bindings();
        let blob = encode(&bindings).unwrap();
        let revived = decode(&blob).unwrap();
        assert_eq!(revived, bindings);
    }

    #[test]
    fn encode_is_deterministic() {
        let bindings = sample_bindings();
        assert_eq!(encode(&bindings).unwrap(), encode(&bindings).unwrap());
    }

    #[test]
    fn non_data_bindings_are_filtered_out() {
        let mut bindings = sample_bindings();
        bindings.push(Binding::new("f", Value::Builtin("print")));
        bindings.push(Binding::new("env", Value::Environment));

        let blob = encode(&bindings).unwrap();
        let revived = decode(&blob).unwrap();
        assert_eq!(revived.len(), 3);
        assert!(revived.iter().all(|binding| binding.name != "f"));
    }

    #[test]
    fn nested_callable_fails_the_encode() {
        let closure = Value::Closure(Arc::new(Closure {
            params: vec![],
            body: vec![],
        }));
        let bindings = vec![Binding::new("trap", Value::List(vec![closure]))];
        let err = encode(&bindings).unwrap_err();
        assert!(matches!(err, EncodeError::NotPortable { name, .. } if name == "trap"));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let blob = encode(&sample_bindings()).unwrap();
        assert!(matches!(
            decode(&blob[..HEADER_LEN - 1]),
            Err(DecodeError::Truncated(_))
        ));
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let mut blob = encode(&sample_bindings()).unwrap();
        blob[0] = b'X';
        assert!(matches!(decode(&blob), Err(DecodeError::BadMagic)));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut blob = encode(&sample_bindings()).unwrap();
        blob[4] = STATE_FORMAT_VERSION + 1;
        assert!(matches!(
            decode(&blob),
            Err(DecodeError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_the_checksum() {
        let mut blob = encode(&sample_bindings()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(decode(&blob), Err(DecodeError::ChecksumMismatch)));
    }
}

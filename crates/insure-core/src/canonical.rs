//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only byte sequence the ledger ever signs or
//! digests. Two parties that independently serialize the same transition
//! must arrive at the same bytes, otherwise one side's signature fails to
//! verify on the other side and the transition can never be committed.
//!
//! ## Rules
//!
//! 1. Floats are rejected. Money is carried as integer minor units.
//! 2. Object keys are sorted and separators are compact (RFC 8785 / JCS,
//!    via `serde_jcs`).
//! 3. Timestamps reach this layer already normalized by
//!    [`Timestamp`](crate::Timestamp) (UTC, `Z` suffix, whole seconds).

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization of a float-free value.
///
/// The inner buffer is private; [`CanonicalBytes::new`] is the only
/// constructor, so any API that takes `&CanonicalBytes` is guaranteed to
/// receive deterministic input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if the value cannot be represented as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// The canonical byte sequence.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}

//! # Content Digests
//!
//! SHA-256 over [`CanonicalBytes`]. A transition's identifier is the digest
//! of its canonical form, so both parties derive the same id without
//! exchanging it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::CoreError;

/// A 32-byte SHA-256 digest.
///
/// Serializes as a lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 chars).
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.len() != 64 || !s.is_ascii() {
            return Err(CoreError::InvalidDigest(format!(
                "digest must be 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut out = [0u8; 32];
        for (i, chunk) in out.iter_mut().enumerate() {
            *chunk = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| CoreError::InvalidDigest(format!("invalid hex at {}: {e}", i * 2)))?;
        }
        Ok(Self(out))
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Compute the SHA-256 digest of canonical bytes.
///
/// Takes `&CanonicalBytes` rather than `&[u8]` so that no digest in the
/// ledger can be computed over a non-canonical serialization.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    let hash = Sha256::digest(data.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

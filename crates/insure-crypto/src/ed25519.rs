//! # Ed25519 Signing and Verification
//!
//! Every party signs the canonical bytes of a transition id with an
//! Ed25519 key.
//!
//! ## Security Invariant
//!
//! - Signing input MUST be `&CanonicalBytes`; raw bytes cannot be signed.
//! - `KeyPair` does not implement `Serialize` and its `Debug` output never
//!   contains key material.
//! - Public keys and signatures serialize as lowercase hex strings.

use ed25519_dalek::{Signer, Verifier};
use insure_core::{CanonicalBytes, CryptoError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An Ed25519 public key (32 bytes).
///
/// Ordered by raw bytes so signer sets can live in a `BTreeSet` and
/// canonicalize deterministically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

/// An Ed25519 signature (64 bytes).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

/// An Ed25519 signing key.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex public key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut arr)
            .map_err(|e| CryptoError::KeyError(format!("public key hex: {e}")))?;
        Ok(Self(arr))
    }

    fn to_verifying_key(self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::KeyError(format!("invalid public key: {e}")))
    }

    /// First eight hex characters, for log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}...)", self.short())
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 128-character hex signature.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut arr = [0u8; 64];
        hex::decode_to_slice(s.trim(), &mut arr)
            .map_err(|e| CryptoError::VerificationFailed(format!("signature hex: {e}")))?;
        Ok(Self(arr))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..4]))
    }
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

impl KeyPair {
    /// Generate a random key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a 64-character hex seed.
    pub fn from_seed_hex(s: &str) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut seed)
            .map_err(|e| CryptoError::KeyError(format!("seed must be 64 hex chars: {e}")))?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex encoding of the secret seed. Only key provisioning should call this.
    pub fn export_seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &CanonicalBytes) -> Signature {
        Signature(self.signing_key.sign(data.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair(<private>)")
    }
}

/// Verify `signature` over `data` under `key`.
pub fn verify(
    data: &CanonicalBytes,
    signature: &Signature,
    key: &PublicKey,
) -> Result<(), CryptoError> {
    let vk = key.to_verifying_key()?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(data.as_bytes(), &sig)
        .map_err(|e| CryptoError::VerificationFailed(format!("key {}: {e}", key.short())))
}

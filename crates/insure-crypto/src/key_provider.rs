//! # Key Provider Abstraction
//!
//! Signing is a capability handed to the commitment coordinator rather than
//! a key it owns. Backends:
//!
//! - [`LocalKeyProvider`]: in-memory key for simulation and tests.
//! - [`EnvKeyProvider`]: hex-encoded 32-byte seed read from an environment
//!   variable, for deployments that inject secrets through the environment.

use insure_core::{CanonicalBytes, CryptoError};

use crate::ed25519::{KeyPair, PublicKey, Signature};

/// Signing backend. `Send + Sync` so one provider can serve many concurrent
/// protocol instances.
pub trait KeyProvider: Send + Sync {
    fn sign(&self, data: &CanonicalBytes) -> Result<Signature, CryptoError>;

    fn public_key(&self) -> PublicKey;

    /// Name for diagnostics.
    fn provider_name(&self) -> &str;
}

// ─── LocalKeyProvider ────────────────────────────────────────────────────

pub struct LocalKeyProvider {
    key: KeyPair,
}

impl LocalKeyProvider {
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(KeyPair::from_seed(seed))
    }
}

impl KeyProvider for LocalKeyProvider {
    fn sign(&self, data: &CanonicalBytes) -> Result<Signature, CryptoError> {
        Ok(self.key.sign(data))
    }

    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn provider_name(&self) -> &str {
        "LocalKeyProvider"
    }
}

// ─── EnvKeyProvider ──────────────────────────────────────────────────────

/// Loads a signing key from an environment variable holding a 64-character
/// hex seed, e.g. `INSURE_SIGNING_KEY`.
pub struct EnvKeyProvider {
    key: KeyPair,
    var_name: String,
}

impl EnvKeyProvider {
    pub fn from_env(var_name: &str) -> Result<Self, CryptoError> {
        let hex = std::env::var(var_name)
            .map_err(|_| CryptoError::KeyError(format!("environment variable {var_name} not set")))?;
        let key = KeyPair::from_seed_hex(&hex)
            .map_err(|e| CryptoError::KeyError(format!("{var_name}: {e}")))?;
        Ok(Self {
            key,
            var_name: var_name.to_string(),
        })
    }

    pub fn var_name(&self) -> &str {
        &self.var_name
    }
}

impl KeyProvider for EnvKeyProvider {
    fn sign(&self, data: &CanonicalBytes) -> Result<Signature, CryptoError> {
        Ok(self.key.sign(data))
    }

    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn provider_name(&self) -> &str {
        "EnvKeyProvider"
    }
}

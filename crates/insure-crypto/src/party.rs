//! # Party Identity
//!
//! A [`Party`] is a display name bound to a signing key. Identity is the
//! key: two parties with the same key are the same party whatever they are
//! called, and two parties with the same name but different keys are not.

use serde::{Deserialize, Serialize};

use crate::ed25519::PublicKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// Human-readable label. Not part of identity.
    pub name: String,
    pub key: PublicKey,
}

impl Party {
    pub fn new(name: impl Into<String>, key: PublicKey) -> Self {
        Self { name: name.into(), key }
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Party {}

impl std::hash::Hash for Party {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::KeyPair;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_name() {
        let key = KeyPair::from_seed(&[1u8; 32]).public_key();
        let a = Party::new("Client", key);
        let b = Party::new("Renamed Client", key);
        assert_eq!(a, b);
        assert_eq!(HashSet::from([a, b]).len(), 1);
    }

    #[test]
    fn test_same_name_different_key_differs() {
        let a = Party::new("Insurer", KeyPair::from_seed(&[1u8; 32]).public_key());
        let b = Party::new("Insurer", KeyPair::from_seed(&[2u8; 32]).public_key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_name() {
        let p = Party::new("Underwriter", KeyPair::generate().public_key());
        assert_eq!(p.to_string(), "Underwriter");
    }
}

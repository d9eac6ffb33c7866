//! # Identifiers
//!
//! A policy keeps one [`PolicyId`] for its whole life: it is minted when the
//! policy is first issued and copied unchanged into every later version.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Stable identifier of a policy across all of its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(Uuid);

impl PolicyId {
    /// Mint a fresh identifier. Only issuance should call this.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PolicyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s.trim())
            .map(Self)
            .map_err(|_| CoreError::InvalidPolicyId(s.to_string()))
    }
}

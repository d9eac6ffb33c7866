//! # insure-crypto — Keys, Signatures, Parties
//!
//! - **Ed25519** signing and verification over `CanonicalBytes` only.
//! - **Party** identity: a display name bound to a public key, compared by
//!   key.
//! - **KeyProvider**: the signing capability injected into the commitment
//!   coordinator, with local and environment-variable backends.
//!
//! ## Crate Policy
//!
//! - Depends only on `insure-core` internally.
//! - Tests use real Ed25519; nothing cryptographic is mocked.

pub mod ed25519;
pub mod key_provider;
pub mod party;

pub use ed25519::{verify, KeyPair, PublicKey, Signature};
pub use key_provider::{EnvKeyProvider, KeyProvider, LocalKeyProvider};
pub use party::Party;

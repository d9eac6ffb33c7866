//! # insure-core — Foundational Types for the Policy Ledger
//!
//! Leaf of the crate DAG. Defines the primitives every other crate builds
//! on: money, identifiers, timestamps, and the canonical byte form used for
//! signing and digesting.
//!
//! ## Key Design Principles
//!
//! 1. **Integer money.** [`Amount`] carries minor units as `u64` together
//!    with a validated [`Currency`]. Arithmetic is checked and never mixes
//!    currencies.
//!
//! 2. **`CanonicalBytes` newtype.** Every signature and every transition id
//!    is computed over `CanonicalBytes::new()`. No raw `serde_json::to_vec()`
//!    on a signing path.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] enforces the `Z` suffix and
//!    whole-second precision so time windows canonicalize identically on
//!    both parties.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `insure-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod amount;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use amount::{Amount, Currency};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{AmountError, CanonicalizationError, CoreError, CryptoError};
pub use identity::PolicyId;
pub use temporal::Timestamp;

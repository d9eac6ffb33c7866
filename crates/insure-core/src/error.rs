//! # Error Types
//!
//! Leaf error enums shared by every crate in the workspace. All derive
//! `thiserror::Error`; higher layers wrap them with `#[from]`.

use thiserror::Error;

/// Errors raised while constructing core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A currency code failed validation.
    #[error("invalid currency code {0:?}: expected three upper-case ASCII letters")]
    InvalidCurrency(String),

    /// A timestamp could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A digest string was malformed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// A policy identifier could not be parsed.
    #[error("invalid policy id {0:?}")]
    InvalidPolicyId(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Money is carried in integer minor units; floats never reach the wire.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Arithmetic failures on [`Amount`](crate::Amount).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The operands carry different currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: String,
        /// Currency of the right operand.
        right: String,
    },

    /// The result would be negative.
    #[error("amount would become negative: {minuend} - {subtrahend}")]
    Underflow {
        /// Minor units of the left operand.
        minuend: u64,
        /// Minor units of the right operand.
        subtrahend: u64,
    },

    /// The result does not fit in 64 bits of minor units.
    #[error("amount overflow")]
    Overflow,
}

/// Error in cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Key generation, parsing, or loading failed.
    #[error("key error: {0}")]
    KeyError(String),
}

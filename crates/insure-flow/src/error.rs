//! # Flow Errors
//!
//! Every failure of a protocol instance is terminal for that instance and
//! surfaces as one [`FlowError`]. Nothing is retried automatically; the
//! caller rebuilds a proposal against current state.

use std::collections::BTreeSet;

use insure_contract::{StateRef, TransitionId, TransitionKind, ValidationError};
use insure_core::{Amount, AmountError, CanonicalizationError, CryptoError, PolicyId};
use insure_crypto::PublicKey;
use insure_state::{PolicyError, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    /// Local validation rejected the proposal; nothing was sent.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("no unconsumed policy with id {0}")]
    NotFound(PolicyId),

    #[error("policy {policy_id} has already been settled (claim {claim})")]
    AlreadySettled { policy_id: PolicyId, claim: Amount },

    #[error("signer set mismatch: expected {expected:?}, got {actual:?}")]
    SignerMismatch {
        expected: BTreeSet<PublicKey>,
        actual: BTreeSet<PublicKey>,
    },

    /// Another local proposal holds the consumed version.
    #[error("conflicting proposal in progress for version {0}")]
    ConflictingProposal(StateRef),

    /// The ordering oracle reports the consumed version (or this exact
    /// transition) as already spent.
    #[error("transition {0} conflicts with an already finalized transition")]
    DoubleSpend(TransitionId),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("unrecognized transition command {0:?}")]
    UnrecognizedTransition(String),

    #[error("counterparty rejected the proposal: {0}")]
    CounterpartyRejected(String),

    #[error("transition is outside its acceptance time window")]
    OutsideTimeWindow,

    #[error("{kind} must be initiated by the {expected}")]
    WrongInitiator {
        kind: TransitionKind,
        expected: &'static str,
    },

    #[error("claim is not eligible for payout: {0}")]
    IneligibleClaim(String),

    /// Submission expired and status polling never saw a verdict.
    #[error("oracle outcome for transition {0} is unknown")]
    OutcomeUnknown(TransitionId),

    /// The oracle finalized the transition but this node could not record
    /// it. The transition stands; the local ledger needs repair.
    #[error("transition {transition_id} finalized at order {order} but not recorded locally: {reason}")]
    NotRecorded {
        transition_id: TransitionId,
        order: u64,
        reason: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for FlowError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Rejected(v) => Self::ValidationFailed(v.to_string()),
            ValidationError::UnrecognizedTransition(name) => Self::UnrecognizedTransition(name),
            ValidationError::InvalidSignature { .. } | ValidationError::Crypto(_) => {
                Self::Crypto(e.to_string())
            }
            ValidationError::Canonicalization(inner) => Self::Canonicalization(inner),
        }
    }
}

impl From<CryptoError> for FlowError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

impl From<PolicyError> for FlowError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Amount { source, .. } => Self::Amount(source),
        }
    }
}

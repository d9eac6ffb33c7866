//! Validation errors and the individual contract clauses they report.

use insure_core::{CanonicalizationError, CryptoError};
use insure_crypto::PublicKey;
use thiserror::Error;

/// One failed contract clause. The display text is the reason sent back to
/// a counterparty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Transition is governed by contract {found:?}, expected {expected:?}.")]
    WrongContract { expected: String, found: String },

    // Issue
    #[error("No input policy may be consumed when issuing.")]
    IssueConsumesInput,
    #[error("A newly issued policy must have a positive premium.")]
    PremiumNotPositive,
    #[error("The client and underwriter cannot be the same identity.")]
    SameParty,
    #[error("A newly issued policy must have a zero claim.")]
    IssuedWithClaim,
    #[error("Both client and underwriter together only may sign policy issue transaction.")]
    IssueSigners,

    // Settle
    #[error("There must be one input policy.")]
    MissingInput,
    #[error("There must be output cash.")]
    NoCashOutput,
    #[error("There must be output cash paid to the recipient.")]
    NoCashToClient,
    #[error("Claim of {claim} has been settled.")]
    AlreadySettled { claim: String },
    #[error("A settlement must pay a positive claim.")]
    ClaimNotPositive,
    #[error("Cash paid to the client ({paid}) must equal the claim paid ({claimed}).")]
    ClaimNotCovered { paid: String, claimed: String },
    #[error("The premium may not change when settling.")]
    PremiumChanged,
    #[error("The client may not change when settling.")]
    ClientChanged,
    #[error("The underwriter may not change when settling.")]
    UnderwriterChanged,
    #[error("The policy id may not change when settling.")]
    IdChanged,
    #[error("The insured user may not change when settling.")]
    UserChanged,
    #[error("The policy date may not move backwards when settling.")]
    DateRegressed,
    #[error("The claim currency may not change from {expected} to {found} when settling.")]
    ClaimCurrencyChanged { expected: String, found: String },
    #[error("Both client and underwriter together only must sign policy settle transaction.")]
    SettleSigners,
}

impl Violation {
    /// Whether this rejection means the policy was already settled.
    pub fn is_already_settled(&self) -> bool {
        matches!(self, Self::AlreadySettled { .. })
    }

    /// Whether this rejection is about the declared signer set.
    pub fn is_signer_violation(&self) -> bool {
        matches!(self, Self::IssueSigners | Self::SettleSigners)
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    /// A contract clause failed.
    #[error("{0}")]
    Rejected(Violation),

    /// The command tag is not one the contract knows.
    #[error("Unrecognised command: {0:?}")]
    UnrecognizedTransition(String),

    /// An attached signature does not verify.
    #[error("invalid signature by {key}: {reason}")]
    InvalidSignature { key: PublicKey, reason: String },

    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("signing failed: {0}")]
    Crypto(#[from] CryptoError),
}

impl ValidationError {
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Rejected(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Violation> for ValidationError {
    fn from(v: Violation) -> Self {
        Self::Rejected(v)
    }
}

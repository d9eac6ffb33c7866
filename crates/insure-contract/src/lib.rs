//! # insure-contract — Transitions and Their Rules
//!
//! The wire model both parties exchange, and the validator that decides
//! whether a proposed Issue or Settle is legal. The validator is
//! deterministic and side-effect free; it is the only component either
//! party trusts to reject a malformed or malicious proposal.

pub mod config;
pub mod error;
pub mod transition;
pub mod validator;

pub use config::{ContractConfig, DEFAULT_CONTRACT_ID};
pub use error::{ValidationError, Violation};
pub use transition::{
    signing_payload, Command, PaymentOutput, SignedTransition, StateAndRef, StateRef, TimeWindow,
    Transition, TransitionId, TransitionKind, TransitionSignature,
};
pub use validator::TransitionValidator;

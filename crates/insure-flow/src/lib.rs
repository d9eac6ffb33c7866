//! # insure-flow — Building and Committing Policy Transitions
//!
//! The [`ProposalBuilder`] turns an intent into an unsigned transition; the
//! [`CommitmentCoordinator`] drives it through the two-party protocol
//! (validate, sign, countersign, order, record) and answers proposals from
//! the other side.
//!
//! ## Concurrency
//!
//! Each proposal is one async protocol instance; a node runs many at once.
//! At most one instance per node holds an uncommitted proposal against a
//! given policy version ([`VersionLocks`]). Across nodes, the
//! [`OrderingOracle`] is the single authority on whether a version has been
//! spent.
//!
//! ## Collaborators
//!
//! All I/O goes through the traits in [`capability`]. The [`memory`] module
//! implements them in-process; [`PartyNode`] wires one party's node out of
//! those parts.

pub mod builder;
pub mod capability;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod memory;
pub mod message;
pub mod node;
pub mod responder;

pub use builder::{IncidentStatus, Proposal, ProposalBuilder};
pub use capability::{
    BalanceCapability, LedgerRecorder, OracleOutcome, OracleStatus, OrderingOracle, PaymentInstruction,
    PolicyQuery, Session, SessionTransport,
};
pub use config::{ConflictPolicy, FlowConfig};
pub use coordinator::{Collaborators, Commitment, CommitmentCoordinator, Finality};
pub use error::FlowError;
pub use locks::{VersionLease, VersionLocks};
pub use message::ProtocolMessage;
pub use node::PartyNode;
pub use responder::ResponderOutcome;

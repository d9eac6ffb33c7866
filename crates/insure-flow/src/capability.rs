//! # Collaborator Capabilities
//!
//! The builder and the coordinator talk to the outside world only through
//! these traits: a vault query, a cash balance, a ledger recorder, an
//! ordering oracle, and a point-to-point session transport. The
//! [`memory`](crate::memory) module provides in-process implementations.

use async_trait::async_trait;
use insure_contract::{PaymentOutput, SignedTransition, StateAndRef, StateRef, TransitionId};
use insure_core::{Amount, Currency, PolicyId};
use insure_crypto::{Party, PublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlowError;

// ─── Vault and cash ──────────────────────────────────────────────────

#[async_trait]
pub trait PolicyQuery: Send + Sync {
    /// The current (unconsumed) version of a policy, or `NotFound`.
    async fn find_unconsumed_by_id(&self, id: &PolicyId) -> Result<StateAndRef, FlowError>;

    /// Any recorded version by reference, consumed or not.
    async fn find_by_ref(&self, reference: &StateRef) -> Result<Option<StateAndRef>, FlowError>;
}

/// A cash movement the payer's node has checked it can fund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInstruction {
    pub output: PaymentOutput,
    /// Payer balance once the payment settles.
    pub remaining: Amount,
}

#[async_trait]
pub trait BalanceCapability: Send + Sync {
    /// Cash this node can still commit: holdings minus outstanding holds.
    async fn balance_of(&self, currency: &Currency) -> Result<Amount, FlowError>;

    /// Prepare a payment of `amount` from this node's party to `payee` and
    /// hold the funds under `hold` (the transition nonce) until the
    /// transition is recorded or the hold is released. Fails with
    /// `InsufficientFunds`.
    async fn generate_spend(
        &self,
        amount: &Amount,
        payee: &Party,
        hold: Uuid,
    ) -> Result<PaymentInstruction, FlowError>;

    /// Drop the hold taken for a proposal that will never be recorded.
    /// Unknown holds are ignored.
    fn release(&self, hold: &Uuid);
}

#[async_trait]
pub trait LedgerRecorder: Send + Sync {
    /// Record a finalized transition: mark its input consumed, store its
    /// output, apply cash movements touching this node. Idempotent per
    /// transition id.
    async fn record(&self, stx: &SignedTransition) -> Result<StateAndRef, FlowError>;
}

// ─── Ordering oracle ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleOutcome {
    /// Accepted with a position in the global order.
    Finalized { order: u64 },
    /// The consumed version, or this transition itself, was already spent.
    Conflict { spent_by: TransitionId },
    OutsideTimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleStatus {
    Finalized { order: u64 },
    Conflicted { spent_by: TransitionId },
    Unknown,
}

#[async_trait]
pub trait OrderingOracle: Send + Sync {
    async fn submit(&self, stx: &SignedTransition) -> Result<OracleOutcome, FlowError>;

    async fn status(&self, id: &TransitionId) -> Result<OracleStatus, FlowError>;
}

// ─── Sessions ────────────────────────────────────────────────────────

/// One ordered duplex channel between two parties, used by exactly one
/// protocol instance.
#[async_trait]
pub trait Session: Send {
    /// Key of the party at the other end.
    fn counterparty(&self) -> PublicKey;

    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), FlowError>;

    /// Suspends until the next message arrives.
    async fn receive(&mut self) -> Result<Vec<u8>, FlowError>;
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn open(&self, counterparty: &PublicKey) -> Result<Box<dyn Session>, FlowError>;

    /// Next session opened towards this party; `None` once the transport
    /// is shut down.
    async fn accept(&self) -> Option<Box<dyn Session>>;
}

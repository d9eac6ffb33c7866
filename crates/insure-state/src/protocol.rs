//! # Commitment Protocol State Machine
//!
//! One [`ProtocolMachine`] tracks one initiator-side protocol instance from
//! a built proposal to `Finalized` or `Aborted`.
//!
//! ```text
//! Built ─► LocallyValidated ─► LocallySigned ─► AwaitingCounterparty
//!                                                  │
//!                         ┌────────────────────────┴───────────┐
//!                         ▼                                    ▼
//!                CounterpartyValidated                CounterpartyRejected
//!                         │
//!                         ▼
//!                    FullySigned ─► Submitted ─► Finalized
//!
//! any non-terminal state ─► Aborted
//! ```
//!
//! Transitions are checked at runtime against the edge table in
//! [`ProtocolMachine::advance`]; every accepted transition is appended to
//! an audit log.

use insure_core::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolState {
    Built,
    LocallyValidated,
    LocallySigned,
    AwaitingCounterparty,
    CounterpartyValidated,
    CounterpartyRejected,
    FullySigned,
    Submitted,
    Finalized,
    Aborted,
}

impl ProtocolState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Built => "BUILT",
            Self::LocallyValidated => "LOCALLY_VALIDATED",
            Self::LocallySigned => "LOCALLY_SIGNED",
            Self::AwaitingCounterparty => "AWAITING_COUNTERPARTY",
            Self::CounterpartyValidated => "COUNTERPARTY_VALIDATED",
            Self::CounterpartyRejected => "COUNTERPARTY_REJECTED",
            Self::FullySigned => "FULLY_SIGNED",
            Self::Submitted => "SUBMITTED",
            Self::Finalized => "FINALIZED",
            Self::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    /// Whether abandoning the instance here has no effect outside this node.
    /// Once submitted, the oracle may already have ordered the transition.
    pub fn is_cancel_safe(&self) -> bool {
        !matches!(self, Self::Submitted | Self::Finalized)
    }
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One accepted state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolTransitionRecord {
    pub from: ProtocolState,
    pub to: ProtocolState,
    pub timestamp: Timestamp,
    pub reason: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid protocol transition: {from} -> {to}")]
    InvalidTransition {
        from: ProtocolState,
        to: ProtocolState,
    },

    #[error("protocol instance already terminal in {0}")]
    AlreadyTerminal(ProtocolState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMachine {
    state: ProtocolState,
    log: Vec<ProtocolTransitionRecord>,
}

impl Default for ProtocolMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolMachine {
    pub fn new() -> Self {
        Self {
            state: ProtocolState::Built,
            log: Vec::new(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn history(&self) -> &[ProtocolTransitionRecord] {
        &self.log
    }

    /// Move to `to` if the edge is allowed; the state is unchanged on error.
    pub fn advance(&mut self, to: ProtocolState, reason: Option<String>) -> Result<(), ProtocolError> {
        use ProtocolState::*;

        if self.state.is_terminal() {
            return Err(ProtocolError::AlreadyTerminal(self.state));
        }

        let valid = matches!(
            (self.state, to),
            (Built, LocallyValidated)
                | (LocallyValidated, LocallySigned)
                | (LocallySigned, AwaitingCounterparty)
                | (AwaitingCounterparty, CounterpartyValidated)
                | (AwaitingCounterparty, CounterpartyRejected)
                | (CounterpartyValidated, FullySigned)
                | (FullySigned, Submitted)
                | (Submitted, Finalized)
                | (_, Aborted)
        );

        if !valid {
            return Err(ProtocolError::InvalidTransition { from: self.state, to });
        }

        self.log.push(ProtocolTransitionRecord {
            from: self.state,
            to,
            timestamp: Timestamp::now(),
            reason,
        });
        self.state = to;
        Ok(())
    }

    /// Move to `Aborted` from any non-terminal state.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), ProtocolError> {
        self.advance(ProtocolState::Aborted, Some(reason.into()))
    }
}

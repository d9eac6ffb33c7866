//! # Proposal Builder
//!
//! Turns a caller intent (issue a policy, pay a claim) into a [`Proposal`]
//! the commitment coordinator can drive. The builder runs on one party's
//! node: it reads that node's vault and balance, and it only builds
//! transitions that node is entitled to initiate.
//!
//! | Kind   | Initiator   | Payment                      | Time window            |
//! |--------|-------------|------------------------------|------------------------|
//! | Issue  | client      | premium, client → underwriter | build time ± window    |
//! | Settle | underwriter | claim, underwriter → client  | none                   |

use std::str::FromStr;
use std::sync::Arc;

use insure_contract::{Command, Transition, TimeWindow, TransitionKind};
use insure_core::{Amount, PolicyId, Timestamp};
use insure_crypto::Party;
use insure_state::Policy;
use uuid::Uuid;

use crate::capability::{BalanceCapability, PolicyQuery};
use crate::config::FlowConfig;
use crate::error::FlowError;

/// A built, unsigned transition plus who has to countersign it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub kind: TransitionKind,
    pub tx: Transition,
    pub counterparty: Party,
}

impl Proposal {
    pub fn policy_id(&self) -> PolicyId {
        self.tx.produced.id
    }
}

/// Reported status of the incident behind a payout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentStatus {
    Crash,
}

impl FromStr for IncidentStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" => Ok(Self::Crash),
            other => Err(FlowError::IneligibleClaim(format!(
                "incident status {other:?} is not a crash"
            ))),
        }
    }
}

pub struct ProposalBuilder {
    me: Party,
    config: FlowConfig,
    vault: Arc<dyn PolicyQuery>,
    cash: Arc<dyn BalanceCapability>,
}

impl ProposalBuilder {
    pub fn new(
        me: Party,
        config: FlowConfig,
        vault: Arc<dyn PolicyQuery>,
        cash: Arc<dyn BalanceCapability>,
    ) -> Self {
        Self {
            me,
            config,
            vault,
            cash,
        }
    }

    pub fn me(&self) -> &Party {
        &self.me
    }

    /// First version of a new policy, with the premium paid to the
    /// underwriter. This node must be the client. The premium stays held
    /// until the proposal is recorded or released.
    pub async fn build_issue(
        &self,
        user: &str,
        premium: Amount,
        client: Party,
        underwriter: Party,
    ) -> Result<Proposal, FlowError> {
        if client != self.me {
            return Err(FlowError::WrongInitiator {
                kind: TransitionKind::Issue,
                expected: "client",
            });
        }
        self.ensure_funds(&premium).await?;

        let now = Timestamp::now();
        let policy = Policy::issue(user, premium.clone(), client, underwriter.clone(), now);
        let nonce = Uuid::new_v4();
        let payment = self.cash.generate_spend(&premium, &underwriter, nonce).await?;

        let tx = Transition {
            contract: self.config.contract_id.clone(),
            command: Command::new(TransitionKind::Issue, policy.owning_keys()),
            consumed: None,
            produced: policy,
            payments: vec![payment.output],
            time_window: Some(TimeWindow::with_tolerance(now, self.config.issue_window_secs)),
            nonce,
        };

        tracing::debug!(
            policy_id = %tx.produced.id,
            premium = %premium,
            counterparty = %underwriter,
            "built issue proposal"
        );
        Ok(Proposal {
            kind: TransitionKind::Issue,
            tx,
            counterparty: underwriter,
        })
    }

    /// Give back the funds held for a proposal that will not be committed.
    pub fn discard(&self, proposal: &Proposal) {
        self.cash.release(&proposal.tx.nonce);
    }

    /// Successor of the current version with `claim` paid to the client.
    /// This node must be the underwriter.
    pub async fn build_settle(&self, policy_id: PolicyId, claim: Amount) -> Result<Proposal, FlowError> {
        let current = self.vault.find_unconsumed_by_id(&policy_id).await?;

        if current.state.is_settled() {
            return Err(FlowError::AlreadySettled {
                policy_id,
                claim: current.state.claim.clone(),
            });
        }
        if current.state.underwriter != self.me {
            return Err(FlowError::WrongInitiator {
                kind: TransitionKind::Settle,
                expected: "underwriter",
            });
        }
        self.ensure_funds(&claim).await?;

        let client = current.state.client.clone();
        let produced = current.state.pay_claim(&claim)?.with_date(Timestamp::now());
        let nonce = Uuid::new_v4();
        let payment = self.cash.generate_spend(&claim, &client, nonce).await?;

        let tx = Transition {
            contract: self.config.contract_id.clone(),
            command: Command::new(TransitionKind::Settle, produced.owning_keys()),
            consumed: Some(current),
            produced,
            payments: vec![payment.output],
            time_window: None,
            nonce,
        };

        tracing::debug!(
            policy_id = %policy_id,
            claim = %claim,
            counterparty = %client,
            "built settle proposal"
        );
        Ok(Proposal {
            kind: TransitionKind::Settle,
            tx,
            counterparty: client,
        })
    }

    /// Settle, but only for an incident reported as a crash (`"C"`).
    pub async fn build_payout(
        &self,
        policy_id: PolicyId,
        claim: Amount,
        incident: &str,
    ) -> Result<Proposal, FlowError> {
        let IncidentStatus::Crash = incident.parse::<IncidentStatus>()?;
        self.build_settle(policy_id, claim).await
    }

    async fn ensure_funds(&self, needed: &Amount) -> Result<(), FlowError> {
        let available = self.cash.balance_of(&needed.currency).await?;
        if available.is_zero() || available.quantity < needed.quantity {
            return Err(FlowError::InsufficientFunds {
                needed: needed.clone(),
                available,
            });
        }
        Ok(())
    }
}

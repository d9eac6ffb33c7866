//! # Commitment Coordinator
//!
//! Drives a [`Proposal`] through the two-party commitment protocol on the
//! initiator's side: local validation, signing, counterparty round trip,
//! oracle submission and finality notice. The responder side lives in
//! [`crate::responder`].
//!
//! Every failure before `Submitted` aborts the instance and is returned to
//! the caller; nothing is retried. A caller that wants to retry builds a fresh proposal against
//! the current state.
//!
//! ## Cancellation
//!
//! Dropping the `drive` future before `Submitted` has no effect outside this
//! node: the proposal's cash hold is released and the counterparty gives up
//! waiting for the finality notice. After `Submitted` the oracle may already
//! have ordered the transition, so the instance stays in `Submitted` with
//! its funds held until [`CommitmentCoordinator::recover`] asks the oracle.
//! Once the oracle has finalized a transition the instance never aborts.

use std::sync::Arc;
use std::time::Duration;

use insure_contract::{
    SignedTransition, StateAndRef, TransitionId, TransitionKind, TransitionValidator,
};
use insure_crypto::{KeyProvider, Party};
use insure_state::{Policy, ProtocolError, ProtocolMachine, ProtocolState, ProtocolTransitionRecord};
use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

use crate::builder::Proposal;
use crate::capability::{
    BalanceCapability, LedgerRecorder, OracleOutcome, OracleStatus, OrderingOracle, PolicyQuery,
    Session, SessionTransport,
};
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::locks::VersionLocks;
use crate::message::{self, ProtocolMessage};

/// Status polls after a submission times out.
const MAX_STATUS_POLLS: u32 = 5;

/// Base delay between status polls (doubles each attempt: 200ms, 400ms, ...).
const BASE_DELAY_MS: u64 = 200;

/// The services one node's coordinator works against.
#[derive(Clone)]
pub struct Collaborators {
    pub vault: Arc<dyn PolicyQuery>,
    pub cash: Arc<dyn BalanceCapability>,
    pub recorder: Arc<dyn LedgerRecorder>,
    pub oracle: Arc<dyn OrderingOracle>,
    pub transport: Arc<dyn SessionTransport>,
}

/// One protocol instance on the initiator's side.
#[derive(Debug)]
pub struct Commitment {
    proposal: Proposal,
    machine: ProtocolMachine,
    state_tx: watch::Sender<ProtocolState>,
    /// Set once both signatures are collected.
    signed: Option<SignedTransition>,
}

impl Commitment {
    pub fn new(proposal: Proposal) -> Self {
        let machine = ProtocolMachine::new();
        let (state_tx, _) = watch::channel(machine.state());
        Self {
            proposal,
            machine,
            state_tx,
            signed: None,
        }
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    pub fn state(&self) -> ProtocolState {
        self.machine.state()
    }

    pub fn history(&self) -> &[ProtocolTransitionRecord] {
        self.machine.history()
    }

    /// The fully signed transition, once the instance got that far.
    pub fn signed(&self) -> Option<&SignedTransition> {
        self.signed.as_ref()
    }

    /// Observe state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ProtocolState> {
        self.state_tx.subscribe()
    }

    fn advance(&mut self, to: ProtocolState, reason: Option<String>) -> Result<(), FlowError> {
        self.machine.advance(to, reason)?;
        self.state_tx.send_replace(to);
        tracing::debug!(policy_id = %self.proposal.policy_id(), state = %to, "protocol state changed");
        Ok(())
    }

    fn abort(&mut self, reason: String) {
        if self.machine.abort(reason).is_ok() {
            self.state_tx.send_replace(ProtocolState::Aborted);
        }
    }
}

/// A transition both parties signed and the oracle ordered.
#[derive(Debug, Clone)]
pub struct Finality {
    pub transition_id: TransitionId,
    pub order: u64,
    pub produced: StateAndRef,
    pub transition: SignedTransition,
}

#[derive(Clone)]
pub struct CommitmentCoordinator {
    pub(crate) me: Party,
    pub(crate) keys: Arc<dyn KeyProvider>,
    pub(crate) config: FlowConfig,
    pub(crate) validator: TransitionValidator,
    pub(crate) services: Collaborators,
    pub(crate) locks: VersionLocks,
}

impl CommitmentCoordinator {
    pub fn new(me: Party, keys: Arc<dyn KeyProvider>, config: FlowConfig, services: Collaborators) -> Self {
        let validator = TransitionValidator::new(config.contract_config());
        Self {
            me,
            keys,
            config,
            validator,
            services,
            locks: VersionLocks::new(),
        }
    }

    pub fn me(&self) -> &Party {
        &self.me
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn locks(&self) -> &VersionLocks {
        &self.locks
    }

    /// Build a commitment for `proposal` and drive it to completion.
    pub async fn commit(&self, proposal: Proposal) -> Result<Finality, FlowError> {
        let mut commitment = Commitment::new(proposal);
        self.drive(&mut commitment).await
    }

    /// Drive `commitment` from `Built` to `Finalized`, or to `Aborted` with
    /// the error returned. Two failures leave the instance where it is: an
    /// oracle verdict that never arrived (`Submitted`, see [`Self::recover`])
    /// and a finalized transition this node failed to record (`Finalized`,
    /// reported as `NotRecorded`).
    pub async fn drive(&self, commitment: &mut Commitment) -> Result<Finality, FlowError> {
        let policy_id = commitment.proposal.policy_id();
        match self.run(commitment).await {
            Ok(finality) => {
                tracing::info!(
                    policy_id = %policy_id,
                    transition_id = %finality.transition_id.short(),
                    order = finality.order,
                    "transition finalized"
                );
                Ok(finality)
            }
            Err(e) => {
                let state = commitment.state();
                match state {
                    ProtocolState::Finalized if matches!(e, FlowError::NotRecorded { .. }) => {
                        tracing::error!(policy_id = %policy_id, error = %e, "finalized transition not recorded");
                    }
                    ProtocolState::Submitted if !rejected_by_oracle(&e) => {
                        tracing::warn!(
                            policy_id = %policy_id,
                            error = %e,
                            "oracle outcome pending, instance left in SUBMITTED"
                        );
                    }
                    s if !s.is_terminal() => {
                        commitment.abort(e.to_string());
                        tracing::warn!(policy_id = %policy_id, state = %s, error = %e, "commitment aborted");
                    }
                    s => {
                        tracing::warn!(policy_id = %policy_id, state = %s, error = %e, "commitment failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Resolve an instance left in `Submitted` by a dropped `drive` future
    /// or an oracle verdict that never arrived. A finalized transition is
    /// recorded locally; a conflicting one aborts the instance and releases
    /// its funds. While the verdict stays unknown nothing changes.
    pub async fn recover(&self, commitment: &mut Commitment) -> Result<Finality, FlowError> {
        let state = commitment.state();
        let stx = match (&commitment.signed, state) {
            (Some(stx), ProtocolState::Submitted) => stx.clone(),
            _ => {
                return Err(ProtocolError::InvalidTransition {
                    from: state,
                    to: ProtocolState::Finalized,
                }
                .into())
            }
        };
        let id = stx.id()?;
        match self.poll_status(id).await {
            Ok(order) => {
                commitment.advance(ProtocolState::Finalized, Some(format!("order {order}, recovered")))?;
                let recorded = self.services.recorder.record(&stx).await;
                tracing::info!(
                    policy_id = %commitment.proposal.policy_id(),
                    transition_id = %id.short(),
                    order,
                    "recovered finalized transition"
                );
                finality(stx, id, order, recorded)
            }
            Err(e @ FlowError::DoubleSpend(_)) => {
                self.services.cash.release(&stx.tx.nonce);
                commitment.abort(e.to_string());
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn run(&self, c: &mut Commitment) -> Result<Finality, FlowError> {
        if c.state() != ProtocolState::Built {
            return Err(ProtocolError::InvalidTransition {
                from: c.state(),
                to: ProtocolState::LocallyValidated,
            }
            .into());
        }
        let mut hold = SpendHold {
            cash: self.services.cash.clone(),
            nonce: c.proposal.tx.nonce,
            armed: true,
        };
        // Held until the counterparty acknowledges finality or we fail.
        let _lease = match c.proposal.tx.consumed_ref() {
            Some(version) => Some(self.locks.acquire(version, self.config.conflict_policy).await?),
            None => None,
        };

        let kind = self.validator.validate_transition(&c.proposal.tx)?;
        c.advance(ProtocolState::LocallyValidated, None)?;

        let counterparty = self.counterparty_for(kind, &c.proposal.tx.produced)?.clone();
        let mut stx = SignedTransition::unsigned(c.proposal.tx.clone());
        stx.sign_with(self.keys.as_ref())?;
        let id = stx.id()?;
        c.advance(ProtocolState::LocallySigned, None)?;

        let mut session = self.services.transport.open(&counterparty.key).await?;
        message::send(session.as_mut(), &ProtocolMessage::Propose { transition: stx.clone() }).await?;
        c.advance(ProtocolState::AwaitingCounterparty, Some(counterparty.name.clone()))?;

        let reply = timeout(self.config.counterparty_timeout(), message::receive(session.as_mut())).await;
        let signature = match reply {
            Err(_) => {
                notify_abort(session.as_mut(), "counterparty timeout").await;
                return Err(FlowError::Timeout("counterparty"));
            }
            Ok(reply) => match reply? {
                ProtocolMessage::Signature { signature } => signature,
                ProtocolMessage::Refuse { reason } => {
                    c.advance(ProtocolState::CounterpartyRejected, Some(reason.clone()))?;
                    return Err(FlowError::CounterpartyRejected(reason));
                }
                other => {
                    notify_abort(session.as_mut(), "unexpected reply").await;
                    return Err(FlowError::Transport(format!(
                        "expected signature or refusal, got {}",
                        other.name()
                    )));
                }
            },
        };
        c.advance(ProtocolState::CounterpartyValidated, None)?;

        stx.add_signature(signature);
        if let Err(e) = stx.verify_signatures() {
            notify_abort(session.as_mut(), "invalid counterparty signature").await;
            return Err(e.into());
        }
        let actual = stx.signers();
        if actual != stx.tx.command.signers {
            notify_abort(session.as_mut(), "signer set mismatch").await;
            return Err(FlowError::SignerMismatch {
                expected: stx.tx.command.signers.clone(),
                actual,
            });
        }
        c.advance(ProtocolState::FullySigned, None)?;
        c.signed = Some(stx.clone());

        // From here the oracle may order the transition at any moment.
        hold.keep();
        c.advance(ProtocolState::Submitted, None)?;
        let order = match self.submit(&stx, id).await {
            Ok(order) => order,
            Err(e) if rejected_by_oracle(&e) => {
                self.services.cash.release(&stx.tx.nonce);
                notify_abort(session.as_mut(), &e.to_string()).await;
                return Err(e);
            }
            // No verdict: the counterparty sees the session close and polls
            // the oracle itself.
            Err(e) => return Err(e),
        };

        c.advance(ProtocolState::Finalized, Some(format!("order {order}")))?;
        let recorded = self.services.recorder.record(&stx).await;
        self.await_ack(session.as_mut(), id).await;
        finality(stx, id, order, recorded)
    }

    /// The party this node must collect a signature from, after checking
    /// this node is the one entitled to initiate `kind`.
    fn counterparty_for<'a>(&self, kind: TransitionKind, policy: &'a Policy) -> Result<&'a Party, FlowError> {
        let (initiator, role, other) = match kind {
            TransitionKind::Issue => (&policy.client, "client", &policy.underwriter),
            TransitionKind::Settle => (&policy.underwriter, "underwriter", &policy.client),
        };
        if *initiator != self.me {
            return Err(FlowError::WrongInitiator { kind, expected: role });
        }
        Ok(other)
    }

    /// Submit to the oracle. A submission that outlives `oracle_timeout` is
    /// not abandoned: the outcome is recovered by polling status.
    async fn submit(&self, stx: &SignedTransition, id: TransitionId) -> Result<u64, FlowError> {
        let outcome = match timeout(self.config.oracle_timeout(), self.services.oracle.submit(stx)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::warn!(transition_id = %id.short(), "oracle submission timed out, polling status");
                return self.poll_status(id).await;
            }
        };
        match outcome {
            OracleOutcome::Finalized { order } => Ok(order),
            OracleOutcome::Conflict { spent_by } => {
                tracing::warn!(
                    transition_id = %id.short(),
                    spent_by = %spent_by.short(),
                    "consumed version already spent"
                );
                Err(FlowError::DoubleSpend(id))
            }
            OracleOutcome::OutsideTimeWindow => Err(FlowError::OutsideTimeWindow),
        }
    }

    /// Ask the oracle for `id`'s verdict with doubling backoff.
    pub(crate) async fn poll_status(&self, id: TransitionId) -> Result<u64, FlowError> {
        for attempt in 0..MAX_STATUS_POLLS {
            let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
            tokio::time::sleep(delay).await;
            match self.services.oracle.status(&id).await? {
                OracleStatus::Finalized { order } => return Ok(order),
                OracleStatus::Conflicted { .. } => return Err(FlowError::DoubleSpend(id)),
                OracleStatus::Unknown => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_polls = MAX_STATUS_POLLS,
                        transition_id = %id.short(),
                        "oracle outcome not yet known"
                    );
                }
            }
        }
        Err(FlowError::OutcomeUnknown(id))
    }

    /// Send the finality notice and wait, bounded, for the acknowledgement.
    /// The transition is already final; failures here are only logged.
    async fn await_ack(&self, session: &mut dyn Session, id: TransitionId) {
        let notice = ProtocolMessage::Finalized { transition_id: id };
        if let Err(e) = message::send(session, &notice).await {
            tracing::warn!(transition_id = %id.short(), error = %e, "could not deliver finality notice");
            return;
        }
        match timeout(self.config.ack_timeout(), message::receive(session)).await {
            Ok(Ok(ProtocolMessage::Ack)) => {
                tracing::debug!(transition_id = %id.short(), "counterparty acknowledged");
            }
            Ok(Ok(other)) => {
                tracing::warn!(transition_id = %id.short(), message = other.name(), "expected ack");
            }
            Ok(Err(e)) => {
                tracing::warn!(transition_id = %id.short(), error = %e, "ack not received");
            }
            Err(_) => {
                tracing::warn!(transition_id = %id.short(), "timed out waiting for ack");
            }
        }
    }
}

/// Oracle verdicts that settle a submitted transition as never applied.
fn rejected_by_oracle(e: &FlowError) -> bool {
    matches!(e, FlowError::DoubleSpend(_) | FlowError::OutsideTimeWindow)
}

/// The result of a finalized transition. A local recording failure does
/// not undo finality; it is reported on its own.
fn finality(
    stx: SignedTransition,
    id: TransitionId,
    order: u64,
    recorded: Result<StateAndRef, FlowError>,
) -> Result<Finality, FlowError> {
    match recorded {
        Ok(produced) => Ok(Finality {
            transition_id: id,
            order,
            produced,
            transition: stx,
        }),
        Err(e) => Err(FlowError::NotRecorded {
            transition_id: id,
            order,
            reason: e.to_string(),
        }),
    }
}

/// Releases a proposal's cash hold when dropped, unless the proposal was
/// submitted.
struct SpendHold {
    cash: Arc<dyn BalanceCapability>,
    nonce: Uuid,
    armed: bool,
}

impl SpendHold {
    fn keep(&mut self) {
        self.armed = false;
    }
}

impl Drop for SpendHold {
    fn drop(&mut self) {
        if self.armed {
            self.cash.release(&self.nonce);
        }
    }
}

/// Best-effort abort notice; the counterparty times out if it never arrives.
async fn notify_abort(session: &mut dyn Session, reason: &str) {
    let msg = ProtocolMessage::Aborted {
        reason: reason.to_string(),
    };
    if let Err(e) = message::send(session, &msg).await {
        tracing::debug!(error = %e, "abort notice not delivered");
    }
}

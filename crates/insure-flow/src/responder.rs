//! Counterparty side of the commitment protocol.
//!
//! The responder trusts nothing the initiator says: it compares the
//! consumed version against its own vault, re-runs the validator, checks
//! the initiator's signature, and refuses any proposal that would debit its
//! own party. Whether the consumed version is still unspent is left to the
//! oracle. It records only transitions the oracle confirms, and once it has
//! signed it asks the oracle itself if the initiator never reports back.

use insure_contract::{signing_payload, SignedTransition, StateAndRef, TransitionId, TransitionSignature};
use insure_crypto::PublicKey;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::capability::{OracleStatus, Session};
use crate::coordinator::CommitmentCoordinator;
use crate::error::FlowError;
use crate::locks::VersionLease;
use crate::message::{self, ProtocolMessage};

/// How one responder instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    Recorded {
        transition_id: TransitionId,
        produced: StateAndRef,
    },
    /// The proposal failed a check; the reason was sent to the initiator.
    Refused { reason: String },
    /// The initiator abandoned the instance after we signed.
    Aborted { reason: String },
}

impl CommitmentCoordinator {
    /// Accept sessions until the transport shuts down, answering each on its
    /// own task.
    pub fn serve(&self) -> JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move {
            while let Some(session) = node.services.transport.accept().await {
                let responder = node.clone();
                tokio::spawn(async move {
                    let peer = session.counterparty();
                    match responder.respond(session).await {
                        Ok(outcome) => {
                            tracing::debug!(counterparty = %peer.short(), ?outcome, "responder finished");
                        }
                        Err(e) => {
                            tracing::warn!(counterparty = %peer.short(), error = %e, "responder failed");
                        }
                    }
                });
            }
            tracing::debug!(party = %node.me, "transport closed, responder loop exiting");
        })
    }

    /// Answer one incoming proposal.
    pub async fn respond(&self, mut session: Box<dyn Session>) -> Result<ResponderOutcome, FlowError> {
        let peer = session.counterparty();
        let first = timeout(self.config.counterparty_timeout(), message::receive(session.as_mut()))
            .await
            .map_err(|_| FlowError::Timeout("proposal"))??;
        let mut stx = match first {
            ProtocolMessage::Propose { transition } => transition,
            other => {
                return Err(FlowError::Transport(format!(
                    "expected proposal, got {}",
                    other.name()
                )))
            }
        };
        let id = stx.id()?;

        let lease = match self.vet(&stx, peer).await {
            Ok(lease) => lease,
            Err(reason) => {
                tracing::info!(
                    transition_id = %id.short(),
                    counterparty = %peer.short(),
                    reason = %reason,
                    "refusing proposal"
                );
                message::send(session.as_mut(), &ProtocolMessage::Refuse { reason: reason.clone() }).await?;
                return Ok(ResponderOutcome::Refused { reason });
            }
        };

        let signature = self.keys.sign(&signing_payload(&id)?)?;
        let mine = TransitionSignature {
            by: self.keys.public_key(),
            signature,
        };
        stx.add_signature(mine.clone());
        message::send(session.as_mut(), &ProtocolMessage::Signature { signature: mine }).await?;
        tracing::debug!(transition_id = %id.short(), counterparty = %peer.short(), "countersigned proposal");

        // We have signed: from here the oracle, not the initiator, decides
        // whether the transition happened.
        let notice = timeout(self.config.finality_timeout(), message::receive(session.as_mut())).await;
        let outcome = match notice {
            Ok(Ok(ProtocolMessage::Finalized { transition_id })) if transition_id == id => {
                self.confirm_and_record(&stx, id).await?
            }
            Ok(Ok(ProtocolMessage::Aborted { reason })) => {
                // The initiator may have given up on an outcome the oracle
                // did reach.
                match self.services.oracle.status(&id).await? {
                    OracleStatus::Finalized { order } => self.record_finalized(&stx, id, order).await?,
                    _ => {
                        tracing::info!(transition_id = %id.short(), reason = %reason, "initiator aborted");
                        return Ok(ResponderOutcome::Aborted { reason });
                    }
                }
            }
            Ok(Ok(other)) => {
                let cause = format!("expected finality notice, got {}", other.name());
                self.resolve_with_oracle(&stx, id, cause).await?
            }
            Ok(Err(e)) => self.resolve_with_oracle(&stx, id, e.to_string()).await?,
            Err(_) => {
                let cause = "timed out waiting for finality notice".to_string();
                self.resolve_with_oracle(&stx, id, cause).await?
            }
        };

        drop(lease);
        if let Err(e) = message::send(session.as_mut(), &ProtocolMessage::Ack).await {
            tracing::debug!(transition_id = %id.short(), error = %e, "ack not delivered");
        }
        Ok(outcome)
    }

    /// Every check a proposal must pass before we sign. The error is the
    /// refusal reason sent back to the initiator.
    async fn vet(&self, stx: &SignedTransition, peer: PublicKey) -> Result<Option<VersionLease>, String> {
        let tx = &stx.tx;

        if !tx.command.signers.contains(&self.me.key) {
            return Err("responder is not a required signer".into());
        }
        match tx.produced.counterparty_of(&self.me) {
            Some(other) if other.key == peer => {}
            _ => return Err("session peer is not the counterparty on this policy".into()),
        }

        let lease = match &tx.consumed {
            None => None,
            Some(consumed) => {
                let local = self
                    .services
                    .vault
                    .find_by_ref(&consumed.reference)
                    .await
                    .map_err(|e| e.to_string())?;
                if local.as_ref() != Some(consumed) {
                    return Err(format!(
                        "consumed version {} does not match the local copy",
                        consumed.reference
                    ));
                }
                let lease = self
                    .locks
                    .try_acquire(consumed.reference)
                    .map_err(|e| e.to_string())?;
                Some(lease)
            }
        };

        self.validator
            .validate_transition(tx)
            .map_err(|e| e.to_string())?;
        stx.verify_signatures().map_err(|e| e.to_string())?;
        if !stx.signers().contains(&peer) {
            return Err("proposal is not signed by the initiator".into());
        }
        if tx.payments.iter().any(|p| p.payer == self.me) {
            return Err("proposal moves cash out of the responder's account".into());
        }
        Ok(lease)
    }

    async fn confirm_and_record(
        &self,
        stx: &SignedTransition,
        id: TransitionId,
    ) -> Result<ResponderOutcome, FlowError> {
        match self.services.oracle.status(&id).await? {
            OracleStatus::Finalized { order } => self.record_finalized(stx, id, order).await,
            OracleStatus::Conflicted { .. } => Err(FlowError::DoubleSpend(id)),
            OracleStatus::Unknown => Err(FlowError::OutcomeUnknown(id)),
        }
    }

    /// The initiator went quiet after we signed. Poll the oracle with the
    /// same backoff the initiator uses and record what it finalized.
    async fn resolve_with_oracle(
        &self,
        stx: &SignedTransition,
        id: TransitionId,
        cause: String,
    ) -> Result<ResponderOutcome, FlowError> {
        tracing::warn!(transition_id = %id.short(), cause = %cause, "no finality notice, polling oracle");
        match self.poll_status(id).await {
            Ok(order) => self.record_finalized(stx, id, order).await,
            Err(FlowError::DoubleSpend(_)) => Ok(ResponderOutcome::Aborted {
                reason: format!("{cause}; oracle reports a conflict"),
            }),
            Err(e) => Err(e),
        }
    }

    async fn record_finalized(
        &self,
        stx: &SignedTransition,
        id: TransitionId,
        order: u64,
    ) -> Result<ResponderOutcome, FlowError> {
        let produced = self.services.recorder.record(stx).await?;
        tracing::info!(
            policy_id = %produced.state.id,
            transition_id = %id.short(),
            order,
            "recorded countersigned transition"
        );
        Ok(ResponderOutcome::Recorded {
            transition_id: id,
            produced,
        })
    }
}

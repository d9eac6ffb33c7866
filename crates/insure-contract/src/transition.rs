//! # Transition Wire Model
//!
//! A [`Transition`] carries everything a receiver needs to re-derive the
//! validator's verdict on its own: the full content of the consumed version,
//! the produced version, the cash movements, and the declared signer set.
//! Nothing in it refers to state the receiver would have to trust the
//! sender about.
//!
//! The [`TransitionId`] is the SHA-256 of the transition's canonical bytes.
//! Parties sign the canonical form of the id, never the raw struct.

use std::collections::BTreeSet;

use insure_core::{sha256_digest, Amount, CanonicalBytes, CanonicalizationError, ContentDigest, Timestamp};
use insure_crypto::{verify, KeyProvider, Party, PublicKey, Signature};
use insure_state::Policy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ─── Kinds and commands ──────────────────────────────────────────────

/// The closed set of transitions the contract knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    Issue,
    Settle,
}

impl TransitionKind {
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Issue => "Issue",
            Self::Settle => "Settle",
        }
    }

    /// Resolve a wire command tag. Unknown tags are a hard validation error.
    pub fn from_command(name: &str) -> Result<Self, ValidationError> {
        match name {
            "Issue" => Ok(Self::Issue),
            "Settle" => Ok(Self::Settle),
            other => Err(ValidationError::UnrecognizedTransition(other.to_string())),
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Command tag plus the keys declared as required signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub signers: BTreeSet<PublicKey>,
}

impl Command {
    pub fn new(kind: TransitionKind, signers: BTreeSet<PublicKey>) -> Self {
        Self {
            name: kind.command_name().to_string(),
            signers,
        }
    }
}

// ─── References ──────────────────────────────────────────────────────

/// Content-derived identifier of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(ContentDigest);

impl TransitionId {
    pub fn digest(&self) -> &ContentDigest {
        &self.0
    }

    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Names one policy version: the transition that produced it and its
/// output index within that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub transition_id: TransitionId,
    pub index: u32,
}

impl std::fmt::Display for StateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.transition_id.short(), self.index)
    }
}

/// A policy version together with the reference that names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: Policy,
    pub reference: StateRef,
}

// ─── Payments and time ───────────────────────────────────────────────

/// Cash moved from `payer` to `payee` as part of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub amount: Amount,
    pub payer: Party,
    pub payee: Party,
}

/// Inclusive acceptance window enforced by the ordering oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub not_before: Timestamp,
    pub not_after: Timestamp,
}

impl TimeWindow {
    /// `anchor ± tolerance_secs`.
    pub fn with_tolerance(anchor: Timestamp, tolerance_secs: i64) -> Self {
        Self {
            not_before: anchor.plus_secs(-tolerance_secs),
            not_after: anchor.plus_secs(tolerance_secs),
        }
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

// ─── Transition ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Contract identifier the transition claims to be governed by.
    pub contract: String,
    pub command: Command,
    pub consumed: Option<StateAndRef>,
    pub produced: Policy,
    pub payments: Vec<PaymentOutput>,
    pub time_window: Option<TimeWindow>,
    /// Distinguishes otherwise identical proposals.
    pub nonce: Uuid,
}

impl Transition {
    pub fn kind(&self) -> Result<TransitionKind, ValidationError> {
        TransitionKind::from_command(&self.command.name)
    }

    pub fn id(&self) -> Result<TransitionId, CanonicalizationError> {
        let canonical = CanonicalBytes::new(self)?;
        Ok(TransitionId(sha256_digest(&canonical)))
    }

    /// Reference of the single version this transition produces.
    pub fn produced_ref(&self) -> Result<StateRef, CanonicalizationError> {
        Ok(StateRef {
            transition_id: self.id()?,
            index: 0,
        })
    }

    pub fn consumed_ref(&self) -> Option<StateRef> {
        self.consumed.as_ref().map(|s| s.reference)
    }
}

// ─── Signatures ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSignature {
    pub by: PublicKey,
    pub signature: Signature,
}

/// A transition plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransition {
    pub tx: Transition,
    pub signatures: Vec<TransitionSignature>,
}

/// Bytes every party signs: the canonical form of the transition id.
pub fn signing_payload(id: &TransitionId) -> Result<CanonicalBytes, CanonicalizationError> {
    CanonicalBytes::new(id)
}

impl SignedTransition {
    pub fn unsigned(tx: Transition) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn id(&self) -> Result<TransitionId, CanonicalizationError> {
        self.tx.id()
    }

    /// Sign with `provider`. A key that has already signed is not added twice.
    pub fn sign_with(&mut self, provider: &dyn KeyProvider) -> Result<(), ValidationError> {
        let payload = signing_payload(&self.id()?)?;
        let signature = provider.sign(&payload)?;
        self.add_signature(TransitionSignature {
            by: provider.public_key(),
            signature,
        });
        Ok(())
    }

    pub fn add_signature(&mut self, sig: TransitionSignature) {
        if !self.signatures.iter().any(|s| s.by == sig.by) {
            self.signatures.push(sig);
        }
    }

    /// Keys that have signed.
    pub fn signers(&self) -> BTreeSet<PublicKey> {
        self.signatures.iter().map(|s| s.by).collect()
    }

    /// Check every attached signature against the transition id.
    pub fn verify_signatures(&self) -> Result<(), ValidationError> {
        let payload = signing_payload(&self.id()?)?;
        for sig in &self.signatures {
            verify(&payload, &sig.signature, &sig.by).map_err(|e| ValidationError::InvalidSignature {
                key: sig.by,
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insure_core::Currency;
    use insure_crypto::LocalKeyProvider;

    fn party(name: &str, seed: u8) -> (Party, LocalKeyProvider) {
        let provider = LocalKeyProvider::from_seed(&[seed; 32]);
        (Party::new(name, provider.public_key()), provider)
    }

    fn issue_tx() -> (Transition, LocalKeyProvider, LocalKeyProvider) {
        let (client, client_key) = party("Client", 1);
        let (underwriter, underwriter_key) = party("Underwriter", 2);
        let premium = Amount::new(100_000, Currency::new("CAD").unwrap());
        let now = Timestamp::parse("2026-02-01T10:00:00Z").unwrap();
        let policy = Policy::issue("alice", premium.clone(), client.clone(), underwriter.clone(), now);
        let tx = Transition {
            contract: "insure.policy.v1".into(),
            command: Command::new(TransitionKind::Issue, policy.owning_keys()),
            consumed: None,
            produced: policy,
            payments: vec![PaymentOutput { amount: premium, payer: client, payee: underwriter }],
            time_window: Some(TimeWindow::with_tolerance(now, 30)),
            nonce: Uuid::new_v4(),
        };
        (tx, client_key, underwriter_key)
    }

    #[test]
    fn test_command_tags() {
        assert_eq!(TransitionKind::from_command("Issue").unwrap(), TransitionKind::Issue);
        assert_eq!(TransitionKind::from_command("Settle").unwrap(), TransitionKind::Settle);
        assert!(matches!(
            TransitionKind::from_command("Transfer"),
            Err(ValidationError::UnrecognizedTransition(name)) if name == "Transfer"
        ));
    }

    #[test]
    fn test_id_is_stable_and_content_sensitive() {
        let (tx, _, _) = issue_tx();
        assert_eq!(tx.id().unwrap(), tx.clone().id().unwrap());

        let mut other = tx.clone();
        other.produced.user = "bob".into();
        assert_ne!(tx.id().unwrap(), other.id().unwrap());

        let mut renonced = tx.clone();
        renonced.nonce = Uuid::new_v4();
        assert_ne!(tx.id().unwrap(), renonced.id().unwrap());
    }

    #[test]
    fn test_id_survives_json_transport() {
        let (tx, _, _) = issue_tx();
        let wire = serde_json::to_string(&tx).unwrap();
        let received: Transition = serde_json::from_str(&wire).unwrap();
        assert_eq!(received.id().unwrap(), tx.id().unwrap());
    }

    #[test]
    fn test_sign_and_verify_both_parties() {
        let (tx, client_key, underwriter_key) = issue_tx();
        let mut stx = SignedTransition::unsigned(tx);
        stx.sign_with(&client_key).unwrap();
        stx.sign_with(&client_key).unwrap();
        assert_eq!(stx.signatures.len(), 1, "duplicate signer ignored");
        stx.sign_with(&underwriter_key).unwrap();
        assert_eq!(stx.signers(), stx.tx.produced.owning_keys());
        stx.verify_signatures().unwrap();
    }

    #[test]
    fn test_tampering_after_signing_detected() {
        let (tx, client_key, _) = issue_tx();
        let mut stx = SignedTransition::unsigned(tx);
        stx.sign_with(&client_key).unwrap();
        stx.tx.produced.premium.quantity = 1;
        assert!(matches!(
            stx.verify_signatures(),
            Err(ValidationError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_forged_signer_detected() {
        let (tx, client_key, underwriter_key) = issue_tx();
        let mut stx = SignedTransition::unsigned(tx);
        stx.sign_with(&client_key).unwrap();
        let sig = stx.signatures[0].signature.clone();
        stx.add_signature(TransitionSignature { by: underwriter_key.public_key(), signature: sig });
        assert!(stx.verify_signatures().is_err());
    }

    #[test]
    fn test_time_window_bounds() {
        let anchor = Timestamp::parse("2026-02-01T10:00:00Z").unwrap();
        let window = TimeWindow::with_tolerance(anchor, 30);
        assert!(window.contains(anchor));
        assert!(window.contains(anchor.plus_secs(30)));
        assert!(window.contains(anchor.plus_secs(-30)));
        assert!(!window.contains(anchor.plus_secs(31)));
        assert!(!window.contains(anchor.plus_secs(-31)));
    }

    #[test]
    fn test_produced_ref_points_at_index_zero() {
        let (tx, _, _) = issue_tx();
        let r = tx.produced_ref().unwrap();
        assert_eq!(r.index, 0);
        assert_eq!(r.transition_id, tx.id().unwrap());
        assert!(tx.consumed_ref().is_none());
    }
}

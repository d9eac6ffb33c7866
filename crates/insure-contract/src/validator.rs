//! # Transition Validator
//!
//! A pure function of its inputs. Both parties run it on the same proposal
//! and must reach the same verdict, so it reads no clock, no vault, and no
//! configuration beyond the contract identifier it was built with.
//!
//! Clauses are evaluated in a fixed order and the first failure is
//! reported.

use std::collections::BTreeSet;

use insure_core::Amount;
use insure_crypto::{Party, PublicKey};
use insure_state::Policy;

use crate::config::ContractConfig;
use crate::error::{ValidationError, Violation};
use crate::transition::{PaymentOutput, Transition, TransitionKind};

#[derive(Debug, Clone, Default)]
pub struct TransitionValidator {
    config: ContractConfig,
}

/// Fail with `violation` unless `cond` holds.
fn require(cond: bool, violation: Violation) -> Result<(), Violation> {
    if cond {
        Ok(())
    } else {
        Err(violation)
    }
}

impl TransitionValidator {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Validate a proposed change against the rule named by `kind`.
    pub fn validate(
        &self,
        kind: TransitionKind,
        consumed: Option<&Policy>,
        produced: &Policy,
        payments: &[PaymentOutput],
        signers: &BTreeSet<PublicKey>,
    ) -> Result<(), ValidationError> {
        let verdict = match kind {
            TransitionKind::Issue => verify_issue(consumed, produced, signers),
            TransitionKind::Settle => verify_settle(consumed, produced, payments, signers),
        };
        verdict.map_err(ValidationError::Rejected)
    }

    /// Validate a full wire transition: contract tag, command tag, then the
    /// rule for that command over the declared signer set.
    pub fn validate_transition(&self, tx: &Transition) -> Result<TransitionKind, ValidationError> {
        require(
            tx.contract == self.config.contract_id,
            Violation::WrongContract {
                expected: self.config.contract_id.clone(),
                found: tx.contract.clone(),
            },
        )?;
        let kind = tx.kind()?;
        self.validate(
            kind,
            tx.consumed.as_ref().map(|s| &s.state),
            &tx.produced,
            &tx.payments,
            &tx.command.signers,
        )?;
        Ok(kind)
    }
}

fn verify_issue(
    consumed: Option<&Policy>,
    produced: &Policy,
    signers: &BTreeSet<PublicKey>,
) -> Result<(), Violation> {
    require(consumed.is_none(), Violation::IssueConsumesInput)?;
    require(produced.premium.quantity > 0, Violation::PremiumNotPositive)?;
    require(produced.client != produced.underwriter, Violation::SameParty)?;
    require(produced.claim.is_zero(), Violation::IssuedWithClaim)?;
    require(*signers == produced.owning_keys(), Violation::IssueSigners)
}

fn verify_settle(
    consumed: Option<&Policy>,
    produced: &Policy,
    payments: &[PaymentOutput],
    signers: &BTreeSet<PublicKey>,
) -> Result<(), Violation> {
    let input = consumed.ok_or(Violation::MissingInput)?;

    require(!payments.is_empty(), Violation::NoCashOutput)?;
    require(
        payments.iter().any(|p| p.payee == input.client),
        Violation::NoCashToClient,
    )?;
    require(
        input.claim.is_zero(),
        Violation::AlreadySettled {
            claim: input.claim.to_string(),
        },
    )?;

    require(input.premium == produced.premium, Violation::PremiumChanged)?;
    require(input.client == produced.client, Violation::ClientChanged)?;
    require(input.underwriter == produced.underwriter, Violation::UnderwriterChanged)?;
    require(input.id == produced.id, Violation::IdChanged)?;
    require(input.user == produced.user, Violation::UserChanged)?;
    // Dates are whole seconds; an issue and its settlement may share one.
    require(produced.date >= input.date, Violation::DateRegressed)?;
    require(
        produced.claim.currency == input.claim.currency,
        Violation::ClaimCurrencyChanged {
            expected: input.claim.currency.to_string(),
            found: produced.claim.currency.to_string(),
        },
    )?;

    require(produced.claim.quantity > 0, Violation::ClaimNotPositive)?;
    let paid = paid_to(payments, &input.client, &produced.claim);
    require(
        paid.as_ref() == Some(&produced.claim),
        Violation::ClaimNotCovered {
            paid: paid.map_or_else(|| "overflow".to_string(), |a| a.to_string()),
            claimed: produced.claim.to_string(),
        },
    )?;

    require(*signers == input.owning_keys(), Violation::SettleSigners)
}

/// Total paid to `payee` in the currency of `like`. `None` on overflow.
fn paid_to(payments: &[PaymentOutput], payee: &Party, like: &Amount) -> Option<Amount> {
    payments
        .iter()
        .filter(|p| p.payee == *payee && p.amount.currency == like.currency)
        .try_fold(Amount::zero(like.currency.clone()), |acc, p| acc.checked_add(&p.amount).ok())
}

//! # Policy Entity
//!
//! A policy is a linear, versioned record. Every transition consumes one
//! version (none for issuance) and produces exactly one successor; the
//! [`PolicyId`] is carried unchanged across every version.
//!
//! Values here are immutable. Helpers return a new version and leave the
//! receiver untouched, so the consumed copy a node holds can always be
//! compared byte-for-byte with what the counterparty sent.

use std::collections::BTreeSet;

use insure_core::{Amount, AmountError, PolicyId, Timestamp};
use insure_crypto::{Party, PublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from policy helper operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy {policy_id}: {source}")]
    Amount {
        policy_id: PolicyId,
        #[source]
        source: AmountError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    /// Label of the insured.
    pub user: String,
    pub premium: Amount,
    /// Total already paid out.
    pub claim: Amount,
    pub client: Party,
    pub underwriter: Party,
    /// Last-modified time, advanced by every transition.
    pub date: Timestamp,
}

impl Policy {
    /// First version of a new policy: fresh id, zero claim in the premium's
    /// currency.
    pub fn issue(
        user: impl Into<String>,
        premium: Amount,
        client: Party,
        underwriter: Party,
        date: Timestamp,
    ) -> Self {
        let claim = Amount::zero(premium.currency.clone());
        Self {
            id: PolicyId::new(),
            user: user.into(),
            premium,
            claim,
            client,
            underwriter,
            date,
        }
    }

    /// Successor with `amount` added to the premium.
    pub fn pay_premium(&self, amount: &Amount) -> Result<Self, PolicyError> {
        let premium = self.premium.checked_add(amount).map_err(|source| PolicyError::Amount {
            policy_id: self.id,
            source,
        })?;
        Ok(Self { premium, ..self.clone() })
    }

    /// Successor with `amount` added to the claim paid.
    pub fn pay_claim(&self, amount: &Amount) -> Result<Self, PolicyError> {
        let claim = self.claim.checked_add(amount).map_err(|source| PolicyError::Amount {
            policy_id: self.id,
            source,
        })?;
        Ok(Self { claim, ..self.clone() })
    }

    pub fn with_date(&self, date: Timestamp) -> Self {
        Self { date, ..self.clone() }
    }

    pub fn participants(&self) -> [&Party; 2] {
        [&self.client, &self.underwriter]
    }

    /// Keys that must sign every transition of this policy.
    pub fn owning_keys(&self) -> BTreeSet<PublicKey> {
        BTreeSet::from([self.client.key, self.underwriter.key])
    }

    pub fn is_settled(&self) -> bool {
        !self.claim.is_zero()
    }

    /// The counterparty of `me` on this policy, if `me` is a participant.
    pub fn counterparty_of(&self, me: &Party) -> Option<&Party> {
        if *me == self.client {
            Some(&self.underwriter)
        } else if *me == self.underwriter {
            Some(&self.client)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Policy({}): {} insured by {} for {}, premium {}, claim {}",
            self.id, self.user, self.underwriter, self.client, self.premium, self.claim
        )
    }
}

//! # Money
//!
//! `Amount` is a non-negative quantity of integer minor units tagged with a
//! [`Currency`]. There is no signed representation: subtraction that would
//! go below zero is an error, as is mixing currencies.

use serde::{Deserialize, Serialize};

use crate::error::{AmountError, CoreError};

/// An ISO-4217 style currency code: exactly three upper-case ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Validate and wrap a currency code.
    pub fn new(code: impl Into<String>) -> Result<Self, CoreError> {
        let code = code.into();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(CoreError::InvalidCurrency(code))
        }
    }

    /// Canadian dollars, the ledger's default currency.
    pub fn cad() -> Self {
        Self("CAD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A quantity of money in minor units (cents for CAD).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Minor units. Never negative.
    pub quantity: u64,
    /// Currency of the quantity.
    pub currency: Currency,
}

impl Amount {
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    /// Zero of the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self { quantity: 0, currency }
    }

    /// Whole units converted to minor units (`1000 CAD` → `100000`).
    pub fn from_major(units: u64, currency: Currency) -> Result<Self, AmountError> {
        let quantity = units.checked_mul(100).ok_or(AmountError::Overflow)?;
        Ok(Self { quantity, currency })
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.same_currency(other)?;
        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount { quantity, currency: self.currency.clone() })
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.same_currency(other)?;
        let quantity = self
            .quantity
            .checked_sub(other.quantity)
            .ok_or(AmountError::Underflow {
                minuend: self.quantity,
                subtrahend: other.quantity,
            })?;
        Ok(Amount { quantity, currency: self.currency.clone() })
    }

    fn same_currency(&self, other: &Amount) -> Result<(), AmountError> {
        if self.currency != other.currency {
            return Err(AmountError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.quantity / 100,
            self.quantity % 100,
            self.currency
        )
    }
}

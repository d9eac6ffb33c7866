//! # Flow Configuration
//!
//! Loaded from YAML, then overridden from `INSURE_*` environment variables.
//! Every field has a default so an empty file (or no file) is valid.
//!
//! | Variable                         | Field                      |
//! |----------------------------------|----------------------------|
//! | `INSURE_CONTRACT_ID`             | `contract_id`              |
//! | `INSURE_DEFAULT_CURRENCY`        | `default_currency`         |
//! | `INSURE_ISSUE_WINDOW_SECS`       | `issue_window_secs`        |
//! | `INSURE_COUNTERPARTY_TIMEOUT_SECS` | `counterparty_timeout_secs` |
//! | `INSURE_ORACLE_TIMEOUT_SECS`     | `oracle_timeout_secs`      |
//! | `INSURE_ACK_TIMEOUT_SECS`        | `ack_timeout_secs`         |
//! | `INSURE_FINALITY_TIMEOUT_SECS`   | `finality_timeout_secs`    |
//! | `INSURE_CONFLICT_POLICY`         | `conflict_policy`          |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use insure_contract::{ContractConfig, DEFAULT_CONTRACT_ID};
use insure_core::Currency;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// What a second local proposal against a version already held does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Wait until the holder finishes.
    #[default]
    Serialize,
    /// Fail immediately with `ConflictingProposal`.
    Reject,
}

impl FromStr for ConflictPolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serialize" => Ok(Self::Serialize),
            "reject" => Ok(Self::Reject),
            other => Err(FlowError::Config(format!(
                "conflict policy must be 'serialize' or 'reject', got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub contract_id: String,
    pub default_currency: Currency,
    /// Issue proposals are accepted within ± this many seconds of build time.
    pub issue_window_secs: i64,
    pub counterparty_timeout_secs: u64,
    /// Bound on a single oracle submission before falling back to status polls.
    pub oracle_timeout_secs: u64,
    pub ack_timeout_secs: u64,
    /// How long a responder waits for the finality notice after signing.
    pub finality_timeout_secs: u64,
    pub conflict_policy: ConflictPolicy,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            contract_id: DEFAULT_CONTRACT_ID.to_string(),
            default_currency: Currency::cad(),
            issue_window_secs: 30,
            counterparty_timeout_secs: 30,
            oracle_timeout_secs: 10,
            ack_timeout_secs: 5,
            finality_timeout_secs: 60,
            conflict_policy: ConflictPolicy::Serialize,
        }
    }
}

impl FlowConfig {
    /// Read a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FlowError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, FlowError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| FlowError::Config(format!("parsing YAML: {e}")))
    }

    /// Override fields from `INSURE_*` environment variables that are set.
    pub fn apply_env(mut self) -> Result<Self, FlowError> {
        if let Some(v) = env("INSURE_CONTRACT_ID") {
            self.contract_id = v;
        }
        if let Some(v) = env("INSURE_DEFAULT_CURRENCY") {
            self.default_currency =
                Currency::new(v).map_err(|e| FlowError::Config(e.to_string()))?;
        }
        if let Some(v) = env("INSURE_ISSUE_WINDOW_SECS") {
            self.issue_window_secs = parse_num("INSURE_ISSUE_WINDOW_SECS", &v)?;
        }
        if let Some(v) = env("INSURE_COUNTERPARTY_TIMEOUT_SECS") {
            self.counterparty_timeout_secs = parse_num("INSURE_COUNTERPARTY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("INSURE_ORACLE_TIMEOUT_SECS") {
            self.oracle_timeout_secs = parse_num("INSURE_ORACLE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("INSURE_ACK_TIMEOUT_SECS") {
            self.ack_timeout_secs = parse_num("INSURE_ACK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("INSURE_FINALITY_TIMEOUT_SECS") {
            self.finality_timeout_secs = parse_num("INSURE_FINALITY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("INSURE_CONFLICT_POLICY") {
            self.conflict_policy = v.parse()?;
        }
        Ok(self)
    }

    pub fn contract_config(&self) -> ContractConfig {
        ContractConfig {
            contract_id: self.contract_id.clone(),
        }
    }

    pub fn counterparty_timeout(&self) -> Duration {
        Duration::from_secs(self.counterparty_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_num<T: FromStr>(name: &str, raw: &str) -> Result<T, FlowError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| FlowError::Config(format!("{name}={raw:?}: {e}")))
}

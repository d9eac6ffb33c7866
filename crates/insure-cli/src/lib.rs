//! # insure-cli — Policy Ledger Command-Line Interface
//!
//! ## Subcommands
//!
//! - `simulate` — run a client and an underwriter node in-process and walk
//!   a policy through issue, settle and a rejected second settle
//! - `validate` — run the transition validator on a JSON transition file
//! - `keygen` — generate an Ed25519 signing key
//!
//! Argument parsing lives here next to each handler; the handlers delegate
//! to the domain crates and print JSON on stdout. Logs go to stderr.

pub mod keygen;
pub mod simulate;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use insure_flow::FlowConfig;

/// Load the flow configuration from `path` (defaults when absent), then
/// apply `INSURE_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FlowConfig> {
    let base = match path {
        Some(p) => FlowConfig::load(p).with_context(|| format!("loading config {}", p.display()))?,
        None => FlowConfig::default(),
    };
    base.apply_env().context("applying INSURE_* environment overrides")
}

//! # insure-state — Policy Versions and Protocol State
//!
//! - **Policy** (`policy.rs`): the linear entity transitioned by Issue and
//!   Settle. Immutable values; each helper returns the successor version.
//!
//! - **Protocol** (`protocol.rs`): the commitment protocol state machine.
//!   The state is held in a single runtime field and every change is checked
//!   against an explicit edge table and logged, so the coordinator can
//!   publish it to observers and an aborted instance carries its reason.

pub mod policy;
pub mod protocol;

pub use policy::{Policy, PolicyError};
pub use protocol::{ProtocolError, ProtocolMachine, ProtocolState, ProtocolTransitionRecord};

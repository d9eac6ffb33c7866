//! In-process implementations of the collaborator capabilities, used by the
//! simulation binary and the tests.

mod ledger;
mod oracle;
mod transport;

pub use ledger::MemoryLedger;
pub use oracle::MemoryOracle;
pub use transport::{MemoryNetwork, MemorySession, MemoryTransport};

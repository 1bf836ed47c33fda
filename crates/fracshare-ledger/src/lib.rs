//! # fracshare-ledger
//!
//! The storage boundary of the FracShare trading core.
//!
//! Every operation that moves cash or shares runs inside one
//! [`LedgerStore::transaction`]: wallets, ownership records, order rows,
//! holds, reservations, trades and idempotency rows commit together or not
//! at all. [`MemoryLedger`] is the reference implementation used by the node
//! and the test suites.
//!
//! [`SupplyConservation`] tracks value entering and leaving from outside so
//! [`MemoryLedger::audit`] can prove trading neither created nor destroyed
//! any of it.

pub mod memory;
pub mod store;
pub mod supply_conservation;

pub use memory::{LedgerState, MemoryLedger, MemoryTxn};
pub use store::{LedgerStore, LedgerTxn, LedgerView};
pub use supply_conservation::SupplyConservation;

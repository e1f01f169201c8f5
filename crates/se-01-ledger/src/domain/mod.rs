//! # Ledger Domain
//!
//! Pure data structures and rules; no I/O.

pub mod errors;
pub mod execution;
pub mod partition_table;
pub mod txpool;

pub use errors::{LedgerError, LedgerResult};
pub use execution::{apply_transactions, state_root, tx_root, ExecutionContext, ExecutionStats};
pub use partition_table::PartitionTable;
pub use txpool::TxPool;

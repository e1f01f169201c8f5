//! # se-01-ledger
//!
//! The ledger collaborator of a shard replica.
//!
//! ## Role in System
//!
//! - **Transaction Pool**: FIFO queue of pending transactions plus the
//!   per-destination relay buffer
//! - **Partition Table**: this replica's view of which shard owns which
//!   account
//! - **Chain and State**: blocks, account balances and their roots
//!
//! ## Flow
//!
//! ```text
//! inject / relay ──→ [TxPool] ──pack──→ generate_block ──→ PBFT
//!                                                           │
//!                  [Accounts] ←──apply body── add_block ←───┘
//! ```
//!
//! Generating a block never touches account state. Every replica, the
//! proposer included, applies the body once when the block commits.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryLedger;
pub use domain::*;
pub use ports::Ledger;

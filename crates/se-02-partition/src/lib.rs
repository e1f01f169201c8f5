//! # se-02-partition
//!
//! Account-to-shard assignment by constrained label propagation (CLPA).
//!
//! ## Role in System
//!
//! The supervisor's CLPA committee feeds every injected transaction into a
//! [`ClpaState`] as an edge between sender and recipient. On each
//! repartition tick it runs [`ClpaState::partition`] and ships the
//! resulting delta to the shard primaries, which migrate the affected
//! accounts.
//!
//! ```text
//! tx stream ──add_edge──→ [Graph] ──partition()──→ modified map ──→ shards
//!                            ↑                                   │
//!                            └────────── erase_edges() ←─────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use se_02_partition::ClpaState;
//! use shared_types::ClpaParams;
//!
//! let mut clpa = ClpaState::new(&ClpaParams::default(), 4).unwrap();
//! clpa.add_edge(
//!     "0000000000000000000000000000000000000001",
//!     "0000000000000000000000000000000000000002",
//! );
//! let outcome = clpa.partition();
//! assert_eq!(outcome.cross_shard_edges, 0);
//! ```

pub mod domain;
pub mod error;

pub use domain::{ClpaState, Graph, PartitionOutcome, Vertex};
pub use error::{PartitionError, PartitionResult};

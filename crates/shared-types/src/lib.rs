//! # Shared Types Crate
//!
//! This crate contains the domain entities, the canonical codec and the
//! immutable `EmulatorConfig` used by every shard node and by the supervisor.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Transactions, blocks, account states and
//!   consensus requests are defined once here.
//! - **Canonical Encoding**: Everything that is hashed goes through
//!   [`codec::encode`], so two replicas always agree on a digest.
//! - **Explicit Configuration**: Network layout and protocol parameters live
//!   in an `EmulatorConfig` value handed to each component at construction.

pub mod codec;
pub mod config;
pub mod entities;
pub mod errors;

pub use codec::{decode, digest, encode, hash_hex};
pub use config::{
    BarrierConfig, ClpaParams, EmulatorConfig, NodeTable, StrategyKind, COLLECTOR_SHARD,
};
pub use entities::*;
pub use errors::*;

//! # Partition Domain
//!
//! Pure graph and labelling logic; no I/O.

pub mod clpa;
pub mod graph;

pub use clpa::{ClpaState, PartitionOutcome};
pub use graph::{Graph, Vertex};

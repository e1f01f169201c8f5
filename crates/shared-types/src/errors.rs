//! # Error Types
//!
//! Defines error types shared across crates.

use thiserror::Error;

/// Errors raised by the canonical codec.
///
/// Encoding a self-produced structure should never fail; callers treat
/// this as unrecoverable.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Binary serialization failed.
    #[error("Encode failed: {0}")]
    Encode(String),

    /// Binary deserialization failed.
    #[error("Decode failed: {0}")]
    Decode(String),
}

/// Errors raised while validating an `EmulatorConfig`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A shard count of zero was requested.
    #[error("Shard count must be at least 1")]
    NoShards,

    /// PBFT needs at least one replica per shard.
    #[error("Nodes per shard must be at least 1")]
    NoNodes,

    /// Node index outside `0..nodes_per_shard`.
    #[error("Unknown node {node} in shard {shard}")]
    UnknownNode { shard: u64, node: u64 },

    /// Strategy name or id not recognised.
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// CLPA weight penalty outside `[0, 1]`.
    #[error("Weight penalty {0} outside [0, 1]")]
    InvalidWeightPenalty(String),

    /// Block size cap of zero.
    #[error("Max block size must be positive")]
    ZeroBlockSize,

    /// A replica must keep at least its last committed request.
    #[error("Request retention must be positive")]
    ZeroRetention,
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;

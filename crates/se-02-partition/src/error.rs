//! Error types for the partition subsystem

use shared_types::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Too many shards: {shards} shards for {vertices} vertices")]
    TooManyShards { shards: u64, vertices: usize },

    #[error("Shard count must be positive")]
    NoShards,

    #[error("Weight penalty out of range: {0}")]
    InvalidWeightPenalty(f64),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type PartitionResult<T> = Result<T, PartitionError>;

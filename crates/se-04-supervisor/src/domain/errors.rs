//! Error types for the supervisor

use se_02_partition::PartitionError;
use shared_net::NetError;
use shared_types::{CodecError, ConfigError};

/// Supervisor error types.
///
/// A failed send to one node is logged and skipped; these variants end the
/// run.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Dataset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dataset line {line}: {reason}")]
    Dataset { line: usize, reason: String },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Broker strategy needs at least one broker account")]
    NoBrokers,

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

//! Error types for the consensus subsystem

use se_01_ledger::LedgerError;
use shared_net::NetError;
use shared_types::{CodecError, ConfigError};

/// Consensus error types.
///
/// Protocol rejections (bad digest, stale sequence, invalid block) are not
/// errors; handlers log them and return `Ok(())`. Everything here stops the
/// replica.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Barrier '{barrier}' timed out after {waited_ms} ms")]
    BarrierTimeout {
        barrier: &'static str,
        waited_ms: u64,
    },

    #[error("Sequence {seq} already holds another proposal")]
    SlotTaken { seq: u64 },

    #[error("No pending partition map for migration round {round}")]
    NoPendingPartition { round: u64 },

    #[error("Replica stopped")]
    Stopped,
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

use shared_types::{CodecError, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Parent hash mismatch: expected {expected:?}, got {actual:?}")]
    ParentMismatch { expected: Hash, actual: Hash },

    #[error("Transaction root mismatch")]
    TxRootMismatch,

    #[error("Address and state lists differ in length: {addrs} vs {states}")]
    LengthMismatch { addrs: usize, states: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

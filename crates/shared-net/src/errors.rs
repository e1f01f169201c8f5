//! # Network Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded.
    #[error("Payload codec error: {0}")]
    Codec(String),

    /// The frame is shorter than the type tag.
    #[error("Frame too short: {0} bytes")]
    Truncated(usize),

    /// The type tag is not one this node understands.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A frame larger than the configured maximum was announced.
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// No inbox is registered for this address.
    #[error("Address unreachable: {0}")]
    Unreachable(String),

    /// The transport was closed.
    #[error("Transport closed")]
    Closed,
}

impl From<serde_json::Error> for NetError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

pub type NetResult<T> = Result<T, NetError>;

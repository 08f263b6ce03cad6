//! The transport layer keeps its error surface small: addressing, framing and
//! schema validation, plus delivery failures once a peer has gone away. None of
//! these are retried; callers propagate them as fatal.

use thiserror::Error;

use crate::endpoint::Rank;

pub type TransportResult<T, E = TransportError> = Result<T, E>;

/// Errors surfaced by transport implementations and the framing helpers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Destination rank is outside `[0, process_count)`.
    #[error("rank {rank} is outside the fabric of {count} processes")]
    UnknownRank { rank: Rank, count: usize },

    /// A rank attempted to address itself.
    #[error("rank {0} cannot send to itself")]
    Loopback(Rank),

    /// The peer endpoint (or every sender to this endpoint) has been dropped.
    #[error("rank {0} is disconnected")]
    Disconnected(Rank),

    /// The local endpoint was shut down and can no longer send or receive.
    #[error("transport on rank {0} has been shut down")]
    Shutdown(Rank),

    /// The 8-byte envelope or its length prefix did not match the buffer.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// A control payload failed tag, version or bytecheck validation.
    #[error("schema error: {0}")]
    Schema(String),

    /// A fabric was requested with an unusable shape.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(&'static str),
}

impl TransportError {
    pub fn frame(msg: impl Into<String>) -> Self {
        TransportError::Frame(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        TransportError::Schema(msg.into())
    }
}

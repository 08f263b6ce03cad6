use std::time::Duration;

use thiserror::Error;
use transport::{Rank, TransportError};
use transport_codecs::CodecError;

pub type ApplicatorResult<T> = Result<T, ApplicatorError>;

/// Everything the applicator surfaces to its caller.
///
/// All variants are reported synchronously by the operation that detected
/// them. Only [`ApplicatorError::WorkerUnresponsive`] is a liveness failure;
/// the rest are correctness failures.
#[derive(Debug, Error)]
pub enum ApplicatorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding failed or a `get` did not match the paired `put`.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("an algorithm is already registered on rank {rank} ({existing})")]
    DuplicateRegistration { rank: Rank, existing: String },

    #[error("no algorithm registered on rank {0}")]
    NoAlgorithm(Rank),

    #[error("apply called without a worker acquired by next_avail_process")]
    NoAssignedWorker,

    #[error("no dispatch is outstanding")]
    NothingPending,

    #[error("no worker responded within {waited:?}")]
    WorkerUnresponsive { waited: Duration },

    #[error("worker {rank} failed: {reason}")]
    WorkerFailed { rank: Rank, reason: String },

    #[error("rank {0} is not the controller")]
    NotController(Rank),

    #[error("rank {0} is not a worker")]
    NotWorker(Rank),

    #[error("rank {rank} is not a worker of this run ({count} processes)")]
    UnknownRank { rank: Rank, count: usize },

    #[error("rank {0} is not busy")]
    NotBusy(Rank),

    #[error("unexpected {kind} frame from rank {from}")]
    UnexpectedFrame { from: Rank, kind: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}

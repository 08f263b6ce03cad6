use thiserror::Error;

use crate::value::ValueKind;

pub type CodecResult<T> = Result<T, CodecError>;

/// Failures raised while encoding or decoding a message.
///
/// `position` is the zero-based index of the value within its message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The reader requested a different type or rank than the writer produced.
    #[error("protocol mismatch at value {position}: expected {expected}, found {found}")]
    ProtocolMismatch {
        position: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The buffer ended before the value was complete.
    #[error("value {position} is truncated: needs {needed} bytes, {available} remain")]
    Truncated {
        position: usize,
        needed: usize,
        available: usize,
    },

    /// The bytes do not form a valid value (unknown type code, bad bool, bad utf-8).
    #[error("value {position} is malformed: {reason}")]
    Malformed { position: usize, reason: String },

    /// Every value of the message has already been consumed.
    #[error("message exhausted: no value at position {position}")]
    Exhausted { position: usize },

    /// An earlier failure aborted the message; no further values are decoded.
    #[error("message decoding was aborted at value {position}")]
    Poisoned { position: usize },

    /// The value exceeds what the wire layout can describe.
    #[error("value cannot be encoded: {0}")]
    Unrepresentable(String),
}

impl CodecError {
    /// Returns true for errors caused by mismatched put/get sequences.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            CodecError::ProtocolMismatch { .. } | CodecError::Exhausted { .. }
        )
    }
}

//! Error types for the OT engine.

use thiserror::Error;

/// Result type alias for OT operations.
pub type OtResult<T> = Result<T, OtError>;

/// Errors that can occur while applying, composing or transforming
/// operations, or while driving the synchronization state machine.
///
/// Everything except [`OtError::Transport`] is a logic error: the caller
/// must stop applying edits and resynchronize from the authoritative
/// document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// The input text does not have the operation's base length.
    #[error("Length mismatch: operation expects {expected} chars, text has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A retain or delete step reads past the end of the input.
    #[error("Position {position} is out of range for text of length {len}")]
    OutOfRange { position: usize, len: usize },

    /// Two operations cannot be composed or transformed together.
    #[error("Incompatible operation lengths: {left} and {right}")]
    IncompatibleLengths { left: usize, right: usize },

    /// An acknowledgment arrived while nothing was outstanding.
    #[error("No outstanding operation to acknowledge")]
    NoOutstandingOperation,

    /// A client referenced a revision the authority has not reached yet.
    #[error("Invalid revision {revision} (latest is {latest})")]
    InvalidRevision { revision: u64, latest: u64 },

    /// An acknowledgment named an operation that is not awaiting one.
    #[error("Acknowledgment for unknown operation: {0}")]
    UnknownAcknowledgment(String),

    /// The network collaborator failed to deliver an operation.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OtError {
    /// Whether the error leaves the engine in a usable state.
    ///
    /// Only network failures are recoverable; they pause dispatch and are
    /// retried through `resend` or reconnection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OtError::Transport(_))
    }
}

impl From<serde_json::Error> for OtError {
    fn from(err: serde_json::Error) -> Self {
        OtError::Serialization(err.to_string())
    }
}

/// Failures reported by a [`crate::queue::Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection to the authority.
    #[error("Disconnected from server")]
    Disconnected,

    /// The authority refused the message.
    #[error("Rejected by server: {0}")]
    Rejected(String),
}

//! Error types for the scheduling engine.

use std::path::PathBuf;

/// Top-level error type for the group-scheduling assistant.
#[derive(Debug, thiserror::Error)]
pub enum TricksterError {
    /// Malformed user input (e.g. a restart schedule with hour 24).
    #[error("validation error: {0}")]
    Validation(String),

    /// A manual proposal was requested while an identical one is still open.
    #[error("proposal for {target_date} is already open")]
    DuplicateProposal {
        /// Target date of the already open proposal.
        target_date: chrono::NaiveDate,
    },

    /// A trigger arrived for a conversation that was never started.
    #[error("unknown conversation: {0}")]
    UnknownConversation(i64),

    /// Messaging gateway call failed (network, permissions, API error).
    #[error("transport error: {0}")]
    Transport(String),

    /// A persisted record could not be read or does not match its file name.
    #[error("corrupt record {}: {reason}", path.display())]
    StorageCorruption {
        /// Offending record file.
        path: PathBuf,
        /// Why the record was rejected.
        reason: String,
    },

    /// Context persistence error (write, rename, delete).
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TricksterError {
    /// Wraps a gateway failure.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TricksterError>;

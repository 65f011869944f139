//! Engine error types

use thiserror::Error;

/// Errors surfaced by the transfer engine
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== Raised before any I/O =====
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    // ===== Per-source, recoverable (source skipped, batch continues) =====
    #[error("Resolution failed: {0}")]
    Resolution(String),

    // ===== Fail-fast (aborts the whole transfer process) =====
    #[error("Transfer I/O error: {0}")]
    TransferIo(String),

    // ===== Illegal operation on a process =====
    #[error("Invalid process state: {0}")]
    InvalidState(String),

    // ===== Cooperative cancellation =====
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Does this error abort the whole process (vs. skipping one source)?
    pub fn is_fatal_for_process(&self) -> bool {
        matches!(self, EngineError::TransferIo(_) | EngineError::Cancelled)
    }

    /// Get a user-friendly message for display in a process snapshot.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::InvalidDestination(msg) => {
                format!("Cannot paste here: {}", msg)
            }
            EngineError::Cancelled => "Operation cancelled".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<porter_fs::FsError> for EngineError {
    fn from(e: porter_fs::FsError) -> Self {
        EngineError::TransferIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

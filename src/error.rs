use thiserror::Error;

/// Errors surfaced by the synchronization core.
///
/// None of these are fatal: a failed refresh keeps the previous snapshot,
/// a failed send keeps the provisional message on screen.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The service could not be reached or answered with something unreadable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with `success: false`.
    #[error("Server error: {0}")]
    Server(String),

    /// Input rejected before any request was issued.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Please select a chat first")]
    NoActiveChat,
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

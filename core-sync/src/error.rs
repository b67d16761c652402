use bridge_traits::error::BridgeError;
use core_library::error::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Adapter error: {0}")]
    Adapter(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: BridgeError,
    },

    #[error("Sync run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("Invalid sync run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid sync phase: {0}")]
    InvalidPhase(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Library(LibraryError::Database(error))
    }
}

/// Failure classes the pipelines act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth another attempt
    Transient,
    /// This item can never succeed; skip it
    PermanentItem,
    /// A unique key collided; skip this write
    IntegrityConflict,
    /// Abort the run
    Fatal,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Adapter(e) | SyncError::Library(LibraryError::Bridge(e)) => {
                bridge_kind(e)
            }
            SyncError::Library(LibraryError::Conflict { .. }) => ErrorKind::IntegrityConflict,
            SyncError::Library(LibraryError::InvalidInput { .. })
            | SyncError::Library(LibraryError::NotFound { .. }) => ErrorKind::PermanentItem,
            SyncError::RetriesExhausted { last_error, .. } if last_error.is_fatal() => {
                ErrorKind::Fatal
            }
            SyncError::RetriesExhausted { .. } => ErrorKind::PermanentItem,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

fn bridge_kind(error: &BridgeError) -> ErrorKind {
    if error.is_fatal() {
        ErrorKind::Fatal
    } else if error.is_transient() {
        ErrorKind::Transient
    } else {
        ErrorKind::PermanentItem
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

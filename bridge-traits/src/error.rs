use thiserror::Error;

/// Errors reported by catalog adapters.
///
/// Every adapter failure must be classified into one of these variants so the
/// sync engine can decide whether to retry, skip the item, or abort the run.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The adapter (or one of its capabilities) cannot be used at all.
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    /// Connecting or authenticating against the backing service failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A retryable failure such as a timeout or throttled request.
    ///
    /// `rate_limited` marks failures that should open the library-wide lock
    /// window so that concurrent attempts back off together.
    #[error("Transient failure: {message}")]
    Transient { message: String, rate_limited: bool },

    /// The item can never be processed (unplayable, missing, malformed).
    #[error("Item unavailable: {0}")]
    ItemUnavailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            rate_limited: true,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Transient {
                rate_limited: true,
                ..
            }
        )
    }

    /// Whether the failure affects the whole adapter rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotAvailable(_) | Self::ConnectionFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

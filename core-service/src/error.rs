use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Library {0} is not registered")]
    UnknownLibrary(String),

    #[error("Library {0} is already registered")]
    DuplicateLibrary(String),

    #[error("Cannot sync library {0} into itself")]
    SameLibrary(String),

    #[error("Could not connect to {library} after {attempts} attempts: {source}")]
    ConnectFailed {
        library: String,
        attempts: u32,
        #[source]
        source: BridgeError,
    },

    #[error("Adapter error: {0}")]
    Adapter(#[from] BridgeError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

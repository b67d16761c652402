use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// A write collided with a uniqueness constraint (e.g. two playlists
    /// with the same display name).
    #[error("Integrity conflict on {entity_type}: {message}")]
    Conflict { entity_type: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    /// Classify a failed write, turning unique-key violations into
    /// [`LibraryError::Conflict`].
    pub fn from_write(entity_type: &str, error: sqlx::Error) -> Self {
        let is_conflict = error
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);

        if is_conflict {
            LibraryError::Conflict {
                entity_type: entity_type.to_string(),
                message: error.to_string(),
            }
        } else {
            LibraryError::Database(error)
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LibraryError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

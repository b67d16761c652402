//! # Repository Pattern Implementation
//!
//! This module provides repository traits and implementations for mirror data
//! access.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - Each implementation is bound to one library at construction
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - Mirrored tracks keyed by external identifier
//! - `PlaylistRepository` - Mirrored playlists with read access to membership

pub mod playlist;
pub mod track;

pub use playlist::{PlaylistRepository, PlaylistUpsert, SqlitePlaylistRepository};
pub use track::{SqliteTrackRepository, TrackRepository};

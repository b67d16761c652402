//! # Library Mirror Module
//!
//! Owns the local mirror database and provides repository patterns for
//! data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository patterns for tracks and playlists
//! - Ordered playlist membership storage
//! - The [`Mirror`] handle binding repositories to one library

pub mod db;
pub mod error;
pub mod mirror;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use mirror::Mirror;
pub use models::{Isrc, LibraryId, Playlist, PlaylistEntry, PlaylistStatus, Track, TrackDraft};

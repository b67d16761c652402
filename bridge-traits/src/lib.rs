//! # Catalog Bridge Traits
//!
//! Abstraction traits that must be implemented for each external music library.
//!
//! ## Overview
//!
//! This crate defines the contract between the core sync engine and the
//! library-specific adapters (streaming catalogs, DJ software databases, plain
//! folders). The core never talks to a backing service directly; it only sees
//! the capability set below.
//!
//! ## Traits
//!
//! - [`CatalogAdapter`](catalog::CatalogAdapter) - Listing, export, import and playlist updates
//! - [`OrphanTrackSource`](catalog::OrphanTrackSource) - Optional listing of tracks outside playlists
//!
//! ## Error Handling
//!
//! All adapters use the [`BridgeError`](error::BridgeError) type. Implementations
//! must classify failures so the core can react correctly:
//!
//! | Variant | Meaning | Core reaction |
//! |---------|---------|---------------|
//! | `Transient` | timeout, throttling | retried with backoff |
//! | `ItemUnavailable` / `OperationFailed` / `Io` | one item is broken | item skipped |
//! | `ConnectionFailed` / `NotAvailable` | adapter unusable | run aborted |
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.

pub mod catalog;
pub mod error;

pub use error::BridgeError;

pub use catalog::{CatalogAdapter, OrphanTrackSource, PlaylistUpdate, RemotePlaylist, RemoteTrack};

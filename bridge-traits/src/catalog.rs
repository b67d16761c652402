//! Catalog Adapter Abstractions
//!
//! Defines the capability set every external music library must provide so
//! that the core can mirror it locally and move tracks between libraries.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A playlist as reported by an external library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    /// Identifier assigned by the external library, stable across refreshes
    pub external_id: String,
    /// Display name
    pub name: String,
    /// Opaque value that changes whenever the playlist content changes.
    ///
    /// `None` for libraries that cannot report one; such playlists are
    /// refreshed every time.
    pub change_token: Option<String>,
}

impl RemotePlaylist {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            change_token: None,
        }
    }

    pub fn with_change_token(mut self, token: impl Into<String>) -> Self {
        self.change_token = Some(token.into());
        self
    }
}

/// A track as reported by an external library.
///
/// Fields are reported as-is; normalization (interchange code casing,
/// track/disc number ranges) happens when the track enters the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub external_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    /// Raw interchange code (ISRC), possibly hyphenated or lower-case
    pub isrc: Option<String>,
    /// Local file backing the track, when the library has one
    pub file_path: Option<PathBuf>,
    /// `false` when the library reports the track cannot be exported
    pub is_playable: bool,
}

impl RemoteTrack {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            artist: None,
            album: None,
            album_artist: None,
            track_number: None,
            disc_number: None,
            isrc: None,
            file_path: None,
            is_playable: true,
        }
    }

    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        self.isrc = Some(isrc.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }
}

/// Membership change pushed to an external library after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistUpdate {
    /// Existing remote playlist, or `None` to create one
    pub external_id: Option<String>,
    pub name: String,
    /// Desired membership, in order
    pub track_external_ids: Vec<String>,
}

/// External music library adapter
///
/// Implemented once per backing service (streaming catalog, DJ software
/// database, ...). Listings are lazy, finite, single-pass streams; callers
/// must not expect them to be restartable.
///
/// Adapters are responsible for their own internal concurrency limits and
/// for serializing access to any backing store that is not reentrant. Any
/// blocking work (tag extraction, transcoding) must be moved off the async
/// scheduler by the adapter.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::CatalogAdapter;
/// use futures::StreamExt;
///
/// async fn count_playlists(adapter: &dyn CatalogAdapter) -> Result<usize> {
///     adapter.connect().await?;
///     let mut count = 0;
///     let mut playlists = adapter.list_playlists();
///     while let Some(playlist) = playlists.next().await {
///         playlist?;
///         count += 1;
///     }
///     Ok(count)
/// }
/// ```
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Short name used in logs and events
    fn name(&self) -> &str;

    /// Open the connection or session to the backing service
    ///
    /// Failures here are fatal for any run using this adapter.
    async fn connect(&self) -> Result<()>;

    /// Release any resources held by the adapter
    async fn close(&self) -> Result<()>;

    /// Stream every playlist in the library
    fn list_playlists(&self) -> BoxStream<'_, Result<RemotePlaylist>>;

    /// Stream the tracks of one playlist, in playlist order
    fn list_playlist_tracks<'a>(
        &'a self,
        playlist: &'a RemotePlaylist,
    ) -> BoxStream<'a, Result<RemoteTrack>>;

    /// Write the track's media into `destination` and return the file path
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Transient`](crate::BridgeError::Transient) when a retry may succeed
    /// - [`BridgeError::ItemUnavailable`](crate::BridgeError::ItemUnavailable) when the
    ///   track can never be exported (e.g. unplayable)
    async fn export_track(&self, track: &RemoteTrack, destination: &Path) -> Result<PathBuf>;

    /// Add a media file to the library and return the resulting track
    ///
    /// The returned track must have its external identifier populated.
    async fn import_track(&self, path: &Path) -> Result<RemoteTrack>;

    /// Create or overwrite a playlist's membership upstream
    async fn update_playlist(&self, update: &PlaylistUpdate) -> Result<RemotePlaylist>;

    /// Optional capability for libraries that hold tracks outside of playlists
    fn orphan_tracks(&self) -> Option<&dyn OrphanTrackSource> {
        None
    }
}

/// Libraries whose tracks can exist without belonging to any playlist
pub trait OrphanTrackSource: Send + Sync {
    /// Stream every track that is not a member of any playlist
    fn list_orphan_tracks(&self) -> BoxStream<'_, Result<RemoteTrack>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};

    struct StaticCatalog {
        playlists: Vec<RemotePlaylist>,
    }

    #[async_trait]
    impl CatalogAdapter for StaticCatalog {
        fn name(&self) -> &str {
            "static"
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn list_playlists(&self) -> BoxStream<'_, Result<RemotePlaylist>> {
            stream::iter(self.playlists.iter().cloned().map(Ok)).boxed()
        }

        fn list_playlist_tracks<'a>(
            &'a self,
            _playlist: &'a RemotePlaylist,
        ) -> BoxStream<'a, Result<RemoteTrack>> {
            stream::empty().boxed()
        }

        async fn export_track(&self, track: &RemoteTrack, _destination: &Path) -> Result<PathBuf> {
            Err(crate::BridgeError::ItemUnavailable(track.external_id.clone()))
        }

        async fn import_track(&self, path: &Path) -> Result<RemoteTrack> {
            Ok(RemoteTrack::new(path.display().to_string(), "imported"))
        }

        async fn update_playlist(&self, update: &PlaylistUpdate) -> Result<RemotePlaylist> {
            Ok(RemotePlaylist::new("new", update.name.clone()))
        }
    }

    #[tokio::test]
    async fn test_default_capabilities() {
        let catalog = StaticCatalog {
            playlists: vec![
                RemotePlaylist::new("p1", "Warmup").with_change_token("v1"),
                RemotePlaylist::new("p2", "Peak"),
            ],
        };

        assert!(catalog.orphan_tracks().is_none());

        let listed: Vec<_> = catalog.list_playlists().collect().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(
            listed[0].as_ref().unwrap().change_token.as_deref(),
            Some("v1")
        );
    }

    #[test]
    fn test_remote_track_defaults() {
        let track = RemoteTrack::new("t1", "Song").with_isrc("us-abc-12-34567");
        assert!(track.is_playable);
        assert_eq!(track.isrc.as_deref(), Some("us-abc-12-34567"));
        assert!(track.file_path.is_none());
    }

    #[test]
    fn test_playlist_update_serialization() {
        let update = PlaylistUpdate {
            external_id: None,
            name: "Peak".into(),
            track_external_ids: vec!["a".into(), "b".into()],
        };
        let json = serde_json::to_string(&update).unwrap();
        let back: PlaylistUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }
}

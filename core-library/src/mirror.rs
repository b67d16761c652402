//! Per-library view over the shared mirror database

use crate::models::LibraryId;
use crate::repositories::{
    PlaylistRepository, SqlitePlaylistRepository, SqliteTrackRepository, TrackRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Local mirror of one external library.
///
/// Binds the track and playlist repositories to a single [`LibraryId`] once,
/// at construction, so every read and write through this handle stays within
/// that library's rows.
#[derive(Clone)]
pub struct Mirror {
    library: LibraryId,
    pool: SqlitePool,
    tracks: Arc<dyn TrackRepository>,
    playlists: Arc<dyn PlaylistRepository>,
}

impl Mirror {
    pub fn new(pool: SqlitePool, library: LibraryId) -> Self {
        let tracks = Arc::new(SqliteTrackRepository::new(pool.clone(), library.clone()));
        let playlists = Arc::new(SqlitePlaylistRepository::new(pool.clone(), library.clone()));

        Self {
            library,
            pool,
            tracks,
            playlists,
        }
    }

    pub fn library(&self) -> &LibraryId {
        &self.library
    }

    /// Underlying pool, used for multi-statement transactions
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tracks(&self) -> &dyn TrackRepository {
        self.tracks.as_ref()
    }

    pub fn playlists(&self) -> &dyn PlaylistRepository {
        self.playlists.as_ref()
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::catalog::RemotePlaylist;

    #[tokio::test]
    async fn test_mirrors_share_pool_but_not_rows() {
        let pool = create_test_pool().await.unwrap();
        let source = Mirror::new(pool.clone(), LibraryId::new("spotify"));
        let target = Mirror::new(pool, LibraryId::new("rekordbox"));

        source
            .playlists()
            .upsert(&RemotePlaylist::new("p1", "Peak"))
            .await
            .unwrap();
        target
            .playlists()
            .upsert(&RemotePlaylist::new("p1", "Peak"))
            .await
            .unwrap();

        assert_eq!(source.library().as_str(), "spotify");
        assert_eq!(source.playlists().count().await.unwrap(), 1);
        assert_eq!(target.playlists().count().await.unwrap(), 1);
    }
}

//! Playlist repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{LibraryId, Playlist, PlaylistEntry, PlaylistId, PlaylistStatus, Track};
use async_trait::async_trait;
use bridge_traits::catalog::RemotePlaylist;
use sqlx::{query, query_as, SqlitePool};

/// Result of [`PlaylistRepository::upsert`]
#[derive(Debug, Clone)]
pub struct PlaylistUpsert {
    pub playlist: Playlist,
    /// `true` when the row did not exist before
    pub created: bool,
}

/// Playlist repository interface for data access operations
///
/// Membership is read-only here; it is written exclusively by the playlist
/// reconciler.
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Find a playlist by its local ID
    ///
    /// # Returns
    /// - `Ok(Some(playlist))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Playlist>>;

    /// Find a playlist by the identifier its external library assigned
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Playlist>>;

    /// Find a playlist by display name
    async fn find_by_name(&self, name: &str) -> Result<Option<Playlist>>;

    /// Insert or rename a playlist keyed by external identifier
    ///
    /// New rows start with status `new` and no change token. Existing rows keep
    /// their status and change token; only the display name is updated.
    ///
    /// # Errors
    /// Returns [`LibraryError::Conflict`] if another playlist in the library
    /// already uses the display name.
    async fn upsert(&self, remote: &RemotePlaylist) -> Result<PlaylistUpsert>;

    /// Set the user-owned sync status
    async fn set_status(&self, id: &str, status: PlaylistStatus) -> Result<()>;

    /// Store (or clear) the change token of the last membership refresh
    async fn set_change_token(&self, id: &str, token: Option<&str>) -> Result<()>;

    /// List every playlist in the library, ordered by name
    async fn list(&self) -> Result<Vec<Playlist>>;

    /// List playlists with the given status, ordered by name
    async fn list_by_status(&self, status: PlaylistStatus) -> Result<Vec<Playlist>>;

    /// Delete a playlist by ID, together with its membership
    ///
    /// # Returns
    /// - `Ok(true)` if playlist was deleted
    /// - `Ok(false)` if playlist was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Tracks of a playlist in position order
    async fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Raw membership rows of a playlist in position order
    async fn get_entries(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>>;

    /// Count playlists in the library
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PlaylistRepository
#[derive(Clone)]
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
    library: LibraryId,
}

impl SqlitePlaylistRepository {
    /// Create a new SqlitePlaylistRepository bound to `library`
    pub fn new(pool: SqlitePool, library: LibraryId) -> Self {
        Self { pool, library }
    }
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Playlist>> {
        let playlist =
            query_as::<_, Playlist>("SELECT * FROM playlists WHERE library = ? AND id = ?")
                .bind(self.library.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(playlist)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE library = ? AND external_id = ?",
        )
        .bind(self.library.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Playlist>> {
        let playlist =
            query_as::<_, Playlist>("SELECT * FROM playlists WHERE library = ? AND name = ?")
                .bind(self.library.as_str())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(playlist)
    }

    async fn upsert(&self, remote: &RemotePlaylist) -> Result<PlaylistUpsert> {
        if remote.name.trim().is_empty() || remote.external_id.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "Playlist".to_string(),
                message: format!(
                    "Playlist name and external id cannot be empty (external id {:?})",
                    remote.external_id
                ),
            });
        }

        let new_id = PlaylistId::new().to_string();
        let now = chrono::Utc::now().timestamp();

        let playlist = query_as::<_, Playlist>(
            r#"
            INSERT INTO playlists (
                id, library, external_id, name, status, change_token, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT(library, external_id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&new_id)
        .bind(self.library.as_str())
        .bind(&remote.external_id)
        .bind(&remote.name)
        .bind(PlaylistStatus::New.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibraryError::from_write("Playlist", e))?;

        let created = playlist.id == new_id;
        Ok(PlaylistUpsert { playlist, created })
    }

    async fn set_status(&self, id: &str, status: PlaylistStatus) -> Result<()> {
        let result = query(
            "UPDATE playlists SET status = ?, updated_at = ? WHERE library = ? AND id = ?",
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(self.library.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Playlist".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn set_change_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        let result =
            query("UPDATE playlists SET change_token = ? WHERE library = ? AND id = ?")
                .bind(token)
                .bind(self.library.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Playlist".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Playlist>> {
        let playlists =
            query_as::<_, Playlist>("SELECT * FROM playlists WHERE library = ? ORDER BY name")
                .bind(self.library.as_str())
                .fetch_all(&self.pool)
                .await?;

        Ok(playlists)
    }

    async fn list_by_status(&self, status: PlaylistStatus) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE library = ? AND status = ? ORDER BY name",
        )
        .bind(self.library.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        // Membership rows go with the playlist (ON DELETE CASCADE)
        let result = query("DELETE FROM playlists WHERE library = ? AND id = ?")
            .bind(self.library.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>(
            r#"
            SELECT t.* FROM playlist_tracks pt
            JOIN tracks t ON t.id = pt.track_id
            WHERE pt.playlist_id = ?
            ORDER BY pt.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn get_entries(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
        let entries = query_as::<_, PlaylistEntry>(
            "SELECT * FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM playlists WHERE library = ?")
            .bind(self.library.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn setup_repo() -> SqlitePlaylistRepository {
        let pool = create_test_pool().await.unwrap();
        SqlitePlaylistRepository::new(pool, LibraryId::new("spotify"))
    }

    #[tokio::test]
    async fn test_upsert_creates_then_renames() {
        let repo = setup_repo().await;

        let first = repo.upsert(&RemotePlaylist::new("p1", "Warmup")).await.unwrap();
        assert!(first.created);
        assert_eq!(first.playlist.status, PlaylistStatus::New);
        assert!(first.playlist.change_token.is_none());

        let second = repo.upsert(&RemotePlaylist::new("p1", "Opening")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.playlist.id, first.playlist.id);
        assert_eq!(second.playlist.name, "Opening");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_status_and_token() {
        let repo = setup_repo().await;

        let id = repo
            .upsert(&RemotePlaylist::new("p1", "Warmup"))
            .await
            .unwrap()
            .playlist
            .id;
        repo.set_status(&id, PlaylistStatus::Synced).await.unwrap();
        repo.set_change_token(&id, Some("v1")).await.unwrap();

        let again = repo
            .upsert(&RemotePlaylist::new("p1", "Warmup").with_change_token("v2"))
            .await
            .unwrap();
        assert_eq!(again.playlist.status, PlaylistStatus::Synced);
        assert_eq!(again.playlist.change_token.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let repo = setup_repo().await;

        repo.upsert(&RemotePlaylist::new("p1", "Peak")).await.unwrap();
        let result = repo.upsert(&RemotePlaylist::new("p2", "Peak")).await;

        assert!(matches!(result, Err(LibraryError::Conflict { .. })));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_by_status_and_delete() {
        let repo = setup_repo().await;

        let a = repo.upsert(&RemotePlaylist::new("a", "A")).await.unwrap().playlist;
        repo.upsert(&RemotePlaylist::new("b", "B")).await.unwrap();
        repo.set_status(&a.id, PlaylistStatus::Synced).await.unwrap();

        let synced = repo.list_by_status(PlaylistStatus::Synced).await.unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].external_id, "a");

        assert!(repo.delete(&a.id).await.unwrap());
        assert!(repo.find_by_id(&a.id).await.unwrap().is_none());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status_missing_playlist() {
        let repo = setup_repo().await;
        let result = repo.set_status("missing", PlaylistStatus::Ignored).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let repo = setup_repo().await;
        let result = repo.upsert(&RemotePlaylist::new("p1", "  ")).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }
}

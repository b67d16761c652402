//! Track repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{LibraryId, Track, TrackDraft, TrackId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Track repository interface for data access operations
///
/// Every instance is bound to one library; all reads and writes are scoped to
/// that library's rows.
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its local ID
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Track>>;

    /// Find a track by the identifier its external library assigned
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Track>>;

    /// Insert or update a track keyed by external identifier
    ///
    /// If a row with the same external identifier exists, its local identity is
    /// kept and its fields are overwritten in place. A known file path is never
    /// cleared by a draft that lacks one.
    ///
    /// # Returns
    /// The local ID of the written row
    ///
    /// # Errors
    /// Returns error if:
    /// - Draft validation fails
    /// - Database error occurs
    async fn upsert(&self, draft: &TrackDraft) -> Result<String>;

    /// List every track in the library
    async fn list_all(&self) -> Result<Vec<Track>>;

    /// List tracks that are not a member of any playlist
    async fn list_orphans(&self) -> Result<Vec<Track>>;

    /// Delete a track by ID
    ///
    /// Playlist membership rows referencing the track are removed with it.
    ///
    /// # Returns
    /// - `Ok(true)` if track was deleted
    /// - `Ok(false)` if track was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Count tracks in the library
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of TrackRepository
#[derive(Clone)]
pub struct SqliteTrackRepository {
    pool: SqlitePool,
    library: LibraryId,
}

impl SqliteTrackRepository {
    /// Create a new SqliteTrackRepository bound to `library`
    pub fn new(pool: SqlitePool, library: LibraryId) -> Self {
        Self { pool, library }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Track>> {
        let track = query_as::<_, Track>("SELECT * FROM tracks WHERE library = ? AND id = ?")
            .bind(self.library.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(track)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Track>> {
        let track =
            query_as::<_, Track>("SELECT * FROM tracks WHERE library = ? AND external_id = ?")
                .bind(self.library.as_str())
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(track)
    }

    async fn upsert(&self, draft: &TrackDraft) -> Result<String> {
        draft.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "track".to_string(),
            message: msg,
        })?;

        let now = chrono::Utc::now().timestamp();
        let (id,): (String,) = query_as(
            r#"
            INSERT INTO tracks (
                id, library, external_id,
                title, artist, album, album_artist,
                track_number, disc_number, isrc,
                file_path, is_playable,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(library, external_id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                track_number = excluded.track_number,
                disc_number = excluded.disc_number,
                isrc = excluded.isrc,
                file_path = COALESCE(excluded.file_path, tracks.file_path),
                is_playable = excluded.is_playable,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(TrackId::new().to_string())
        .bind(self.library.as_str())
        .bind(&draft.external_id)
        .bind(&draft.title)
        .bind(&draft.artist)
        .bind(&draft.album)
        .bind(&draft.album_artist)
        .bind(draft.track_number)
        .bind(draft.disc_number)
        .bind(draft.isrc.as_ref().map(|isrc| isrc.as_str()))
        .bind(&draft.file_path)
        .bind(draft.is_playable)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LibraryError::from_write("Track", e))?;

        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>(
            "SELECT * FROM tracks WHERE library = ? ORDER BY created_at, external_id",
        )
        .bind(self.library.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn list_orphans(&self) -> Result<Vec<Track>> {
        let tracks = query_as::<_, Track>(
            r#"
            SELECT t.* FROM tracks t
            WHERE t.library = ?
              AND NOT EXISTS (SELECT 1 FROM playlist_tracks pt WHERE pt.track_id = t.id)
            ORDER BY t.external_id
            "#,
        )
        .bind(self.library.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM tracks WHERE library = ? AND id = ?")
            .bind(self.library.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM tracks WHERE library = ?")
            .bind(self.library.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

//! # Playlist Reconciler
//!
//! The only writer of ordered playlist membership. Every call rewrites a
//! playlist's positions inside one transaction so that, at rest, positions
//! are always `0..n` with no gaps or duplicates.
//!
//! `UNIQUE(playlist_id, position)` is checked per statement, so positions are
//! written from the highest to the lowest: a row only ever moves to a slot
//! that a previous statement has already vacated.
//!
//! The transaction is opened with `BEGIN IMMEDIATE`. It reads before it
//! writes, and a deferred transaction whose snapshot went stale under a
//! concurrent commit cannot be upgraded to a writer (`SQLITE_BUSY_SNAPSHOT`).
//! Taking the write lock up front makes it wait on the busy timeout instead.

use crate::error::{Result, SyncError};
use core_library::error::LibraryError;
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument, warn};

enum Slot<'a> {
    Existing { id: i64, position: i64 },
    New(&'a str),
}

#[derive(Clone)]
pub struct PlaylistReconciler {
    pool: SqlitePool,
}

impl PlaylistReconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Make `track_ids` the complete, ordered membership of the playlist.
    ///
    /// Returns the resulting number of entries.
    pub async fn replace(&self, playlist_id: &str, track_ids: &[String]) -> Result<usize> {
        self.insert(playlist_id, track_ids, Some(0), true).await
    }

    /// Splice `track_ids` into the playlist at `at`.
    ///
    /// `at` defaults to the end and is clamped to the current length. With
    /// `delete_existing` the current membership is dropped first.
    #[instrument(skip(self, track_ids), fields(count = track_ids.len()))]
    pub async fn insert(
        &self,
        playlist_id: &str,
        track_ids: &[String],
        at: Option<usize>,
        delete_existing: bool,
    ) -> Result<usize> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        ensure_playlist(&mut tx, playlist_id).await?;

        let existing: Vec<(i64, i64)> = if delete_existing {
            query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
                .bind(playlist_id)
                .execute(&mut *tx)
                .await?;
            Vec::new()
        } else {
            let rows = query_as(
                "SELECT id, position FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
            )
            .bind(playlist_id)
            .fetch_all(&mut *tx)
            .await?;
            compact(&mut tx, rows).await?
        };

        let at = at.unwrap_or(existing.len()).min(existing.len());

        let mut slots: Vec<Slot<'_>> = existing
            .into_iter()
            .map(|(id, position)| Slot::Existing { id, position })
            .collect();
        slots.splice(at..at, track_ids.iter().map(|id| Slot::New(id.as_str())));

        for (position, slot) in slots.iter().enumerate().rev() {
            let position = position as i64;
            match slot {
                Slot::Existing { position: old, .. } if *old == position => {}
                Slot::Existing { id, .. } => {
                    query("UPDATE playlist_tracks SET position = ? WHERE id = ?")
                        .bind(position)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| LibraryError::from_write("PlaylistEntry", e))?;
                }
                Slot::New(track_id) => {
                    query(
                        "INSERT INTO playlist_tracks (playlist_id, track_id, position) \
                         VALUES (?, ?, ?)",
                    )
                    .bind(playlist_id)
                    .bind(track_id)
                    .bind(position)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| LibraryError::from_write("PlaylistEntry", e))?;
                }
            }
        }

        tx.commit().await?;

        debug!(playlist_id, entries = slots.len(), "Playlist membership written");
        Ok(slots.len())
    }
}

async fn ensure_playlist(tx: &mut Transaction<'_, Sqlite>, playlist_id: &str) -> Result<()> {
    let found: Option<(i64,)> = query_as("SELECT 1 FROM playlists WHERE id = ?")
        .bind(playlist_id)
        .fetch_optional(&mut **tx)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(SyncError::Library(LibraryError::NotFound {
            entity_type: "Playlist".to_string(),
            id: playlist_id.to_string(),
        })),
    }
}

/// Close any gaps left in stored positions.
///
/// Rows only move down here, so ascending order never collides.
async fn compact(
    tx: &mut Transaction<'_, Sqlite>,
    rows: Vec<(i64, i64)>,
) -> Result<Vec<(i64, i64)>> {
    let mut compacted = Vec::with_capacity(rows.len());
    for (index, (id, position)) in rows.into_iter().enumerate() {
        let index = index as i64;
        if position != index {
            warn!(entry_id = id, position, index, "Repairing gap in playlist positions");
            query("UPDATE playlist_tracks SET position = ? WHERE id = ?")
                .bind(index)
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        compacted.push((id, index));
    }
    Ok(compacted)
}

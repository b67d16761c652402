//! # Sync Run Repository
//!
//! Persists the history of sync runs: one row per run, updated as the run
//! moves through its phases and finally with its summary.

use crate::{Result, SyncError, SyncPhase, SyncRun, SyncRunId, SyncSummary};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for sync run persistence
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Record a new run
    async fn insert(&self, run: &SyncRun) -> Result<()>;

    /// Overwrite phase, summary and completion fields of an existing run
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RunNotFound`] if the run was never inserted
    async fn update(&self, run: &SyncRun) -> Result<()>;

    async fn find_by_id(&self, id: &SyncRunId) -> Result<Option<SyncRun>>;

    /// Most recent runs first
    async fn list_history(&self, limit: u32) -> Result<Vec<SyncRun>>;

    /// Most recent runs in which `library` was the source or the target
    async fn list_for_library(&self, library: &str, limit: u32) -> Result<Vec<SyncRun>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncRunRepository
#[derive(Clone)]
pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync run
#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    source_library: String,
    target_library: String,
    status: String,
    tracks_considered: i64,
    tracks_exported: i64,
    tracks_imported: i64,
    tracks_skipped: i64,
    tracks_failed: i64,
    playlists_updated: i64,
    playlists_unchanged: i64,
    playlists_failed: i64,
    error_message: Option<String>,
    elapsed_ms: Option<i64>,
    started_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        let phase: SyncPhase = row.status.parse()?;

        Ok(SyncRun {
            id: SyncRunId::from_string(&row.id)?,
            source: row.source_library,
            target: row.target_library,
            phase,
            summary: SyncSummary {
                tracks_considered: row.tracks_considered as u64,
                tracks_exported: row.tracks_exported as u64,
                tracks_imported: row.tracks_imported as u64,
                tracks_skipped: row.tracks_skipped as u64,
                tracks_failed: row.tracks_failed as u64,
                playlists_updated: row.playlists_updated as u64,
                playlists_unchanged: row.playlists_unchanged as u64,
                playlists_failed: row.playlists_failed as u64,
                elapsed_ms: row.elapsed_ms.unwrap_or(0) as u64,
            },
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_RUN: &str = r#"
    SELECT id, source_library, target_library, status,
           tracks_considered, tracks_exported, tracks_imported,
           tracks_skipped, tracks_failed,
           playlists_updated, playlists_unchanged, playlists_failed,
           error_message, elapsed_ms, started_at, completed_at
    FROM sync_runs
"#;

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn insert(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, source_library, target_library, status, started_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(&run.source)
        .bind(&run.target)
        .bind(run.phase.as_str())
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, run: &SyncRun) -> Result<()> {
        let summary = &run.summary;
        let elapsed_ms = run.completed_at.map(|_| summary.elapsed_ms as i64);

        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?,
                tracks_considered = ?,
                tracks_exported = ?,
                tracks_imported = ?,
                tracks_skipped = ?,
                tracks_failed = ?,
                playlists_updated = ?,
                playlists_unchanged = ?,
                playlists_failed = ?,
                error_message = ?,
                elapsed_ms = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(run.phase.as_str())
        .bind(summary.tracks_considered as i64)
        .bind(summary.tracks_exported as i64)
        .bind(summary.tracks_imported as i64)
        .bind(summary.tracks_skipped as i64)
        .bind(summary.tracks_failed as i64)
        .bind(summary.playlists_updated as i64)
        .bind(summary.playlists_unchanged as i64)
        .bind(summary.playlists_failed as i64)
        .bind(&run.error_message)
        .bind(elapsed_ms)
        .bind(run.completed_at)
        .bind(run.id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RunNotFound {
                run_id: run.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SyncRunId) -> Result<Option<SyncRun>> {
        let row = sqlx::query_as::<_, SyncRunRow>(&format!("{} WHERE id = ?", SELECT_RUN))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(SyncRun::try_from).transpose()
    }

    async fn list_history(&self, limit: u32) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
            "{} ORDER BY started_at DESC, rowid DESC LIMIT ?",
            SELECT_RUN
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncRun::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn list_for_library(&self, library: &str, limit: u32) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
            "{} WHERE source_library = ? OR target_library = ? \
             ORDER BY started_at DESC, rowid DESC LIMIT ?",
            SELECT_RUN
        ))
        .bind(library)
        .bind(library)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncRun::try_from)
            .collect::<Result<Vec<_>>>()
    }
}

// ============================================================================
// Tests
// ============================================================================

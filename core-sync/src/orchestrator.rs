//! # Cross-Library Sync Orchestrator
//!
//! Drives one sync run from a source library into a target library:
//!
//! 1. **Delta**: tracks reachable from the source's `synced` playlists whose
//!    interchange code the target mirror does not have.
//! 2. **Export / Import**: each missing track is exported from the source and
//!    handed to the target as soon as its own export finishes. Both sides
//!    retry transient failures and honor their library's lock window.
//! 3. **Playlists**: each `synced` source playlist is matched by name in the
//!    target. When the target's ordered code list differs, the target adapter
//!    receives one update, the target mirror membership is replaced and the
//!    target's change token is cleared so the next refresh re-reads it.
//!
//! Item failures are counted and the run continues; a fatal error fails the
//! run and cancels in-flight work.

use crate::error::{ErrorKind, Result, SyncError};
use crate::fingerprint::{compute_delta, FingerprintIndex};
use crate::job::{SyncPhase, SyncRun};
use crate::reconciler::PlaylistReconciler;
use crate::repository::SyncRunRepository;
use crate::retry::{retry_with_backoff, LockWindow, RetryPolicy};
use bridge_traits::catalog::{CatalogAdapter, PlaylistUpdate};
use bridge_traits::error::BridgeError;
use core_library::models::{Isrc, Playlist, PlaylistStatus, Track, TrackDraft};
use core_library::Mirror;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::channel::mpsc;
use futures::{stream, SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One side of a sync: an adapter, its mirror and its retry state.
#[derive(Clone)]
pub struct SyncEndpoint {
    pub adapter: Arc<dyn CatalogAdapter>,
    pub mirror: Mirror,
    pub retry: RetryPolicy,
    /// Shared by every run touching this library
    pub lock: Arc<LockWindow>,
}

impl SyncEndpoint {
    pub fn library(&self) -> &str {
        self.mirror.library().as_str()
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub export_concurrency: usize,
    pub import_concurrency: usize,
    /// Each run exports into its own subdirectory of this one
    pub export_root: PathBuf,
}

impl SyncOptions {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_concurrency: 2,
            import_concurrency: 2,
            export_root: export_root.into(),
        }
    }
}

#[derive(Debug, Default)]
struct ExportTally {
    exported: u64,
    skipped: u64,
    failed: u64,
}

#[derive(Debug, Default)]
struct ImportTally {
    imported: u64,
    failed: u64,
}

pub struct SyncOrchestrator {
    runs: Arc<dyn SyncRunRepository>,
    options: SyncOptions,
    event_bus: Option<EventBus>,
}

impl SyncOrchestrator {
    pub fn new(runs: Arc<dyn SyncRunRepository>, options: SyncOptions) -> Self {
        Self {
            runs,
            options,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run a full sync from `source` into `target`.
    ///
    /// Returns the finished run, already persisted, or the fatal error that
    /// stopped it.
    #[instrument(skip_all, fields(source = source.library(), target = target.library()))]
    pub async fn sync(&self, source: &SyncEndpoint, target: &SyncEndpoint) -> Result<SyncRun> {
        let started = Instant::now();
        let mut run = SyncRun::new(source.library(), target.library());
        self.runs.insert(&run).await?;

        info!(run_id = %run.id, "Sync started");
        self.emit(SyncEvent::Started {
            run_id: run.id.to_string(),
            source: run.source.clone(),
            target: run.target.clone(),
        });

        let outcome = self.execute(&mut run, source, target).await;
        self.discard_exports(&run).await;

        match outcome {
            Ok(()) => {
                run.summary.elapsed_ms = started.elapsed().as_millis() as u64;
                run.advance(SyncPhase::Done)?;
                self.runs.update(&run).await?;

                let summary = run.summary;
                info!(
                    run_id = %run.id,
                    considered = summary.tracks_considered,
                    exported = summary.tracks_exported,
                    imported = summary.tracks_imported,
                    skipped = summary.tracks_skipped,
                    failed = summary.tracks_failed,
                    playlists_updated = summary.playlists_updated,
                    elapsed_ms = summary.elapsed_ms,
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    run_id: run.id.to_string(),
                    tracks_considered: summary.tracks_considered,
                    tracks_exported: summary.tracks_exported,
                    tracks_imported: summary.tracks_imported,
                    tracks_skipped: summary.tracks_skipped,
                    tracks_failed: summary.tracks_failed,
                    playlists_updated: summary.playlists_updated,
                    duration_ms: summary.elapsed_ms,
                });
                Ok(run)
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Sync failed");
                run.summary.elapsed_ms = started.elapsed().as_millis() as u64;
                if run.fail(e.to_string()).is_ok() {
                    if let Err(persist) = self.runs.update(&run).await {
                        warn!(run_id = %run.id, error = %persist, "Failed to record sync failure");
                    }
                }
                self.emit(SyncEvent::Failed {
                    run_id: run.id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut SyncRun,
        source: &SyncEndpoint,
        target: &SyncEndpoint,
    ) -> Result<()> {
        let source_playlists = source
            .mirror
            .playlists()
            .list_by_status(PlaylistStatus::Synced)
            .await?;

        let mut source_tracks = Vec::new();
        for playlist in &source_playlists {
            source_tracks.extend(source.mirror.playlists().get_tracks(&playlist.id).await?);
        }

        let target_index = FingerprintIndex::from_tracks(target.mirror.tracks().list_all().await?);
        let delta = compute_delta(source_tracks, &target_index);

        debug!(
            considered = delta.considered,
            missing = delta.missing.len(),
            present = delta.already_present,
            no_code = delta.skipped_no_code.len(),
            duplicates = delta.duplicates.len(),
            "Delta computed"
        );

        run.summary.tracks_considered = delta.considered as u64;
        for track in &delta.skipped_no_code {
            self.skip_track(run, track, "no interchange code");
        }
        for track in &delta.duplicates {
            debug!(external_id = %track.external_id, "Interchange code already queued by another source track");
        }

        self.enter_phase(run, SyncPhase::Exporting).await?;

        let export_dir = self.options.export_root.join(run.id.to_string());
        tokio::fs::create_dir_all(&export_dir).await?;

        let (exports, imports) = self
            .transfer(run, delta.missing, &export_dir, source, target)
            .await?;
        run.summary.tracks_exported = exports.exported;
        run.summary.tracks_skipped += exports.skipped;
        run.summary.tracks_failed += exports.failed + imports.failed;
        run.summary.tracks_imported = imports.imported;

        self.enter_phase(run, SyncPhase::ReconcilingPlaylists).await?;
        self.reconcile_playlists(run, &source_playlists, source, target)
            .await?;

        Ok(())
    }

    /// Export missing tracks and import each one as soon as it is exported.
    ///
    /// The run enters [`SyncPhase::Importing`] when the first exported track
    /// reaches the import side, or when exporting ends without producing
    /// anything. Exports may still be in flight while the run is importing.
    async fn transfer(
        &self,
        run: &mut SyncRun,
        missing: Vec<Track>,
        export_dir: &Path,
        source: &SyncEndpoint,
        target: &SyncEndpoint,
    ) -> Result<(ExportTally, ImportTally)> {
        let run_id = run.id.to_string();
        let (mut exported_tx, exported_rx) =
            mpsc::channel::<(Track, PathBuf)>(self.options.import_concurrency.max(1));

        let export = async {
            let mut tally = ExportTally::default();
            let mut outcomes = stream::iter(missing)
                .map(|track| async move {
                    let result = self.export_one(&track, export_dir, source).await;
                    (track, result)
                })
                .buffer_unordered(self.options.export_concurrency.max(1));

            while let Some((track, result)) = outcomes.next().await {
                match result {
                    Ok(path) => {
                        tally.exported += 1;
                        if exported_tx.send((track, path)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) if e.kind() == ErrorKind::PermanentItem && !is_exhausted(&e) => {
                        tally.skipped += 1;
                        self.emit(SyncEvent::TrackSkipped {
                            run_id: run_id.clone(),
                            external_id: track.external_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(external_id = %track.external_id, error = %e, "Export failed");
                        tally.failed += 1;
                        self.emit_track_failed(&run_id, &track, &e);
                    }
                }
            }
            drop(outcomes);
            exported_tx.close_channel();
            Ok::<_, SyncError>(tally)
        };

        let import = async {
            let mut pending = exported_rx.peekable();
            Pin::new(&mut pending).peek().await;
            self.enter_phase(run, SyncPhase::Importing).await?;

            let mut tally = ImportTally::default();
            let mut outcomes = pending
                .map(|(track, path)| async move {
                    let result = self.import_one(&track, &path, target).await;
                    (track, result)
                })
                .buffer_unordered(self.options.import_concurrency.max(1));

            while let Some((track, result)) = outcomes.next().await {
                match result {
                    Ok(()) => tally.imported += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(external_id = %track.external_id, error = %e, "Import failed");
                        tally.failed += 1;
                        self.emit_track_failed(&run_id, &track, &e);
                    }
                }
            }
            Ok::<_, SyncError>(tally)
        };

        futures::try_join!(export, import)
    }

    async fn export_one(
        &self,
        track: &Track,
        export_dir: &Path,
        source: &SyncEndpoint,
    ) -> Result<PathBuf> {
        if !track.is_playable {
            return Err(SyncError::Adapter(BridgeError::ItemUnavailable(format!(
                "{} is not playable",
                track.external_id
            ))));
        }

        let remote = track.to_remote();
        let remote = &remote;
        let adapter = source.adapter.as_ref();
        let path = retry_with_backoff(&source.retry, &source.lock, &track.external_id, move || {
            adapter.export_track(remote, export_dir)
        })
        .await?;

        debug!(
            external_id = %track.external_id,
            file = %core_runtime::logging::strip_path(&path.to_string_lossy()),
            "Track exported"
        );
        Ok(path)
    }

    async fn import_one(&self, track: &Track, path: &Path, target: &SyncEndpoint) -> Result<()> {
        let adapter = target.adapter.as_ref();
        let imported = retry_with_backoff(&target.retry, &target.lock, &track.external_id, move || {
            adapter.import_track(path)
        })
        .await?;

        let mut draft = TrackDraft::from_remote(&imported);
        if draft.isrc.is_none() {
            draft.isrc = track.isrc();
        }
        if draft.file_path.is_none() {
            draft.file_path = Some(path.to_string_lossy().into_owned());
        }
        target.mirror.tracks().upsert(&draft).await?;

        debug!(
            source_id = %track.external_id,
            target_id = %imported.external_id,
            "Track imported"
        );
        Ok(())
    }

    async fn reconcile_playlists(
        &self,
        run: &mut SyncRun,
        playlists: &[Playlist],
        source: &SyncEndpoint,
        target: &SyncEndpoint,
    ) -> Result<()> {
        let target_index = FingerprintIndex::from_tracks(target.mirror.tracks().list_all().await?);
        let reconciler = PlaylistReconciler::new(target.mirror.pool().clone());

        for playlist in playlists {
            match self
                .reconcile_playlist(playlist, &target_index, &reconciler, source, target)
                .await
            {
                Ok(true) => run.summary.playlists_updated += 1,
                Ok(false) => run.summary.playlists_unchanged += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(playlist = %playlist.name, error = %e, "Playlist sync failed");
                    run.summary.playlists_failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Returns `true` if the target playlist was changed.
    async fn reconcile_playlist(
        &self,
        playlist: &Playlist,
        target_index: &FingerprintIndex,
        reconciler: &PlaylistReconciler,
        source: &SyncEndpoint,
        target: &SyncEndpoint,
    ) -> Result<bool> {
        let source_tracks = source.mirror.playlists().get_tracks(&playlist.id).await?;
        let desired: Vec<&Track> = source_tracks
            .iter()
            .filter_map(|track| track.isrc())
            .filter_map(|code| target_index.lookup(&code))
            .collect();
        let desired_codes: Vec<Isrc> = desired.iter().filter_map(|track| track.isrc()).collect();

        let existing = target.mirror.playlists().find_by_name(&playlist.name).await?;
        if let Some(existing) = &existing {
            let current_codes: Vec<Isrc> = target
                .mirror
                .playlists()
                .get_tracks(&existing.id)
                .await?
                .iter()
                .filter_map(|track| track.isrc())
                .collect();

            if current_codes == desired_codes {
                debug!(playlist = %playlist.name, "Target playlist already matches");
                return Ok(false);
            }
        }

        let update = PlaylistUpdate {
            external_id: existing.as_ref().map(|p| p.external_id.clone()),
            name: playlist.name.clone(),
            track_external_ids: desired.iter().map(|t| t.external_id.clone()).collect(),
        };
        let update = &update;
        let adapter = target.adapter.as_ref();
        let remote = retry_with_backoff(&target.retry, &target.lock, &playlist.name, move || {
            adapter.update_playlist(update)
        })
        .await?;

        let local = target.mirror.playlists().upsert(&remote).await?.playlist;
        target
            .mirror
            .playlists()
            .set_status(&local.id, PlaylistStatus::Synced)
            .await?;

        let track_ids: Vec<String> = desired.iter().map(|t| t.id.clone()).collect();
        reconciler.replace(&local.id, &track_ids).await?;
        target.mirror.playlists().set_change_token(&local.id, None).await?;

        info!(playlist = %playlist.name, tracks = track_ids.len(), "Target playlist updated");
        Ok(true)
    }

    /// Drop the run's exported media once the target has taken what it needs.
    async fn discard_exports(&self, run: &SyncRun) {
        let export_dir = self.options.export_root.join(run.id.to_string());
        match tokio::fs::remove_dir_all(&export_dir).await {
            Ok(()) => debug!(run_id = %run.id, "Export directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(run_id = %run.id, error = %e, "Failed to remove export directory"),
        }
    }

    async fn enter_phase(&self, run: &mut SyncRun, phase: SyncPhase) -> Result<()> {
        run.advance(phase)?;
        self.runs.update(run).await?;
        debug!(run_id = %run.id, phase = %phase, "Sync phase changed");
        self.emit(SyncEvent::PhaseChanged {
            run_id: run.id.to_string(),
            phase: phase.to_string(),
        });
        Ok(())
    }

    fn skip_track(&self, run: &mut SyncRun, track: &Track, reason: &str) {
        debug!(external_id = %track.external_id, reason, "Track skipped");
        run.summary.tracks_skipped += 1;
        self.emit(SyncEvent::TrackSkipped {
            run_id: run.id.to_string(),
            external_id: track.external_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn emit_track_failed(&self, run_id: &str, track: &Track, error: &SyncError) {
        self.emit(SyncEvent::TrackFailed {
            run_id: run_id.to_string(),
            external_id: track.external_id.clone(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

/// Retries ran out; the track failed rather than being unexportable.
fn is_exhausted(error: &SyncError) -> bool {
    matches!(error, SyncError::RetriesExhausted { .. })
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

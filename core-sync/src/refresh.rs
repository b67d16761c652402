//! # Mirror Refresh
//!
//! Pulls one external library through its adapter and brings the local mirror
//! up to date:
//!
//! 1. Playlists and (when supported) orphan tracks are listed concurrently.
//! 2. Playlists are upserted in listing order. Those whose change token matches
//!    the stored one are skipped.
//! 3. Remaining playlists are fetched with bounded concurrency; their tracks
//!    are upserted and membership is replaced through the reconciler. The new
//!    change token is stored only after membership is written.
//! 4. Playlists missing from the listing are deleted.
//! 5. Orphan tracks are upserted, then orphan rows no longer reported are
//!    swept.

use crate::error::{Result, SyncError};
use crate::reconciler::PlaylistReconciler;
use bridge_traits::catalog::{CatalogAdapter, RemotePlaylist, RemoteTrack};
use core_library::error::LibraryError;
use core_library::models::{Playlist, TrackDraft};
use core_library::Mirror;
use core_runtime::events::{CoreEvent, EventBus, RefreshEvent};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default number of playlists fetched at once.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

/// Counters reported by one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    /// Playlists in the adapter listing
    pub playlists_seen: u64,
    /// Playlists that did not exist locally before this pass
    pub playlists_created: u64,
    /// Existing playlists whose record was refreshed
    pub playlists_updated: u64,
    /// Playlists whose change token matched; membership not fetched
    pub playlists_skipped_unchanged: u64,
    /// Playlists whose membership was fetched and written
    pub playlists_refreshed: u64,
    /// Playlists that could not be upserted or fetched
    pub playlists_failed: u64,
    /// Local playlists dropped because the adapter no longer lists them
    pub playlists_deleted: u64,
    /// Track rows written while fetching playlist membership
    pub tracks_upserted: u64,
    pub orphans_upserted: u64,
    pub orphans_deleted: u64,
    pub duration_ms: u64,
}

/// External id to local id, valid for one pass.
type IdentityCache = Mutex<HashMap<String, String>>;

/// Refreshes one library mirror from its adapter.
pub struct MirrorRefresher {
    adapter: Arc<dyn CatalogAdapter>,
    mirror: Mirror,
    reconciler: PlaylistReconciler,
    concurrency: usize,
    event_bus: Option<EventBus>,
}

impl MirrorRefresher {
    pub fn new(adapter: Arc<dyn CatalogAdapter>, mirror: Mirror) -> Self {
        let reconciler = PlaylistReconciler::new(mirror.pool().clone());
        Self {
            adapter,
            mirror,
            reconciler,
            concurrency: DEFAULT_REFRESH_CONCURRENCY,
            event_bus: None,
        }
    }

    /// Maximum playlists fetched concurrently (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run one refresh pass.
    ///
    /// Per-playlist failures are logged and counted. A fatal adapter error
    /// or a store failure aborts the pass and cancels in-flight fetches.
    #[instrument(skip(self), fields(library = %self.mirror.library()))]
    pub async fn refresh(&self) -> Result<RefreshStats> {
        let library = self.mirror.library().to_string();
        self.emit(RefreshEvent::Started {
            library: library.clone(),
        });

        match self.run().await {
            Ok(stats) => {
                info!(
                    playlists_seen = stats.playlists_seen,
                    refreshed = stats.playlists_refreshed,
                    skipped = stats.playlists_skipped_unchanged,
                    failed = stats.playlists_failed,
                    deleted = stats.playlists_deleted,
                    tracks = stats.tracks_upserted,
                    duration_ms = stats.duration_ms,
                    "Refresh completed"
                );
                self.emit(RefreshEvent::Completed {
                    library,
                    playlists_seen: stats.playlists_seen,
                    playlists_refreshed: stats.playlists_refreshed,
                    playlists_skipped: stats.playlists_skipped_unchanged,
                    playlists_deleted: stats.playlists_deleted,
                    tracks_upserted: stats.tracks_upserted,
                    duration_ms: stats.duration_ms,
                });
                Ok(stats)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                self.emit(RefreshEvent::Failed {
                    library,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<RefreshStats> {
        let started = Instant::now();
        let mut stats = RefreshStats::default();

        let playlists = self.adapter.list_playlists().try_collect::<Vec<_>>();
        let orphans = async {
            match self.adapter.orphan_tracks() {
                Some(source) => source
                    .list_orphan_tracks()
                    .try_collect::<Vec<_>>()
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let (remote_playlists, remote_orphans) = futures::try_join!(playlists, orphans)?;

        let mut seen = HashSet::new();
        let mut changed = Vec::new();

        for remote in remote_playlists {
            if !seen.insert(remote.external_id.clone()) {
                debug!(external_id = %remote.external_id, "Playlist listed twice, ignoring repeat");
                continue;
            }
            stats.playlists_seen += 1;

            let upserted = match self.mirror.playlists().upsert(&remote).await {
                Ok(upserted) => upserted,
                Err(e) if e.is_conflict() || matches!(e, LibraryError::InvalidInput { .. }) => {
                    warn!(playlist = %remote.name, error = %e, "Skipping playlist");
                    stats.playlists_failed += 1;
                    self.emit_playlist_failed(&remote.name, &e.to_string());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if upserted.created {
                stats.playlists_created += 1;
            } else {
                stats.playlists_updated += 1;
            }

            if upserted.playlist.is_unchanged(&remote) {
                debug!(playlist = %remote.name, "Change token unchanged, skipping fetch");
                stats.playlists_skipped_unchanged += 1;
            } else {
                changed.push((upserted.playlist, remote));
            }
        }

        let cache = IdentityCache::default();
        let cache = &cache;
        let mut fetches = stream::iter(changed)
            .map(|(playlist, remote)| async move {
                let result = self.refresh_playlist(&playlist, &remote, cache).await;
                (playlist, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((playlist, result)) = fetches.next().await {
            match result {
                Ok(upserted) => {
                    stats.playlists_refreshed += 1;
                    stats.tracks_upserted += upserted;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(playlist = %playlist.name, error = %e, "Playlist refresh failed");
                    stats.playlists_failed += 1;
                    self.emit_playlist_failed(&playlist.name, &e.to_string());
                }
            }
        }

        for local in self.mirror.playlists().list().await? {
            if !seen.contains(&local.external_id) {
                debug!(playlist = %local.name, "Playlist no longer listed, deleting");
                if self.mirror.playlists().delete(&local.id).await? {
                    stats.playlists_deleted += 1;
                }
            }
        }

        if let Some(orphans) = remote_orphans {
            self.refresh_orphans(orphans, cache, &mut stats).await?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Fetch one playlist's tracks and rewrite its membership.
    ///
    /// Returns the number of track rows written.
    async fn refresh_playlist(
        &self,
        playlist: &Playlist,
        remote: &RemotePlaylist,
        cache: &IdentityCache,
    ) -> Result<u64> {
        let mut tracks = self.adapter.list_playlist_tracks(remote);
        let mut track_ids = Vec::new();
        let mut upserted = 0;

        while let Some(track) = tracks.try_next().await? {
            match self.resolve_track(&track, cache).await {
                Ok((id, written)) => {
                    track_ids.push(id);
                    if written {
                        upserted += 1;
                    }
                }
                Err(SyncError::Library(LibraryError::InvalidInput { message, .. })) => {
                    warn!(playlist = %playlist.name, external_id = %track.external_id, reason = %message, "Skipping track");
                }
                Err(e) => return Err(e),
            }
        }

        self.reconciler.replace(&playlist.id, &track_ids).await?;
        self.mirror
            .playlists()
            .set_change_token(&playlist.id, remote.change_token.as_deref())
            .await?;

        debug!(playlist = %playlist.name, tracks = track_ids.len(), "Playlist membership refreshed");
        Ok(upserted)
    }

    /// Local id for `track`, writing it unless this pass already has.
    async fn resolve_track(&self, track: &RemoteTrack, cache: &IdentityCache) -> Result<(String, bool)> {
        if let Some(id) = cache.lock().await.get(&track.external_id) {
            return Ok((id.clone(), false));
        }

        let id = self
            .mirror
            .tracks()
            .upsert(&TrackDraft::from_remote(track))
            .await?;
        cache
            .lock()
            .await
            .insert(track.external_id.clone(), id.clone());
        Ok((id, true))
    }

    async fn refresh_orphans(
        &self,
        orphans: Vec<RemoteTrack>,
        cache: &IdentityCache,
        stats: &mut RefreshStats,
    ) -> Result<()> {
        let mut reported = HashSet::new();

        for track in &orphans {
            match self.resolve_track(track, cache).await {
                Ok((id, written)) => {
                    reported.insert(id);
                    if written {
                        stats.orphans_upserted += 1;
                    }
                }
                Err(SyncError::Library(LibraryError::InvalidInput { message, .. })) => {
                    warn!(external_id = %track.external_id, reason = %message, "Skipping orphan track");
                }
                Err(e) => return Err(e),
            }
        }

        for stale in self.mirror.tracks().list_orphans().await? {
            if !reported.contains(&stale.id) && self.mirror.tracks().delete(&stale.id).await? {
                stats.orphans_deleted += 1;
            }
        }

        Ok(())
    }

    fn emit(&self, event: RefreshEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Refresh(event)).ok();
        }
    }

    fn emit_playlist_failed(&self, playlist: &str, message: &str) {
        self.emit(RefreshEvent::PlaylistFailed {
            library: self.mirror.library().to_string(),
            playlist: playlist.to_string(),
            message: message.to_string(),
        });
    }
}

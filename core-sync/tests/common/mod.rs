//! In-memory catalog adapter shared by the integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogAdapter, OrphanTrackSource, PlaylistUpdate, RemotePlaylist, RemoteTrack,
};
use bridge_traits::error::{BridgeError, Result};
use core_library::db::{create_pool, create_test_pool, DatabaseConfig};
use core_library::{LibraryId, Mirror};
use core_sync::{LockWindow, RetryPolicy, SyncEndpoint};
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted failure returned by the next call for a given key
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transient,
    RateLimited,
    Unavailable,
    Fatal,
}

impl Failure {
    fn to_error(self, key: &str) -> BridgeError {
        match self {
            Failure::Transient => BridgeError::transient(format!("timeout on {}", key)),
            Failure::RateLimited => BridgeError::rate_limited(format!("429 on {}", key)),
            Failure::Unavailable => BridgeError::ItemUnavailable(format!("{} is gone", key)),
            Failure::Fatal => BridgeError::ConnectionFailed("session expired".to_string()),
        }
    }
}

#[derive(Default)]
struct State {
    playlists: Vec<(RemotePlaylist, Vec<RemoteTrack>)>,
    orphans: Option<Vec<RemoteTrack>>,
    fetches: HashMap<String, usize>,
    export_attempts: HashMap<String, usize>,
    exported: Vec<String>,
    imported: Vec<String>,
    updates: Vec<PlaylistUpdate>,
    failures: HashMap<String, VecDeque<Failure>>,
    next_playlist: usize,
}

pub struct MockCatalog {
    name: String,
    state: Mutex<State>,
}

impl MockCatalog {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
        })
    }

    pub fn set_playlist(&self, playlist: RemotePlaylist, tracks: Vec<RemoteTrack>) {
        let mut state = self.state.lock().unwrap();
        match state
            .playlists
            .iter_mut()
            .find(|(p, _)| p.external_id == playlist.external_id)
        {
            Some(entry) => *entry = (playlist, tracks),
            None => state.playlists.push((playlist, tracks)),
        }
    }

    pub fn remove_playlist(&self, external_id: &str) {
        self.state
            .lock()
            .unwrap()
            .playlists
            .retain(|(p, _)| p.external_id != external_id);
    }

    pub fn set_orphans(&self, orphans: Vec<RemoteTrack>) {
        self.state.lock().unwrap().orphans = Some(orphans);
    }

    /// Queue failures for calls keyed by track external id, file name or
    /// playlist name, or by playlist external id for track listings
    pub fn fail(&self, key: &str, failures: &[Failure]) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(key.to_string())
            .or_default()
            .extend(failures.iter().copied());
    }

    pub fn fetch_count(&self, playlist_external_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(playlist_external_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn export_attempts(&self, external_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .export_attempts
            .get(external_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn exported(&self) -> Vec<String> {
        self.state.lock().unwrap().exported.clone()
    }

    pub fn imported(&self) -> Vec<String> {
        self.state.lock().unwrap().imported.clone()
    }

    pub fn updates(&self) -> Vec<PlaylistUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    fn take_failure(&self, key: &str) -> Option<BridgeError> {
        let mut state = self.state.lock().unwrap();
        state
            .failures
            .get_mut(key)
            .and_then(|queue| queue.pop_front())
            .map(|failure| failure.to_error(key))
    }
}

#[async_trait]
impl CatalogAdapter for MockCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        match self.take_failure("connect") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn list_playlists(&self) -> BoxStream<'_, Result<RemotePlaylist>> {
        let playlists: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .playlists
            .iter()
            .map(|(p, _)| Ok(p.clone()))
            .collect();
        stream::iter(playlists).boxed()
    }

    fn list_playlist_tracks<'a>(
        &'a self,
        playlist: &'a RemotePlaylist,
    ) -> BoxStream<'a, Result<RemoteTrack>> {
        if let Some(e) = self.take_failure(&playlist.external_id) {
            return stream::iter(vec![Err(e)]).boxed();
        }

        let mut state = self.state.lock().unwrap();
        *state.fetches.entry(playlist.external_id.clone()).or_default() += 1;
        let tracks: Vec<_> = state
            .playlists
            .iter()
            .find(|(p, _)| p.external_id == playlist.external_id)
            .map(|(_, tracks)| tracks.iter().cloned().map(Ok).collect())
            .unwrap_or_default();
        stream::iter(tracks).boxed()
    }

    async fn export_track(&self, track: &RemoteTrack, destination: &Path) -> Result<PathBuf> {
        *self
            .state
            .lock()
            .unwrap()
            .export_attempts
            .entry(track.external_id.clone())
            .or_default() += 1;

        if let Some(e) = self.take_failure(&track.external_id) {
            return Err(e);
        }

        let stem = track.isrc.clone().unwrap_or_else(|| track.external_id.clone());
        let path = destination.join(format!("{}.mp3", stem));
        tokio::fs::write(&path, track.title.as_bytes()).await?;

        self.state
            .lock()
            .unwrap()
            .exported
            .push(track.external_id.clone());
        Ok(path)
    }

    async fn import_track(&self, path: &Path) -> Result<RemoteTrack> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if let Some(e) = self.take_failure(&stem) {
            return Err(e);
        }

        let title = tokio::fs::read_to_string(path).await?;
        let external_id = format!("{}-{}", self.name, stem);
        self.state.lock().unwrap().imported.push(external_id.clone());

        let mut track = RemoteTrack::new(external_id, title);
        track.file_path = Some(path.to_path_buf());
        Ok(track)
    }

    async fn update_playlist(&self, update: &PlaylistUpdate) -> Result<RemotePlaylist> {
        if let Some(e) = self.take_failure(&update.name) {
            return Err(e);
        }

        let mut state = self.state.lock().unwrap();
        state.updates.push(update.clone());
        let external_id = match &update.external_id {
            Some(id) => id.clone(),
            None => {
                state.next_playlist += 1;
                format!("{}-pl-{}", self.name, state.next_playlist)
            }
        };
        Ok(RemotePlaylist::new(external_id, update.name.clone())
            .with_change_token(format!("rev-{}", state.updates.len())))
    }

    fn orphan_tracks(&self) -> Option<&dyn OrphanTrackSource> {
        let has_orphans = self.state.lock().unwrap().orphans.is_some();
        if has_orphans {
            Some(self)
        } else {
            None
        }
    }
}

impl OrphanTrackSource for MockCatalog {
    fn list_orphan_tracks(&self) -> BoxStream<'_, Result<RemoteTrack>> {
        let orphans = self.state.lock().unwrap().orphans.clone().unwrap_or_default();
        stream::iter(orphans.into_iter().map(Ok)).boxed()
    }
}

pub async fn test_pool() -> SqlitePool {
    create_test_pool().await.unwrap()
}

/// Multi-connection WAL database in `dir`, as used in production
pub async fn file_pool(dir: &Path) -> SqlitePool {
    create_pool(DatabaseConfig::new(dir.join("mirror.db")))
        .await
        .unwrap()
}

/// Fast retry settings for tests that run on the real clock
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(20),
    }
}

pub fn endpoint(pool: &SqlitePool, catalog: &Arc<MockCatalog>, lock: Duration) -> SyncEndpoint {
    SyncEndpoint {
        adapter: catalog.clone(),
        mirror: Mirror::new(pool.clone(), LibraryId::new(catalog.name())),
        retry: fast_retry(5),
        lock: Arc::new(LockWindow::new(lock)),
    }
}

pub fn track(external_id: &str, isrc: Option<&str>) -> RemoteTrack {
    let track = RemoteTrack::new(external_id, format!("Title {}", external_id));
    match isrc {
        Some(code) => track.with_isrc(code),
        None => track,
    }
}

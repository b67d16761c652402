//! # Sync & Reconciliation Module
//!
//! Keeps library mirrors current and moves tracks and playlists between
//! libraries.
//!
//! ## Components
//!
//! - **Fingerprint Index** (`fingerprint`): interchange-code lookup and delta computation
//! - **Mirror Refresh** (`refresh`): incremental pull of one adapter into its mirror
//! - **Playlist Reconciler** (`reconciler`): the single writer of ordered membership
//! - **Retry** (`retry`): exponential backoff with jitter and per-library lock windows
//! - **Sync Run State Machine** (`job`): phases of a run with validated transitions
//! - **Repository** (`repository`): sync run history
//! - **Orchestrator** (`orchestrator`): delta, export/import and playlist reconciliation

pub mod error;
pub mod fingerprint;
pub mod job;
pub mod orchestrator;
pub mod reconciler;
pub mod refresh;
pub mod repository;
pub mod retry;

pub use error::{ErrorKind, Result, SyncError};
pub use fingerprint::{compute_delta, Delta, FingerprintIndex};
pub use job::{SyncPhase, SyncRun, SyncRunId, SyncSummary};
pub use orchestrator::{SyncEndpoint, SyncOptions, SyncOrchestrator};
pub use reconciler::PlaylistReconciler;
pub use refresh::{MirrorRefresher, RefreshStats};
pub use repository::{SqliteSyncRunRepository, SyncRunRepository};
pub use retry::{retry_with_backoff, LockWindow, RetryPolicy};

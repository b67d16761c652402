//! # Events
//!
//! Refresh and sync runs report progress on a broadcast channel. Any number of
//! front-ends can subscribe; a subscriber only sees events emitted after it
//! subscribed.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, RefreshEvent};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! let _ = bus.emit(CoreEvent::Refresh(RefreshEvent::Started {
//!     library: "spotify".to_string(),
//! }));
//! assert!(rx.try_recv().is_ok());
//! ```
//!
//! A receiver that falls more than the channel capacity behind gets
//! `RecvError::Lagged` and then resumes with the oldest retained event.
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Channel capacity used by [`EventBus::default`].
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Refresh(RefreshEvent),
    Sync(SyncEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Refresh(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        use EventSeverity::*;

        match self {
            CoreEvent::Refresh(e) => match e {
                RefreshEvent::Failed { .. } => Error,
                RefreshEvent::PlaylistFailed { .. } => Warning,
                RefreshEvent::Completed { .. } => Info,
                RefreshEvent::Started { .. } => Debug,
            },
            CoreEvent::Sync(e) => match e {
                SyncEvent::Failed { .. } => Error,
                SyncEvent::TrackFailed { .. } => Warning,
                SyncEvent::Completed { .. } => Info,
                SyncEvent::Started { .. }
                | SyncEvent::PhaseChanged { .. }
                | SyncEvent::TrackSkipped { .. } => Debug,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Progress of a mirror refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RefreshEvent {
    Started {
        library: String,
    },
    /// One playlist was left as it was; the refresh goes on.
    PlaylistFailed {
        library: String,
        playlist: String,
        message: String,
    },
    Completed {
        library: String,
        playlists_seen: u64,
        playlists_refreshed: u64,
        playlists_skipped: u64,
        playlists_deleted: u64,
        tracks_upserted: u64,
        duration_ms: u64,
    },
    Failed {
        library: String,
        message: String,
    },
}

impl RefreshEvent {
    pub fn description(&self) -> &str {
        match self {
            RefreshEvent::Started { .. } => "Refresh started",
            RefreshEvent::PlaylistFailed { .. } => "Playlist refresh failed",
            RefreshEvent::Completed { .. } => "Refresh completed",
            RefreshEvent::Failed { .. } => "Refresh failed",
        }
    }
}

/// Progress of a sync run. `run_id` is the run's UUID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        run_id: String,
        source: String,
        target: String,
    },
    PhaseChanged {
        run_id: String,
        phase: String,
    },
    /// Left out on purpose, e.g. no ISRC or not playable.
    TrackSkipped {
        run_id: String,
        external_id: String,
        reason: String,
    },
    TrackFailed {
        run_id: String,
        external_id: String,
        message: String,
    },
    Completed {
        run_id: String,
        tracks_considered: u64,
        tracks_exported: u64,
        tracks_imported: u64,
        tracks_skipped: u64,
        tracks_failed: u64,
        playlists_updated: u64,
        duration_ms: u64,
    },
    Failed {
        run_id: String,
        message: String,
    },
}

impl SyncEvent {
    pub fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PhaseChanged { .. } => "Sync phase changed",
            SyncEvent::TrackSkipped { .. } => "Track skipped",
            SyncEvent::TrackFailed { .. } => "Track transfer failed",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

/// Cloneable publishing handle; all clones feed the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` is how many events a slow receiver may fall behind.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast `event`, returning how many receivers got it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type Predicate = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that drops events not matching an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    predicate: Option<Predicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            predicate: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn wants(&self, event: &CoreEvent) -> bool {
        self.predicate.as_ref().map_or(true, |keep| keep(event))
    }

    /// Wait for the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wants(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already queued, or `None`.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.wants(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(library: &str) -> CoreEvent {
        CoreEvent::Refresh(RefreshEvent::Started {
            library: library.to_string(),
        })
    }

    fn phase(run_id: &str, phase: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::PhaseChanged {
            run_id: run_id.to_string(),
            phase: phase.to_string(),
        })
    }

    #[test]
    fn test_emit_without_receivers_is_an_error() {
        let bus = EventBus::default();
        assert!(bus.emit(started("spotify")).is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_receiver_gets_each_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(phase("run-1", "exporting")).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), phase("run-1", "exporting"));
        assert_eq!(second.recv().await.unwrap(), phase("run-1", "exporting"));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_history() {
        let bus = EventBus::new(8);
        let _early = bus.subscribe();
        bus.emit(started("spotify")).unwrap();

        let mut late = EventStream::new(bus.subscribe());
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stream_filter_skips_other_events() {
        let bus = EventBus::new(8);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Sync(_)));

        bus.emit(started("spotify")).unwrap();
        bus.emit(phase("run-1", "importing")).unwrap();
        bus.emit(started("rekordbox")).unwrap();

        assert_eq!(stream.recv().await.unwrap(), phase("run-1", "importing"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for n in 0..5 {
            bus.emit(started(&format!("library-{}", n))).unwrap();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(3)))));
        assert_eq!(stream.try_recv().unwrap().unwrap(), started("library-3"));
    }

    #[test]
    fn test_severity_and_description() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            run_id: "run-1".to_string(),
            message: "adapter unavailable".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Sync failed");

        let playlist = CoreEvent::Refresh(RefreshEvent::PlaylistFailed {
            library: "spotify".to_string(),
            playlist: "Peak".to_string(),
            message: "duplicate name".to_string(),
        });
        assert_eq!(playlist.severity(), EventSeverity::Warning);
        assert_eq!(phase("run-1", "done").severity(), EventSeverity::Debug);
        assert!(EventSeverity::Warning > EventSeverity::Info);
    }

    #[test]
    fn test_json_shape() {
        let event = CoreEvent::Sync(SyncEvent::TrackSkipped {
            run_id: "run-123".to_string(),
            external_id: "track-9".to_string(),
            reason: "no ISRC".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "TrackSkipped");
        assert_eq!(json["payload"]["external_id"], "track-9");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

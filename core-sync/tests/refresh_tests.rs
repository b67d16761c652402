//! Mirror refresh against an in-memory catalog

mod common;

use bridge_traits::catalog::RemotePlaylist;
use common::{file_pool, test_pool, track, Failure, MockCatalog};
use core_library::{LibraryId, Mirror, PlaylistStatus};
use core_runtime::events::{CoreEvent, EventBus, RefreshEvent};
use core_sync::{MirrorRefresher, SyncError};
use std::sync::Arc;

fn refresher(mirror: &Mirror, catalog: &Arc<MockCatalog>) -> MirrorRefresher {
    MirrorRefresher::new(catalog.clone(), mirror.clone()).with_concurrency(2)
}

async fn external_ids(mirror: &Mirror, playlist_external_id: &str) -> Vec<String> {
    let playlist = mirror
        .playlists()
        .find_by_external_id(playlist_external_id)
        .await
        .unwrap()
        .unwrap();
    mirror
        .playlists()
        .get_tracks(&playlist.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.external_id)
        .collect()
}

#[tokio::test]
async fn test_refresh_populates_mirror_in_order() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "Warmup").with_change_token("r1"),
        vec![
            track("t3", Some("USRC17607839")),
            track("t1", Some("GBAYE0601498")),
            track("t2", None),
        ],
    );
    catalog.set_playlist(
        RemotePlaylist::new("pl-2", "Peak").with_change_token("r1"),
        vec![track("t1", Some("GBAYE0601498")), track("t4", None)],
    );

    let stats = MirrorRefresher::new(catalog.clone(), mirror.clone())
        .with_concurrency(1)
        .refresh()
        .await
        .unwrap();

    assert_eq!(stats.playlists_seen, 2);
    assert_eq!(stats.playlists_created, 2);
    assert_eq!(stats.playlists_refreshed, 2);
    assert_eq!(stats.playlists_failed, 0);
    // t1 is shared and written once
    assert_eq!(stats.tracks_upserted, 4);
    assert_eq!(mirror.tracks().count().await.unwrap(), 4);

    assert_eq!(external_ids(&mirror, "pl-1").await, vec!["t3", "t1", "t2"]);
    assert_eq!(external_ids(&mirror, "pl-2").await, vec!["t1", "t4"]);

    let warmup = mirror.playlists().find_by_external_id("pl-1").await.unwrap().unwrap();
    assert_eq!(warmup.status, PlaylistStatus::New);
    assert_eq!(warmup.change_token.as_deref(), Some("r1"));

    let entries = mirror.playlists().get_entries(&warmup.id).await.unwrap();
    let positions: Vec<i64> = entries.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_unchanged_token_skips_fetch() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "Warmup").with_change_token("r1"),
        vec![track("t1", Some("USRC17607839"))],
    );

    refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(catalog.fetch_count("pl-1"), 1);

    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(catalog.fetch_count("pl-1"), 1);
    assert_eq!(stats.playlists_skipped_unchanged, 1);
    assert_eq!(stats.playlists_refreshed, 0);
    assert_eq!(stats.playlists_updated, 1);
    assert_eq!(external_ids(&mirror, "pl-1").await, vec!["t1"]);

    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "Warmup").with_change_token("r2"),
        vec![track("t2", None), track("t1", Some("USRC17607839"))],
    );
    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(catalog.fetch_count("pl-1"), 2);
    assert_eq!(stats.playlists_refreshed, 1);
    assert_eq!(external_ids(&mirror, "pl-1").await, vec!["t2", "t1"]);
}

#[tokio::test]
async fn test_missing_token_always_refetches() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("rekordbox"));
    let catalog = MockCatalog::new("rekordbox");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Crate"), vec![track("t1", None)]);

    refresher(&mirror, &catalog).refresh().await.unwrap();
    refresher(&mirror, &catalog).refresh().await.unwrap();

    assert_eq!(catalog.fetch_count("pl-1"), 2);
    let playlist = mirror.playlists().find_by_external_id("pl-1").await.unwrap().unwrap();
    assert!(playlist.change_token.is_none());
}

#[tokio::test]
async fn test_duplicate_name_is_counted_and_others_complete() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Dupe"), vec![track("t1", None)]);
    catalog.set_playlist(RemotePlaylist::new("pl-2", "Dupe"), vec![track("t2", None)]);
    catalog.set_playlist(RemotePlaylist::new("pl-3", "Other"), vec![track("t3", None)]);

    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let stats = refresher(&mirror, &catalog)
        .with_event_bus(bus)
        .refresh()
        .await
        .unwrap();

    assert_eq!(stats.playlists_seen, 3);
    assert_eq!(stats.playlists_failed, 1);
    assert_eq!(stats.playlists_refreshed, 2);
    assert_eq!(mirror.playlists().count().await.unwrap(), 2);
    assert_eq!(external_ids(&mirror, "pl-1").await, vec!["t1"]);
    assert_eq!(catalog.fetch_count("pl-2"), 0);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Refresh(RefreshEvent::PlaylistFailed { playlist, .. }) = event {
            assert_eq!(playlist, "Dupe");
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn test_unlisted_playlists_are_deleted() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Keep"), vec![track("t1", None)]);
    catalog.set_playlist(RemotePlaylist::new("pl-2", "Drop"), vec![track("t2", None)]);

    refresher(&mirror, &catalog).refresh().await.unwrap();
    catalog.remove_playlist("pl-2");

    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(stats.playlists_deleted, 1);
    assert!(mirror
        .playlists()
        .find_by_external_id("pl-2")
        .await
        .unwrap()
        .is_none());
    assert_eq!(mirror.playlists().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_rename_keeps_identity_and_status() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "Old Name").with_change_token("r1"),
        vec![track("t1", None)],
    );

    refresher(&mirror, &catalog).refresh().await.unwrap();
    let before = mirror.playlists().find_by_external_id("pl-1").await.unwrap().unwrap();
    mirror
        .playlists()
        .set_status(&before.id, PlaylistStatus::Synced)
        .await
        .unwrap();

    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "New Name").with_change_token("r1"),
        vec![track("t1", None)],
    );
    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();

    let after = mirror.playlists().find_by_external_id("pl-1").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.name, "New Name");
    assert_eq!(after.status, PlaylistStatus::Synced);
    assert_eq!(stats.playlists_skipped_unchanged, 1);
}

#[tokio::test]
async fn test_orphan_tracks_are_mirrored_and_swept() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("rekordbox"));
    let catalog = MockCatalog::new("rekordbox");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Crate"), vec![track("t1", None)]);
    catalog.set_orphans(vec![track("o1", None), track("o2", Some("USRC17607839"))]);

    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(stats.orphans_upserted, 2);
    assert_eq!(stats.orphans_deleted, 0);
    assert_eq!(mirror.tracks().list_orphans().await.unwrap().len(), 2);

    catalog.set_orphans(vec![track("o2", Some("USRC17607839"))]);
    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(stats.orphans_deleted, 1);

    let orphans: Vec<String> = mirror
        .tracks()
        .list_orphans()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.external_id)
        .collect();
    assert_eq!(orphans, vec!["o2"]);
    // Playlist members are never swept
    assert!(mirror.tracks().find_by_external_id("t1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_item_fetch_failure_is_counted() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(
        RemotePlaylist::new("pl-1", "Broken").with_change_token("r1"),
        vec![track("t1", None)],
    );
    catalog.set_playlist(RemotePlaylist::new("pl-2", "Fine"), vec![track("t2", None)]);
    catalog.fail("pl-1", &[Failure::Unavailable]);

    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(stats.playlists_failed, 1);
    assert_eq!(stats.playlists_refreshed, 1);

    // The token is not stored, so the next pass fetches again
    let broken = mirror.playlists().find_by_external_id("pl-1").await.unwrap().unwrap();
    assert!(broken.change_token.is_none());

    let stats = refresher(&mirror, &catalog).refresh().await.unwrap();
    assert_eq!(stats.playlists_failed, 0);
    assert_eq!(external_ids(&mirror, "pl-1").await, vec!["t1"]);
}

#[tokio::test]
async fn test_fatal_fetch_error_aborts_refresh() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Warmup"), vec![track("t1", None)]);
    catalog.fail("pl-1", &[Failure::Fatal]);

    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let result = refresher(&mirror, &catalog).with_event_bus(bus).refresh().await;

    let err = result.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, SyncError::Adapter(_)));

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, CoreEvent::Refresh(RefreshEvent::Failed { .. })) {
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_refresh_emits_started_and_completed() {
    let pool = test_pool().await;
    let mirror = Mirror::new(pool, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");
    catalog.set_playlist(RemotePlaylist::new("pl-1", "Warmup"), vec![track("t1", None)]);

    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    refresher(&mirror, &catalog)
        .with_event_bus(bus)
        .refresh()
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        CoreEvent::Refresh(RefreshEvent::Started { library }) => assert_eq!(library, "spotify"),
        other => panic!("unexpected event {:?}", other),
    }
    match events.try_recv().unwrap() {
        CoreEvent::Refresh(RefreshEvent::Completed {
            playlists_seen,
            playlists_refreshed,
            tracks_upserted,
            ..
        }) => {
            assert_eq!(playlists_seen, 1);
            assert_eq!(playlists_refreshed, 1);
            assert_eq!(tracks_upserted, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_mirrors_of_different_libraries_are_isolated() {
    let pool = test_pool().await;
    let spotify = Mirror::new(pool.clone(), LibraryId::new("spotify"));
    let rekordbox = Mirror::new(pool, LibraryId::new("rekordbox"));

    let a = MockCatalog::new("spotify");
    a.set_playlist(RemotePlaylist::new("pl-1", "Warmup"), vec![track("t1", None)]);
    let b = MockCatalog::new("rekordbox");
    b.set_playlist(RemotePlaylist::new("pl-1", "Warmup"), vec![track("t9", None)]);

    refresher(&spotify, &a).refresh().await.unwrap();
    refresher(&rekordbox, &b).refresh().await.unwrap();

    // An empty listing for one library must not touch the other
    a.remove_playlist("pl-1");
    refresher(&spotify, &a).refresh().await.unwrap();

    assert_eq!(spotify.playlists().count().await.unwrap(), 0);
    assert_eq!(external_ids(&rekordbox, "pl-1").await, vec!["t9"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_on_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = Mirror::new(file_pool(dir.path()).await, LibraryId::new("spotify"));
    let catalog = MockCatalog::new("spotify");

    let publish = |revision: &str| {
        for n in 0..40 {
            // Neighbouring playlists share most of their tracks
            let tracks = (0..40)
                .map(|k| track(&format!("t{}", (n + k) % 60), None))
                .collect();
            catalog.set_playlist(
                RemotePlaylist::new(format!("pl-{}", n), format!("Crate {}", n))
                    .with_change_token(revision),
                tracks,
            );
        }
    };

    for revision in ["r1", "r2"] {
        publish(revision);
        let stats = MirrorRefresher::new(catalog.clone(), mirror.clone())
            .with_concurrency(4)
            .refresh()
            .await
            .unwrap();

        assert_eq!(stats.playlists_refreshed, 40);
        assert_eq!(stats.playlists_failed, 0);
    }

    assert_eq!(mirror.tracks().count().await.unwrap(), 60);
    let expected: Vec<String> = (0..40).map(|k| format!("t{}", (7 + k) % 60)).collect();
    assert_eq!(external_ids(&mirror, "pl-7").await, expected);
}

use chrono::{Duration, TimeZone, Utc};
use harvestify::{
    error::PersistenceError,
    management::{SnapshotManager, SnapshotRef, Written},
    types::{Coverage, Snapshot, SnapshotTrack},
};

fn snapshot(millis: i64, user: &str) -> Snapshot {
    Snapshot {
        generated_at: Utc.timestamp_millis_opt(millis).unwrap(),
        user_id: user.to_string(),
        tracks: vec![SnapshotTrack {
            id: "t1".into(),
            name: "Track 1".into(),
            artists: "Artist a1".into(),
            album: "Album".into(),
            popularity: 40,
            genres: "indie".into(),
            duration_ms: 200_000,
            audio_features: None,
        }],
        saved_track_ids: vec!["t9".into()],
        coverage: Coverage {
            artists_requested: 1,
            artists_resolved: 1,
            features_requested: 1,
            features_resolved: 0,
            saved_tracks_complete: true,
        },
    }
}

#[tokio::test]
async fn written_snapshot_is_found_as_latest_and_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path().join("snapshots"));
    let original = snapshot(1_700_000_000_000, "user-1");

    let handle = manager.write(&original).await.unwrap();
    assert_eq!(handle.file_name(), "top_tracks_1700000000000.json");

    let latest = manager.resolve(&SnapshotRef::Latest).await.unwrap();
    assert_eq!(latest.path, handle.path);
    assert_eq!(manager.load(&latest).await.unwrap(), original);
}

#[tokio::test]
async fn latest_is_the_newest_file() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path());
    let base = Utc::now() - Duration::hours(1);

    manager.write(&snapshot(base.timestamp_millis(), "old")).await.unwrap();
    let newer = manager
        .write(&snapshot(base.timestamp_millis() + 1_000, "new"))
        .await
        .unwrap();

    let latest = manager.resolve(&SnapshotRef::Latest).await.unwrap();
    assert_eq!(latest.path, newer.path);
    assert_eq!(manager.load(&latest).await.unwrap().user_id, "new");
    assert_eq!(manager.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn named_snapshot_is_resolved_inside_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path());
    let first = manager.write(&snapshot(1_000, "first")).await.unwrap();
    manager.write(&snapshot(2_000, "second")).await.unwrap();

    let named = manager
        .resolve(&SnapshotRef::Named(first.file_name()))
        .await
        .unwrap();
    assert_eq!(manager.load(&named).await.unwrap().user_id, "first");
}

#[tokio::test]
async fn named_snapshot_cannot_escape_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path().join("snapshots"));

    let err = manager
        .resolve(&SnapshotRef::Named("../session.json".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidName(_)));

    let err = manager
        .resolve(&SnapshotRef::Named("missing.json".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Io { .. }));
}

#[tokio::test]
async fn empty_or_missing_directory_has_no_latest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path().join("never-created"));

    let err = manager.resolve(&SnapshotRef::Latest).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NoSnapshot(_)));
}

#[tokio::test]
async fn non_snapshot_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    std::fs::create_dir(dir.path().join("nested.json")).unwrap();
    let manager = SnapshotManager::new(dir.path());

    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn stray_json_files_are_never_latest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path());
    let written = manager.write(&snapshot(1_000, "user-1")).await.unwrap();
    // written after the snapshot, so it would win on mtime
    std::fs::write(dir.path().join("settings.json"), "{}").unwrap();

    let latest = manager.resolve(&SnapshotRef::Latest).await.unwrap();
    assert_eq!(latest.path, written.path);
    assert_eq!(manager.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unwritable_directory_falls_back_to_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("snapshots");
    std::fs::write(&blocked, "not a directory").unwrap();
    let manager = SnapshotManager::new(&blocked);
    let recovery = SnapshotManager::new(dir.path().join("recovered"));
    let original = snapshot(1_000, "user-1");

    let written = manager.write_or_recover(&original, &recovery).await.unwrap();

    let Written::Recovered { handle, error } = written else {
        panic!("expected the recovery directory to be used");
    };
    assert!(matches!(error, PersistenceError::Io { .. }));
    assert!(handle.path.starts_with(dir.path().join("recovered")));
    assert_eq!(recovery.load(&handle).await.unwrap(), original);
}

#[tokio::test]
async fn recovery_is_not_used_when_the_directory_works() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SnapshotManager::new(dir.path().join("snapshots"));
    let recovery = SnapshotManager::new(dir.path().join("recovered"));

    let written = manager
        .write_or_recover(&snapshot(1_000, "user-1"), &recovery)
        .await
        .unwrap();

    assert!(matches!(written, Written::Primary(_)));
    assert!(!dir.path().join("recovered").exists());
}

#[tokio::test]
async fn both_directories_failing_reports_the_primary_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("snapshots");
    let also_blocked = dir.path().join("recovered");
    std::fs::write(&blocked, "").unwrap();
    std::fs::write(&also_blocked, "").unwrap();

    let err = SnapshotManager::new(&blocked)
        .write_or_recover(&snapshot(1_000, "user-1"), &SnapshotManager::new(&also_blocked))
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::Io { path, .. } if path == blocked));
}

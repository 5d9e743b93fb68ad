use chrono::{DateTime, Duration, TimeZone, Utc};
use slot_watcher::config::DatabaseConfig;
use slot_watcher::models::{AvailabilityResult, DaySlots};
use slot_watcher::storage::{SnapshotStore, SqliteSnapshotStore};
use slot_watcher::trigger::ChangeDetector;

use super::navigator_tests::target;
use super::*;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_772_600_000_000).unwrap() + Duration::seconds(seconds)
}

fn database(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}/nested/snapshots.db", dir.path().display()),
        max_connections: 2,
    }
}

fn open(slots: u32) -> AvailabilityResult {
    AvailabilityResult::from_days(vec![DaySlots {
        date: "March 4, 2026".to_string(),
        times: (0..slots).map(|i| format!("{}:00 AM", 8 + i)).collect(),
    }])
}

#[tokio::test]
async fn test_sqlite_store_creates_database_and_survives_reconnect() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = database(&dir);

    {
        let store = SqliteSnapshotStore::connect(&config).await?;
        assert!(store.put_snapshot("id_card", "Cary", true, 3, at(0)).await?);
        store.pool().close().await;
    }
    assert!(dir.path().join("nested/snapshots.db").exists());

    let store = SqliteSnapshotStore::connect(&config).await?;
    let snapshot = store.get_snapshot("id_card", "Cary").await?.expect("row persisted");
    assert!(snapshot.has_slots);
    assert_eq!(snapshot.slots_count, 3);
    assert_eq!(snapshot.last_checked, at(0));
    assert_eq!(snapshot.opened_at, Some(at(0)));
    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_never_moves_last_checked_backwards() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SqliteSnapshotStore::connect(&database(&dir)).await?;

    assert!(store.put_snapshot("fees", "Wilson", false, 0, at(10)).await?);
    assert!(!store.put_snapshot("fees", "Wilson", true, 5, at(5)).await?);
    assert!(store.put_snapshot("fees", "Wilson", false, 0, at(10)).await?);

    let snapshot = store.get_snapshot("fees", "Wilson").await?.unwrap();
    assert!(!snapshot.has_slots);
    assert_eq!(snapshot.last_checked, at(10));
    assert_eq!(snapshot.opened_at, None);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_tracks_when_availability_opened() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SqliteSnapshotStore::connect(&database(&dir)).await?;

    store.put_snapshot("permits", "Boone", true, 2, at(0)).await?;
    store.put_snapshot("permits", "Boone", true, 1, at(30)).await?;
    assert_eq!(store.get_snapshot("permits", "Boone").await?.unwrap().opened_at, Some(at(0)));

    store.put_snapshot("permits", "Boone", false, 0, at(60)).await?;
    store.put_snapshot("permits", "Boone", true, 4, at(90)).await?;
    let snapshot = store.get_snapshot("permits", "Boone").await?.unwrap();
    assert_eq!(snapshot.opened_at, Some(at(90)));
    assert_eq!(snapshot.slots_count, 4);

    store.put_snapshot("id_card", "Boone", false, 0, at(90)).await?;
    let keys: Vec<_> = store.list_snapshots().await?.iter().map(|s| s.key()).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&("id_card".to_string(), "Boone".to_string())));
    Ok(())
}

#[tokio::test]
async fn test_detector_over_sqlite_follows_edges() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteSnapshotStore::connect(&database(&dir)).await?);
    let detector = ChangeDetector::new(store.clone());
    let cary = target("id_card", "Cary");

    let observations = [open(0), open(2), open(3), open(0), open(1)];
    let mut fired = Vec::new();
    for (i, fresh) in observations.iter().enumerate() {
        if detector.process(&cary, fresh, at(i as i64 * 10)).await?.is_some() {
            fired.push(i);
        }
    }

    assert_eq!(fired, vec![1, 4]);
    let snapshot = store.get_snapshot("id_card", "Cary").await?.unwrap();
    assert_eq!(snapshot.slots_count, 1);
    assert_eq!(snapshot.last_checked, at(40));

    // A straggler from before the last write changes nothing
    assert!(detector.process(&cary, &open(0), at(35)).await?.is_none());
    assert!(store.get_snapshot("id_card", "Cary").await?.unwrap().has_slots);
    Ok(())
}

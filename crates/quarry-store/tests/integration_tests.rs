//! Integration tests for quarry-store
//!
//! These tests exercise the state store through its public trait on real
//! database files.

use quarry_domain::traits::StateStore;
use quarry_domain::{EventKind, ItemId, SnapshotUpdate, Status};
use quarry_store::{migrations, SqliteStateStore};
use std::sync::Arc;
use std::thread;

fn id(n: usize) -> ItemId {
    ItemId::parse(&format!("10.5555/item-{}", n)).unwrap()
}

#[test]
fn test_store_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStateStore::open(dir.path().join("tracker.db"));
    assert!(store.is_ok(), "Store should initialize successfully");
    assert_eq!(store.unwrap().schema_version().unwrap(), migrations::SCHEMA_VERSION);
}

#[test]
fn test_bulk_upsert_thousand_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStateStore::open(dir.path().join("tracker.db")).unwrap();

    let updates: Vec<SnapshotUpdate> = (0..1000)
        .map(|n| {
            SnapshotUpdate::new(id(n))
                .downloaded(Status::Success)
                .has_content(if n % 2 == 0 { Status::Success } else { Status::Unknown })
        })
        .collect();

    assert_eq!(store.bulk_upsert(&updates).unwrap(), 1000);

    for n in 0..1000 {
        let snap = store.get(&id(n)).unwrap().expect("item should exist");
        assert_eq!(snap.downloaded, Status::Success);
        assert_eq!(snap.has_content.is_success(), n % 2 == 0);
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.items, 1000);
    assert_eq!(stats.with_content, 500);
}

#[test]
fn test_concurrent_disjoint_writers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStateStore::open(dir.path().join("tracker.db")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let base = worker * 100;
                let bulk: Vec<SnapshotUpdate> = (base..base + 50)
                    .map(|n| SnapshotUpdate::new(id(n)).engine("grobid", Status::Success))
                    .collect();
                store.bulk_upsert(&bulk).unwrap();
                for n in base + 50..base + 100 {
                    store.mark_source_outcome(&id(n), "arxiv", true).unwrap();
                    store.increment_retry(&id(n)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.list_ids().unwrap().len(), 400);
    for worker in 0..4 {
        let base = worker * 100;
        let bulk = store.get(&id(base)).unwrap().unwrap();
        assert_eq!(bulk.engine_status("grobid"), Status::Success);
        let single = store.get(&id(base + 75)).unwrap().unwrap();
        assert_eq!(single.download_source.as_deref(), Some("arxiv"));
        assert_eq!(single.retry_count, 1);
    }
}

#[test]
fn test_concurrent_retries_on_one_item() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStateStore::open(dir.path().join("tracker.db")).unwrap());
    let item = id(1);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let item = item.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    store.increment_retry(&item).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.get(&item).unwrap().unwrap().retry_count, 80);
}

#[test]
fn test_event_history_order() {
    let store = SqliteStateStore::in_memory().unwrap();
    let item = id(7);

    store.ensure(&item).unwrap();
    store.mark_source_attempted(&item, "unpaywall").unwrap();
    store.mark_source_outcome(&item, "unpaywall", false).unwrap();
    store.mark_source_attempted(&item, "arxiv").unwrap();
    store.mark_source_outcome(&item, "arxiv", true).unwrap();
    store.mark_extraction_outcome(&item, "grobid", true).unwrap();

    let kinds: Vec<EventKind> = store.events(&item).unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Created,
            EventKind::SourceAttempted,
            EventKind::SourceOutcome,
            EventKind::SourceAttempted,
            EventKind::SourceOutcome,
            EventKind::ExtractionOutcome,
        ]
    );

    let last = store.events(&item).unwrap().pop().unwrap();
    assert_eq!(last.status_to.as_deref(), Some("success"));
    assert_eq!(last.message.as_deref(), Some("grobid"));
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.db");
    let item = id(3);

    {
        let store = SqliteStateStore::open(&path).unwrap();
        store.mark_source_outcome(&item, "biorxiv", true).unwrap();
        store.record_error(&item, "extraction timed out").unwrap();
    }

    let store = SqliteStateStore::open(&path).unwrap();
    let snap = store.get(&item).unwrap().unwrap();
    assert_eq!(snap.download_source.as_deref(), Some("biorxiv"));
    assert_eq!(snap.last_error.as_deref(), Some("extraction timed out"));
}

#[test]
fn test_v1_file_upgraded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.db");

    {
        let mut conn = rusqlite::Connection::open(&path).unwrap();
        migrations::migrate_to(&mut conn, 1).unwrap();
        conn.execute(
            "INSERT INTO items (id, downloaded, last_updated) VALUES ('10.1/old', 'yes', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    let store = SqliteStateStore::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), migrations::SCHEMA_VERSION);

    // legacy spelling is read back as success
    let snap = store.get(&ItemId::parse("10.1/old").unwrap()).unwrap().unwrap();
    assert_eq!(snap.downloaded, Status::Success);
}

#[test]
fn test_reset_clears_and_logs() {
    let store = SqliteStateStore::in_memory().unwrap();
    let item = id(9);

    store.mark_extraction_outcome(&item, "fast", false).unwrap();
    store.increment_retry(&item).unwrap();
    store.reset(&item).unwrap();

    let snap = store.get(&item).unwrap().unwrap();
    assert_eq!(snap.retry_count, 0);
    assert_eq!(snap.engine_status("fast"), Status::Unknown);
    assert_eq!(snap.phase(), "pending");

    // reset on a never-seen item still creates and logs it
    let fresh = id(10);
    store.reset(&fresh).unwrap();
    let kinds: Vec<EventKind> = store.events(&fresh).unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::Reset]);
}

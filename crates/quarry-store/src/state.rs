//! SQLite-backed state store

use crate::{migrations, StoreError};
use chrono::{DateTime, Utc};
use quarry_domain::traits::{StateStore, StoreStats};
use quarry_domain::{
    EngineState, Event, EventKind, ItemId, Snapshot, SnapshotUpdate, SourceState, Status,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a writer waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite implementation of [`StateStore`]
///
/// # Thread Safety
///
/// The connection sits behind a mutex, so one instance can be shared
/// (`Arc<SqliteStateStore>`) by every worker. Each mutation holds the lock
/// for exactly one transaction, which serializes writers per process and
/// keeps read-modify-write updates (retry increments) race-free.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) a store file and bring its schema up to date
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quarry_store::SqliteStateStore;
    ///
    /// let store = SqliteStateStore::open("tracker.db").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %journal, "opened state store");
        Self::from_connection(conn)
    }

    /// Private in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Schema version of the underlying database
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        migrations::current_version(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("state store lock poisoned".to_string()))
    }

    /// Run `f` inside one transaction; nothing is applied if it fails
    fn write<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>, DateTime<Utc>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx, Utc::now())?;
        tx.commit()?;
        Ok(value)
    }
}

fn parse_status(value: String, column: usize) -> rusqlite::Result<Status> {
    Status::parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown status {:?}", value).into(),
        )
    })
}

fn parse_item_id(value: String, column: usize) -> rusqlite::Result<ItemId> {
    ItemId::parse(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, e.into())
    })
}

fn load_snapshot(conn: &Connection, id: &ItemId) -> Result<Option<Snapshot>, StoreError> {
    let snapshot = conn
        .query_row(
            "SELECT downloaded, download_date, download_source, has_content,
                    retry_count, last_error, last_updated
             FROM items WHERE id = ?1",
            params![id.as_str()],
            |row| {
                let mut snapshot = Snapshot::new(id.clone(), row.get(6)?);
                snapshot.downloaded = parse_status(row.get(0)?, 0)?;
                snapshot.download_date = row.get(1)?;
                snapshot.download_source = row.get(2)?;
                snapshot.has_content = parse_status(row.get(3)?, 3)?;
                snapshot.retry_count = row.get(4)?;
                snapshot.last_error = row.get(5)?;
                Ok(snapshot)
            },
        )
        .optional()?;

    let Some(mut snapshot) = snapshot else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached(
        "SELECT source, attempted, outcome FROM item_sources WHERE item_id = ?1",
    )?;
    let sources = stmt
        .query_map(params![id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                SourceState {
                    attempted: row.get(1)?,
                    outcome: parse_status(row.get(2)?, 2)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    snapshot.sources.extend(sources);

    let mut stmt = conn.prepare_cached(
        "SELECT engine, status, updated_at FROM item_engines WHERE item_id = ?1",
    )?;
    let engines = stmt
        .query_map(params![id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                EngineState {
                    status: parse_status(row.get(1)?, 1)?,
                    updated_at: row.get(2)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    snapshot.engines.extend(engines);

    Ok(Some(snapshot))
}

/// Insert the default row if absent; returns whether a row was created
fn insert_default(tx: &Transaction<'_>, id: &ItemId, now: DateTime<Utc>) -> Result<bool, StoreError> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO items (id, last_updated) VALUES (?1, ?2)",
        params![id.as_str(), now],
    )?;
    if inserted == 1 {
        append_event(tx, id, EventKind::Created, None, Some("pending"), None, now)?;
    }
    Ok(inserted == 1)
}

fn append_event(
    tx: &Transaction<'_>,
    id: &ItemId,
    kind: EventKind,
    from: Option<&str>,
    to: Option<&str>,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO events (item_id, event_type, status_from, status_to, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id.as_str(), kind.as_str(), from, to, message, now],
    )?;
    Ok(())
}

/// Read-modify-write one update; returns the snapshot before and after
fn apply_update(
    tx: &Transaction<'_>,
    update: &SnapshotUpdate,
    now: DateTime<Utc>,
) -> Result<(Option<Snapshot>, Snapshot), StoreError> {
    let id = &update.id;
    let before = load_snapshot(tx, id)?;
    if before.is_none() {
        insert_default(tx, id, now)?;
    }

    let mut after = before
        .clone()
        .unwrap_or_else(|| Snapshot::new(id.clone(), now));
    update.apply_to(&mut after, now);

    tx.execute(
        "UPDATE items SET downloaded = ?2, download_date = ?3, download_source = ?4,
                has_content = ?5, retry_count = ?6, last_error = ?7, last_updated = ?8
         WHERE id = ?1",
        params![
            id.as_str(),
            after.downloaded.as_str(),
            after.download_date,
            after.download_source,
            after.has_content.as_str(),
            after.retry_count,
            after.last_error,
            after.last_updated,
        ],
    )?;

    for name in update.sources.keys() {
        let state = after.source(name);
        tx.execute(
            "INSERT INTO item_sources (item_id, source, attempted, outcome)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_id, source) DO UPDATE SET
             attempted = excluded.attempted, outcome = excluded.outcome",
            params![id.as_str(), name, state.attempted, state.outcome.as_str()],
        )?;
    }

    for name in update.engines.keys() {
        let state = after.engines.get(name).cloned().unwrap_or_default();
        tx.execute(
            "INSERT INTO item_engines (item_id, engine, status, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_id, engine) DO UPDATE SET
             status = excluded.status, updated_at = excluded.updated_at",
            params![id.as_str(), name, state.status.as_str(), state.updated_at],
        )?;
    }

    Ok((before, after))
}

/// Short human-readable summary of what an update writes
fn describe(update: &SnapshotUpdate) -> String {
    let mut parts = Vec::new();
    for (name, patch) in &update.sources {
        match (patch.attempted, patch.outcome) {
            (_, Some(outcome)) => parts.push(format!("source {}={}", name, outcome)),
            (Some(attempted), None) => parts.push(format!("source {} attempted={}", name, attempted)),
            (None, None) => {}
        }
    }
    for (name, status) in &update.engines {
        parts.push(format!("engine {}={}", name, status));
    }
    if let Some(downloaded) = update.downloaded {
        parts.push(format!("downloaded={}", downloaded));
    }
    if let Some(has_content) = update.has_content {
        parts.push(format!("has_content={}", has_content));
    }
    if let Some(count) = update.retry_count {
        parts.push(format!("retry>={}", count));
    }
    if let Some(Some(error)) = &update.last_error {
        parts.push(format!("error={}", error));
    }
    parts.join(", ")
}

fn phase_of(snapshot: Option<&Snapshot>) -> &'static str {
    snapshot.map(Snapshot::phase).unwrap_or("new")
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(2)?;
    Ok(Event {
        id: row.get(0)?,
        item_id: parse_item_id(row.get(1)?, 1)?,
        kind: EventKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown event type {:?}", kind).into(),
            )
        })?,
        status_from: row.get(3)?,
        status_to: row.get(4)?,
        message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl StateStore for SqliteStateStore {
    type Error = StoreError;

    fn get(&self, id: &ItemId) -> Result<Option<Snapshot>, Self::Error> {
        let conn = self.lock()?;
        load_snapshot(&conn, id)
    }

    fn ensure(&self, id: &ItemId) -> Result<bool, Self::Error> {
        self.write(|tx, now| insert_default(tx, id, now))
    }

    fn upsert(&self, update: &SnapshotUpdate) -> Result<(), Self::Error> {
        self.write(|tx, now| {
            let (before, after) = apply_update(tx, update, now)?;
            append_event(
                tx,
                &update.id,
                EventKind::Upsert,
                Some(phase_of(before.as_ref())),
                Some(after.phase()),
                Some(&describe(update)),
                now,
            )
        })
    }

    fn bulk_upsert(&self, updates: &[SnapshotUpdate]) -> Result<usize, Self::Error> {
        self.write(|tx, now| {
            for update in updates {
                let (before, after) = apply_update(tx, update, now)?;
                append_event(
                    tx,
                    &update.id,
                    EventKind::BulkUpdate,
                    Some(phase_of(before.as_ref())),
                    Some(after.phase()),
                    Some(&describe(update)),
                    now,
                )?;
            }
            Ok(updates.len())
        })
    }

    fn mark_source_attempted(&self, id: &ItemId, source: &str) -> Result<(), Self::Error> {
        let update = SnapshotUpdate::new(id.clone())
            .source_attempted(source, true)
            .source_outcome(source, Status::Unknown);
        self.write(|tx, now| {
            let (before, _) = apply_update(tx, &update, now)?;
            let prior = before.map(|s| s.source(source).outcome).unwrap_or_default();
            append_event(
                tx,
                id,
                EventKind::SourceAttempted,
                Some(prior.as_str()),
                Some("attempted"),
                Some(source),
                now,
            )
        })
    }

    fn mark_source_outcome(&self, id: &ItemId, source: &str, success: bool) -> Result<(), Self::Error> {
        let outcome = Status::from_outcome(success);
        let mut update = SnapshotUpdate::new(id.clone()).source_outcome(source, outcome);
        if success {
            update = update
                .downloaded(Status::Success)
                .download_source(Some(source.to_string()));
        }
        self.write(|tx, now| {
            let (before, _) = apply_update(tx, &update, now)?;
            let prior = before.map(|s| s.source(source).outcome).unwrap_or_default();
            append_event(
                tx,
                id,
                EventKind::SourceOutcome,
                Some(prior.as_str()),
                Some(outcome.as_str()),
                Some(source),
                now,
            )
        })
    }

    fn mark_extraction_outcome(&self, id: &ItemId, engine: &str, success: bool) -> Result<(), Self::Error> {
        let status = Status::from_outcome(success);
        let mut update = SnapshotUpdate::new(id.clone()).engine(engine, status);
        if success {
            update = update.has_content(Status::Success);
        }
        self.write(|tx, now| {
            let (before, _) = apply_update(tx, &update, now)?;
            let prior = before.map(|s| s.engine_status(engine)).unwrap_or_default();
            append_event(
                tx,
                id,
                EventKind::ExtractionOutcome,
                Some(prior.as_str()),
                Some(status.as_str()),
                Some(engine),
                now,
            )
        })
    }

    fn record_error(&self, id: &ItemId, message: &str) -> Result<(), Self::Error> {
        let update = SnapshotUpdate::new(id.clone()).last_error(Some(message.to_string()));
        self.write(|tx, now| {
            let (before, after) = apply_update(tx, &update, now)?;
            append_event(
                tx,
                id,
                EventKind::Error,
                Some(phase_of(before.as_ref())),
                Some(after.phase()),
                Some(message),
                now,
            )
        })
    }

    fn increment_retry(&self, id: &ItemId) -> Result<u32, Self::Error> {
        self.write(|tx, now| {
            insert_default(tx, id, now)?;
            let previous: u32 = tx.query_row(
                "SELECT retry_count FROM items WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;
            let next = previous.saturating_add(1);
            tx.execute(
                "UPDATE items SET retry_count = ?2, last_updated = ?3 WHERE id = ?1",
                params![id.as_str(), next, now],
            )?;
            append_event(
                tx,
                id,
                EventKind::Retry,
                Some(&previous.to_string()),
                Some(&next.to_string()),
                None,
                now,
            )?;
            Ok(next)
        })
    }

    fn reset(&self, id: &ItemId) -> Result<(), Self::Error> {
        self.write(|tx, now| {
            let before = load_snapshot(tx, id)?;
            if before.is_none() {
                insert_default(tx, id, now)?;
            }
            tx.execute("DELETE FROM item_sources WHERE item_id = ?1", params![id.as_str()])?;
            tx.execute("DELETE FROM item_engines WHERE item_id = ?1", params![id.as_str()])?;
            tx.execute(
                "UPDATE items SET downloaded = 'unknown', download_date = NULL,
                        download_source = NULL, has_content = 'unknown', retry_count = 0,
                        last_error = NULL, last_updated = ?2
                 WHERE id = ?1",
                params![id.as_str(), now],
            )?;
            append_event(
                tx,
                id,
                EventKind::Reset,
                Some(phase_of(before.as_ref())),
                Some("pending"),
                Some("operator reset"),
                now,
            )
        })
    }

    fn list_ids(&self) -> Result<Vec<ItemId>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM items ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| parse_item_id(row.get(0)?, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn events(&self, id: &ItemId) -> Result<Vec<Event>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, item_id, event_type, status_from, status_to, message, created_at
             FROM events WHERE item_id = ?1 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![id.as_str()], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn stats(&self) -> Result<StoreStats, Self::Error> {
        let conn = self.lock()?;
        let (items, downloaded, with_content, retried) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(downloaded = 'success'), 0),
                    COALESCE(SUM(has_content = 'success'), 0),
                    COALESCE(SUM(retry_count > 0), 0)
             FROM items",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;

        let mut stats = StoreStats {
            items: items as usize,
            downloaded: downloaded as usize,
            with_content: with_content as usize,
            retried: retried as usize,
            ..Default::default()
        };

        let mut stmt = conn.prepare(
            "SELECT engine, status, COUNT(*) FROM item_engines GROUP BY engine, status",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    parse_status(row.get(1)?, 1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (engine, status, count) in rows {
            let entry = stats.engines.entry(engine).or_insert((0, 0));
            match status {
                Status::Success => entry.0 += count as usize,
                Status::Failure => entry.1 += count as usize,
                Status::Unknown => {}
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    #[test]
    fn test_get_absent_is_none() {
        let store = SqliteStateStore::in_memory().unwrap();
        assert!(store.get(&id("10.1/none")).unwrap().is_none());
    }

    #[test]
    fn test_ensure_creates_once() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");
        assert!(store.ensure(&item).unwrap());
        assert!(!store.ensure(&item).unwrap());

        let events = store.events(&item).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Created);
    }

    #[test]
    fn test_source_outcome_sets_download_fields() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");

        store.mark_source_attempted(&item, "arxiv").unwrap();
        let snap = store.get(&item).unwrap().unwrap();
        assert!(snap.source("arxiv").attempted);
        assert_eq!(snap.source("arxiv").outcome, Status::Unknown);
        assert_eq!(snap.downloaded, Status::Unknown);

        store.mark_source_outcome(&item, "arxiv", true).unwrap();
        let snap = store.get(&item).unwrap().unwrap();
        assert_eq!(snap.source("arxiv").outcome, Status::Success);
        assert_eq!(snap.downloaded, Status::Success);
        assert_eq!(snap.download_source.as_deref(), Some("arxiv"));
        assert!(snap.download_date.is_some());
    }

    #[test]
    fn test_failed_outcome_leaves_downloaded() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");
        store.mark_source_outcome(&item, "unpaywall", false).unwrap();

        let snap = store.get(&item).unwrap().unwrap();
        assert!(snap.source("unpaywall").is_failed());
        assert_eq!(snap.downloaded, Status::Unknown);
        assert!(snap.download_source.is_none());
    }

    #[test]
    fn test_extraction_outcome() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");
        store.mark_extraction_outcome(&item, "grobid", false).unwrap();
        let snap = store.get(&item).unwrap().unwrap();
        assert_eq!(snap.engine_status("grobid"), Status::Failure);
        assert!(snap.engines["grobid"].updated_at.is_some());
        assert_eq!(snap.has_content, Status::Unknown);

        store.mark_extraction_outcome(&item, "grobid", true).unwrap();
        let snap = store.get(&item).unwrap().unwrap();
        assert_eq!(snap.engine_status("grobid"), Status::Success);
        assert_eq!(snap.has_content, Status::Success);
    }

    #[test]
    fn test_increment_retry_and_reset() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");
        assert_eq!(store.increment_retry(&item).unwrap(), 1);
        assert_eq!(store.increment_retry(&item).unwrap(), 2);

        store.mark_source_outcome(&item, "arxiv", true).unwrap();
        store.record_error(&item, "boom").unwrap();
        store.reset(&item).unwrap();

        let snap = store.get(&item).unwrap().unwrap();
        assert_eq!(snap.retry_count, 0);
        assert!(snap.sources.is_empty());
        assert!(snap.engines.is_empty());
        assert_eq!(snap.downloaded, Status::Unknown);
        assert!(snap.last_error.is_none());

        let events = store.events(&item).unwrap();
        assert_eq!(events.last().unwrap().kind, EventKind::Reset);
    }

    #[test]
    fn test_upsert_cannot_lower_retry() {
        let store = SqliteStateStore::in_memory().unwrap();
        let item = id("10.1/a");
        store.increment_retry(&item).unwrap();
        store.increment_retry(&item).unwrap();
        store
            .upsert(&SnapshotUpdate::new(item.clone()).retry_count(0))
            .unwrap();
        assert_eq!(store.get(&item).unwrap().unwrap().retry_count, 2);
    }

    #[test]
    fn test_stats() {
        let store = SqliteStateStore::in_memory().unwrap();
        store.mark_source_outcome(&id("10.1/a"), "arxiv", true).unwrap();
        store.mark_extraction_outcome(&id("10.1/a"), "grobid", true).unwrap();
        store.mark_extraction_outcome(&id("10.1/b"), "grobid", false).unwrap();
        store.increment_retry(&id("10.1/b")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.with_content, 1);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.engines["grobid"], (1, 1));
    }
}

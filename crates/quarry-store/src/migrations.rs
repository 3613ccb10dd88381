//! Versioned schema for the state store
//!
//! The version lives in `PRAGMA user_version`. Each step runs once, in
//! order, inside a single transaction at open time.

use crate::StoreError;
use rusqlite::Connection;

/// Schema version this build writes
pub const SCHEMA_VERSION: u32 = 2;

/// v1: items, per-source and per-engine state, event log
const V1: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id              TEXT PRIMARY KEY,
    downloaded      TEXT NOT NULL DEFAULT 'unknown',
    download_date   TEXT,
    download_source TEXT,
    has_content     TEXT NOT NULL DEFAULT 'unknown',
    retry_count     INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    last_updated    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_sources (
    item_id   TEXT NOT NULL REFERENCES items(id),
    source    TEXT NOT NULL,
    attempted INTEGER NOT NULL DEFAULT 0,
    outcome   TEXT NOT NULL DEFAULT 'unknown',
    PRIMARY KEY (item_id, source)
);

CREATE TABLE IF NOT EXISTS item_engines (
    item_id    TEXT NOT NULL REFERENCES items(id),
    engine     TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'unknown',
    updated_at TEXT,
    PRIMARY KEY (item_id, engine)
);

CREATE TABLE IF NOT EXISTS events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id     TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    status_from TEXT,
    status_to   TEXT,
    message     TEXT,
    created_at  TEXT NOT NULL
);
"#;

/// v2: lookup indexes for event history and engine stats
const V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_item ON events(item_id);
CREATE INDEX IF NOT EXISTS idx_item_engines_status ON item_engines(engine, status);
"#;

const MIGRATIONS: &[(u32, &str)] = &[(1, V1), (2, V2)];

/// Read the schema version of an open database
pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Bring a database up to [`SCHEMA_VERSION`]
///
/// Returns the number of steps applied.
///
/// # Errors
///
/// Fails when the database was written by a newer build, or when a step
/// fails (in which case nothing is applied).
pub fn migrate(conn: &mut Connection) -> Result<usize, StoreError> {
    let current = current_version(conn)?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, SCHEMA_VERSION
        )));
    }

    let pending: Vec<&(u32, &str)> = MIGRATIONS.iter().filter(|(v, _)| *v > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for (version, sql) in &pending {
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("step v{} failed: {}", version, e)))?;
        tracing::info!(version, "applied state store migration");
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(pending.len())
}

/// Apply steps up to and including `target` (used to build old fixtures)
#[doc(hidden)]
pub fn migrate_to(conn: &mut Connection, target: u32) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v <= target) {
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("step v{} failed: {}", version, e)))?;
    }
    tx.pragma_update(None, "user_version", target)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_migrates_fully() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), 2);
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_v1_database_upgrades() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_to(&mut conn, 1).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);

        assert_eq!(migrate(&mut conn).unwrap(), 1);
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_events_item'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 1);
    }

    #[test]
    fn test_newer_database_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}

//! Adapter over the downstream content database

use crate::StoreError;
use quarry_domain::traits::{ContentRecord, ContentStore, ContentUpdate};
use quarry_domain::{ExtractedDocument, ItemId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Table and column names of the content database
///
/// The schema is owned by whoever produced the database, so names are
/// configurable. Every name must be a plain SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTable {
    /// Table holding one row per item
    pub table: String,

    /// Column holding the item identifier
    pub id_column: String,

    /// Column holding the abstract
    pub abstract_column: String,

    /// Column holding sections as a JSON object
    pub sections_column: String,

    /// Column holding the parsing status string
    pub status_column: String,
}

impl Default for ContentTable {
    fn default() -> Self {
        Self {
            table: "papers".to_string(),
            id_column: "doi".to_string(),
            abstract_column: "abstract".to_string(),
            sections_column: "full_text_sections".to_string(),
            status_column: "parsing_status".to_string(),
        }
    }
}

impl ContentTable {
    /// Check that every name is a safe identifier
    pub fn validate(&self) -> Result<(), String> {
        for (label, name) in [
            ("table", &self.table),
            ("id_column", &self.id_column),
            ("abstract_column", &self.abstract_column),
            ("sections_column", &self.sections_column),
            ("status_column", &self.status_column),
        ] {
            let valid = !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(format!("{} {:?} is not a plain identifier", label, name));
            }
        }
        Ok(())
    }
}

/// SQLite implementation of [`ContentStore`]
///
/// Only updates existing rows; the table must already exist. Stored ids
/// may carry any spelling [`ItemId::parse`] accepts (`doi:` or resolver
/// prefixes, mixed case), so rows are matched through an index of
/// normalized id to rowid rather than by comparing text in SQL.
pub struct SqliteContentStore {
    inner: Mutex<Inner>,
    table: ContentTable,
}

struct Inner {
    conn: Connection,
    index: RowIndex,
}

/// Normalized id to rowids, rebuilt when the table's row count or highest
/// rowid moves
#[derive(Default)]
struct RowIndex {
    signature: Option<(i64, i64)>,
    rows: BTreeMap<ItemId, Vec<i64>>,
}

impl RowIndex {
    fn refresh(&mut self, conn: &Connection, t: &ContentTable) -> Result<(), StoreError> {
        let signature: (i64, i64) = conn.query_row(
            &format!("SELECT COUNT(*), COALESCE(MAX(rowid), 0) FROM {}", t.table),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if self.signature == Some(signature) {
            return Ok(());
        }

        let sql = format!(
            "SELECT rowid, {} FROM {} WHERE {} IS NOT NULL ORDER BY rowid",
            t.id_column, t.table, t.id_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows: BTreeMap<ItemId, Vec<i64>> = BTreeMap::new();
        for (rowid, value) in raw {
            match ItemId::parse(&value) {
                Ok(id) => rows.entry(id).or_default().push(rowid),
                Err(e) => tracing::warn!(value = %value, error = %e, "skipping invalid id in content database"),
            }
        }
        tracing::debug!(rows = signature.0, ids = rows.len(), "content index rebuilt");
        self.rows = rows;
        self.signature = Some(signature);
        Ok(())
    }

    fn rowids(&self, id: &ItemId) -> &[i64] {
        self.rows.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl SqliteContentStore {
    /// Open an existing content database
    pub fn open<P: AsRef<Path>>(path: P, table: ContentTable) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::Unavailable(format!(
                "content database {} does not exist",
                path.display()
            )));
        }
        Self::from_connection(Connection::open(path)?, table)
    }

    /// Wrap an open connection
    pub fn from_connection(conn: Connection, table: ContentTable) -> Result<Self, StoreError> {
        table.validate().map_err(StoreError::Config)?;
        conn.busy_timeout(Duration::from_secs(30))?;

        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table.table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::Config(format!(
                "content table {:?} not found",
                table.table
            )));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                index: RowIndex::default(),
            }),
            table,
        })
    }

    /// Table layout in use
    pub fn table(&self) -> &ContentTable {
        &self.table
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("content store lock poisoned".to_string()))?;
        let inner = &mut *guard;
        inner.index.refresh(&inner.conn, &self.table)?;
        Ok(guard)
    }
}

impl ContentStore for SqliteContentStore {
    type Error = StoreError;

    fn get(&self, id: &ItemId) -> Result<Option<ContentRecord>, Self::Error> {
        let t = &self.table;
        let inner = self.lock()?;
        let Some(&rowid) = inner.index.rowids(id).first() else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {}, {}, {} FROM {} WHERE rowid = ?1",
            t.abstract_column, t.sections_column, t.status_column, t.table
        );
        let record = inner
            .conn
            .query_row(&sql, params![rowid], |row| {
                Ok(ContentRecord {
                    abstract_text: row.get(0)?,
                    sections: row.get(1)?,
                    parsing_status: row.get(2)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn update(&self, id: &ItemId, update: &ContentUpdate) -> Result<bool, Self::Error> {
        if update.is_empty() {
            return Ok(self.get(id)?.is_some());
        }

        let t = &self.table;
        let mut assignments = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(abstract_text) = &update.abstract_text {
            assignments.push(format!("{} = ?", t.abstract_column));
            values.push(Value::Text(abstract_text.clone()));
        }
        if let Some(sections) = &update.sections {
            let doc = ExtractedDocument {
                sections: sections.clone(),
                ..Default::default()
            };
            assignments.push(format!("{} = ?", t.sections_column));
            values.push(Value::Text(doc.sections_json()));
        }
        if let Some(status) = &update.parsing_status {
            assignments.push(format!("{} = ?", t.status_column));
            values.push(Value::Text(status.clone()));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE rowid = ?",
            t.table,
            assignments.join(", ")
        );

        let inner = self.lock()?;
        let mut changed = 0;
        // duplicate spellings of one id are all kept in step
        for &rowid in inner.index.rowids(id) {
            let params = values.iter().cloned().chain(std::iter::once(Value::Integer(rowid)));
            changed += inner.conn.execute(&sql, params_from_iter(params))?;
        }
        Ok(changed > 0)
    }

    fn list_ids(&self) -> Result<Vec<ItemId>, Self::Error> {
        let inner = self.lock()?;
        Ok(inner.index.rows.keys().cloned().collect())
    }
}

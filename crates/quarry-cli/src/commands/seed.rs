//! Seed command implementation.

use super::{open_state, read_id_file, require_content};
use crate::cli::SeedArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use quarry_domain::traits::{ContentStore, StateStore};
use quarry_domain::{SnapshotUpdate, Status};

/// Execute the seed command.
pub fn execute_seed(args: SeedArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let store = open_state(config)?;

    if args.from_content_db {
        let content = require_content(config)?;
        let updates = seed_updates(content.as_ref())?;
        let applied = store.bulk_upsert(&updates)?;
        println!(
            "{}",
            formatter.success(&format!("Seeded {} item(s) from the content database", applied))
        );
    }

    if let Some(path) = &args.ids {
        let mut created = 0;
        let ids = read_id_file(path)?;
        for id in &ids {
            if store.ensure(id)? {
                created += 1;
            }
        }
        println!(
            "{}",
            formatter.success(&format!(
                "Seeded {} new item(s), {} already tracked",
                created,
                ids.len() - created
            ))
        );
    }
    Ok(())
}

/// One update per content row; rows with sections seed `has_content`.
pub fn seed_updates<C: ContentStore>(content: &C) -> std::result::Result<Vec<SnapshotUpdate>, C::Error> {
    let mut updates = Vec::new();
    for id in content.list_ids()? {
        let mut update = SnapshotUpdate::new(id.clone());
        if let Some(record) = content.get(&id)? {
            if !record.sections_are_empty() {
                update = update.has_content(Status::Success);
            }
        }
        updates.push(update);
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_store::{ContentTable, SqliteContentStore, SqliteStateStore};
    use rusqlite::Connection;

    fn content() -> SqliteContentStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE papers (
                doi TEXT, abstract TEXT, full_text_sections TEXT, parsing_status TEXT
             );
             INSERT INTO papers (doi, full_text_sections) VALUES ('10.1/full', '{\"Intro\":\"text\"}');
             INSERT INTO papers (doi, full_text_sections) VALUES ('10.1/empty', '  ');
             INSERT INTO papers (doi) VALUES ('10.1/bare');",
        )
        .unwrap();
        SqliteContentStore::from_connection(conn, ContentTable::default()).unwrap()
    }

    #[test]
    fn test_seed_from_content_rows() {
        let content = content();
        let updates = seed_updates(&content).unwrap();
        assert_eq!(updates.len(), 3);

        let store = SqliteStateStore::in_memory().unwrap();
        assert_eq!(store.bulk_upsert(&updates).unwrap(), 3);

        let stats = store.stats().unwrap();
        assert_eq!(stats.items, 3);
        assert_eq!(stats.with_content, 1);
        assert_eq!(stats.downloaded, 0);
    }

    #[test]
    fn test_seed_twice_is_stable() {
        let content = content();
        let store = SqliteStateStore::in_memory().unwrap();
        store.bulk_upsert(&seed_updates(&content).unwrap()).unwrap();
        let before = store.stats().unwrap();

        store.bulk_upsert(&seed_updates(&content).unwrap()).unwrap();
        assert_eq!(store.stats().unwrap(), before);
    }
}

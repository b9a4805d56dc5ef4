//! Versioned SQLite schema.
//!
//! `MIGRATIONS[i]` moves the schema from version `i` to `i + 1`. Applied
//! versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

const MIGRATIONS: &[&str] = &[
    // v1: spaces and their object index.
    r#"
    CREATE TABLE spaces (
        space_id TEXT PRIMARY KEY,
        descriptor BLOB NOT NULL,         -- CBOR SpaceDescriptor, stored verbatim
        space_hash TEXT NOT NULL,         -- hex whole-space hash, rewritten on every index change
        digest_sum BLOB NOT NULL,         -- 32-byte running sum behind space_hash
        object_count INTEGER NOT NULL,
        created_at INTEGER NOT NULL       -- local persist time (Unix ms)
    );

    CREATE TABLE objects (
        space_id TEXT NOT NULL REFERENCES spaces(space_id),
        object_id TEXT NOT NULL,
        key INTEGER NOT NULL,             -- u64 key with the sign bit flipped, so i64 order == u64 order
        hash BLOB NOT NULL,               -- 32 bytes
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (space_id, object_id)
    );

    CREATE INDEX idx_objects_key ON objects(space_id, key, object_id);
    "#,
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
///
/// A database written by a newer build is refused rather than touched.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {} is newer than supported version {}",
            applied, CURRENT_VERSION
        )));
    }
    if applied == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        let version = index as u32 + 1;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_millis()],
        )?;
        tracing::debug!(version, "applied schema migration");
    }
    tx.commit()?;
    Ok(())
}

/// Wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> u32 {
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_migrate_twice() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_tables_exist() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert!(tables.iter().any(|t| t == "spaces"));
        assert!(tables.iter().any(|t| t == "objects"));
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, 0)",
            [CURRENT_VERSION + 1],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}

//! Forward-only format migration framework.
//!
//! Tracks the on-disk format version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`]. Each step runs in its own
//! transaction and writes the new version stamp as its last statement, so a crash
//! mid-migration leaves the previous version in place.

use rusqlite::{Connection, OptionalExtension};

use super::schema::META_SCHEMA_VERSION;
use crate::error::{Error, Result};

/// The format version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Get the current format version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Read the format version without assuming the metadata table exists.
///
/// Returns `None` for a database that has no stamp at all (empty or foreign file).
pub fn probe_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let has_meta: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_meta')",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(None);
    }
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [META_SCHEMA_VERSION],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map(|v| v.map(|v| v.parse::<u32>().unwrap_or(0)))
}

/// Update the stored format version.
fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            3 => migrate_v2_to_v3(&tx)?,
            _ => {
                tracing::error!(from = version, to = next, "unknown migration target");
                return Err(Error::NoMigrationPath { from: version, to: next });
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: transaction journal.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS tx_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('update','load','restore','migrate')),
    inserted INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#,
    )
}

/// Migration v2 → v3: schema generation and collation locale stamps.
fn migrate_v2_to_v3(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_generation', '0');
INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('locale', '');
"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{get_meta, META_SCHEMA_GENERATION};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_v1_to_v2_adds_tx_log() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tx_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn migration_v2_to_v3_adds_generation_stamp() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(
            get_meta(&conn, META_SCHEMA_GENERATION).unwrap().as_deref(),
            Some("0")
        );
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap(); // second call should not error
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn missing_migration_step_is_an_error() {
        let conn = test_db();
        conn.execute("UPDATE schema_meta SET value = '0' WHERE key = 'schema_version'", [])
            .unwrap();
        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, Error::NoMigrationPath { from: 0, to: 1 }), "{err}");
        assert_eq!(err.kind(), crate::error::ErrorKind::Version);
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn probe_handles_foreign_databases() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(probe_schema_version(&conn).unwrap(), None);
        crate::db::schema::init_schema(&conn).unwrap();
        assert_eq!(probe_schema_version(&conn).unwrap(), Some(1));
    }
}

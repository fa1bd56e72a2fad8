pub mod collation;
pub mod journal;
pub mod migrations;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::{Error, Result};
use collation::Locale;

/// Open (or create) the writer connection at the given path.
///
/// Enables WAL, the busy timeout and the locale collation, and creates the fixed
/// tables. Format migrations are run separately once the version gate has passed.
pub fn open_database(path: impl AsRef<Path>, busy_timeout: Duration, locale: &Locale) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout, locale)?;
    // Enable WAL mode for concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    tracing::debug!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Open a read-only connection to an existing database.
pub fn open_readonly(path: impl AsRef<Path>, busy_timeout: Duration, locale: &Locale) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    configure(&conn, busy_timeout, locale)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration, locale: &Locale) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    collation::register(conn, locale)?;
    Ok(())
}

/// Run SQLite's consistency check. `None` means the database is sound.
///
/// `quick` skips the index-content cross checks, which is enough for the open path.
pub fn integrity_check(conn: &Connection, quick: bool) -> Result<Option<String>> {
    let pragma = if quick { "quick_check" } else { "integrity_check" };
    let mut stmt = conn.prepare(&format!("PRAGMA {pragma}"))?;
    let problems: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;
    if problems.len() == 1 && problems[0] == "ok" {
        Ok(None)
    } else {
        Ok(Some(problems.join("; ")))
    }
}

/// Rebuild every index, the repair attempted after a failed consistency check.
pub fn repair(conn: &Connection) -> Result<()> {
    tracing::warn!("rebuilding indexes to repair the database");
    conn.execute_batch("REINDEX")?;
    Ok(())
}

/// Truncate the WAL into the main database file.
pub fn checkpoint(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_passes_integrity_check() {
        let tmp = tempfile::TempDir::new().unwrap();
        let conn = open_database(tmp.path().join("nested/store.db"), Duration::from_secs(1), &Locale::new("C")).unwrap();
        schema::init_schema(&conn).unwrap();
        assert_eq!(integrity_check(&conn, true).unwrap(), None);
        assert_eq!(integrity_check(&conn, false).unwrap(), None);

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        checkpoint(&conn).unwrap();
    }

    #[test]
    fn readonly_connection_rejects_writes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("store.db");
        let conn = open_database(&path, Duration::from_secs(1), &Locale::new("C")).unwrap();
        schema::init_schema(&conn).unwrap();

        let ro = open_readonly(&path, Duration::from_secs(1), &Locale::new("C")).unwrap();
        assert!(ro
            .execute("INSERT INTO Resource (Uri) VALUES ('urn:x')", [])
            .is_err());
        let n: i64 = ro.query_row("SELECT COUNT(*) FROM Resource", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 0);
    }
}

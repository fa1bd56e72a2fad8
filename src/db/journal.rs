//! Append-only record of committed write transactions (`tx_log`).

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

/// What kind of write a journal row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Update,
    Load,
    Restore,
    Migrate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Load => "load",
            Self::Restore => "restore",
            Self::Migrate => "migrate",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(Self::Update),
            "load" => Ok(Self::Load),
            "restore" => Ok(Self::Restore),
            "migrate" => Ok(Self::Migrate),
            _ => Err(format!("unknown journal operation: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub id: i64,
    pub operation: Operation,
    pub inserted: u64,
    pub deleted: u64,
    pub created_at: String,
}

/// Append a journal row. Runs inside the caller's transaction.
pub fn record(conn: &Connection, operation: Operation, inserted: u64, deleted: u64) -> rusqlite::Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tx_log (operation, inserted, deleted, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation.as_str(), inserted as i64, deleted as i64, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The most recent `limit` entries, newest first.
pub fn recent(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, operation, inserted, deleted, created_at FROM tx_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit as i64], |row| {
        let op: String = row.get(1)?;
        Ok(JournalEntry {
            id: row.get(0)?,
            operation: op.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
            inserted: row.get::<_, i64>(2)? as u64,
            deleted: row.get::<_, i64>(3)? as u64,
            created_at: row.get(4)?,
        })
    })?;
    rows.collect()
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM tx_log", [], |r| r.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        crate::db::migrations::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn entries_come_back_newest_first() {
        let conn = test_db();
        record(&conn, Operation::Load, 10, 0).unwrap();
        record(&conn, Operation::Update, 1, 2).unwrap();

        let entries = recent(&conn, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, Operation::Update);
        assert_eq!(entries[0].deleted, 2);
        assert_eq!(entries[1].operation, Operation::Load);
        assert_eq!(count(&conn).unwrap(), 2);
    }

    #[test]
    fn operation_is_checked_by_the_table() {
        let conn = test_db();
        let err = conn.execute(
            "INSERT INTO tx_log (operation, created_at) VALUES ('bogus', 'now')",
            [],
        );
        assert!(err.is_err());
    }
}

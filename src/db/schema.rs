//! SQL DDL for the fixed tables of every store.
//!
//! Defines `Resource` (URI to row id), `schema_meta` (key/value stamps) and, from
//! format version 2 on, the `tx_log` journal. Ontology-derived tables are created
//! separately by [`crate::schema::ddl`]. All DDL uses `IF NOT EXISTS`.

use rusqlite::{Connection, OptionalExtension};

/// Version 1 tables. Later versions are reached through migrations.
const SCHEMA_SQL: &str = r#"
-- Every subject, resource object, class and property
CREATE TABLE IF NOT EXISTS Resource (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Uri TEXT NOT NULL UNIQUE
);

-- Store metadata: format version, ontology snapshot, stamps
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_SCHEMA_GENERATION: &str = "schema_generation";
pub const META_ONTOLOGY_SNAPSHOT: &str = "ontology_snapshot";
pub const META_LOCALE: &str = "locale";

/// Initialize the version 1 tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Read a `schema_meta` value.
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM schema_meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// The current schema generation. Missing stamps read as 0.
pub fn get_generation(conn: &Connection) -> rusqlite::Result<u64> {
    Ok(get_meta(conn, META_SCHEMA_GENERATION)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Increment the schema generation. Callers run this as the last statement of a
/// schema-altering transaction.
pub fn bump_generation(conn: &Connection) -> rusqlite::Result<u64> {
    let next = get_generation(conn)? + 1;
    set_meta(conn, META_SCHEMA_GENERATION, &next.to_string())?;
    Ok(next)
}

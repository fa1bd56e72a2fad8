//! Turns a [`SchemaLayout`] into tables, columns and indexes.

use std::collections::HashSet;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::{quote, ClassTable, Column, IndexSpec, PropertyTable, SchemaLayout, COLLATION, FTS_TABLE, INDEX_PREFIX};
use crate::error::Result;
use crate::ontology::{DataType, Ontology, PropertyId};

fn column_type(data_type: DataType) -> String {
    if data_type.is_collated() {
        format!("{} COLLATE {COLLATION}", data_type.sql_type())
    } else {
        data_type.sql_type().to_string()
    }
}

pub fn create_class_table_sql(table: &ClassTable) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (ID INTEGER NOT NULL PRIMARY KEY", quote(&table.name));
    for column in &table.columns {
        sql.push_str(&format!(", {} {}", quote(&column.name), column_type(column.data_type)));
    }
    sql.push(')');
    sql
}

pub fn create_property_table_sql(table: &PropertyTable) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (ID INTEGER NOT NULL, {} {} NOT NULL)",
        quote(&table.name),
        quote(&table.column),
        column_type(table.data_type)
    )
}

pub fn create_index_sql(index: &IndexSpec) -> String {
    let columns: Vec<_> = index.columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(&index.table),
        columns.join(", ")
    )
}

/// Column names of the FTS table, in layout order.
pub fn fulltext_columns(ontology: &Ontology, layout: &SchemaLayout) -> Vec<String> {
    layout
        .fulltext_properties()
        .iter()
        .map(|&p| ontology.property(p).name().to_string())
        .collect()
}

fn create_fulltext_sql(columns: &[String]) -> String {
    let columns: Vec<_> = columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {FTS_TABLE} USING fts5({}, tokenize = 'unicode61 remove_diacritics 2')",
        columns.join(", ")
    )
}

/// Create the class and property tables of `layout` that do not exist yet.
pub fn create_tables(conn: &Connection, layout: &SchemaLayout) -> Result<()> {
    for table in layout.class_tables() {
        conn.execute(&create_class_table_sql(table), [])?;
    }
    for table in layout.property_tables() {
        conn.execute(&create_property_table_sql(table), [])?;
    }
    Ok(())
}

/// Create every table and index of `layout` that does not exist yet.
pub fn create_schema(conn: &Connection, ontology: &Ontology, layout: &SchemaLayout) -> Result<()> {
    create_tables(conn, layout)?;
    for index in layout.indexes() {
        conn.execute(&create_index_sql(index), [])?;
    }
    let fts = fulltext_columns(ontology, layout);
    if !fts.is_empty() {
        conn.execute(&create_fulltext_sql(&fts), [])?;
    }
    tracing::info!(
        tables = layout.class_tables().len() + layout.property_tables().len(),
        indexes = layout.indexes().len(),
        fulltext_columns = fts.len(),
        "ontology schema created"
    );
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |r| r.get(0),
    )?)
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(names)
}

/// Add columns that exist in `layout` but not on disk. Returns the table name and
/// column of each one added.
pub fn add_missing_columns(conn: &Connection, layout: &SchemaLayout) -> Result<Vec<(String, Column)>> {
    let mut added = Vec::new();
    for table in layout.class_tables() {
        let existing = table_columns(conn, &table.name)?;
        for column in &table.columns {
            if !existing.contains(&column.name) {
                conn.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote(&table.name),
                        quote(&column.name),
                        column_type(column.data_type)
                    ),
                    [],
                )?;
                added.push((table.name.clone(), column.clone()));
            }
        }
    }
    Ok(added)
}

/// Names of the ontology-derived indexes currently on disk.
pub fn existing_indexes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND substr(name, 1, length(?1)) = ?1",
    )?;
    let names = stmt
        .query_map([INDEX_PREFIX], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(names)
}

pub fn drop_all_indexes(conn: &Connection) -> Result<usize> {
    let names = existing_indexes(conn)?;
    for name in &names {
        conn.execute(&format!("DROP INDEX IF EXISTS {}", quote(name)), [])?;
    }
    Ok(names.len())
}

/// Make the on-disk index set match `layout`.
pub fn sync_indexes(conn: &Connection, layout: &SchemaLayout) -> Result<()> {
    let wanted: HashSet<&str> = layout.indexes().iter().map(|i| i.name.as_str()).collect();
    for name in existing_indexes(conn)? {
        if !wanted.contains(name.as_str()) {
            tracing::debug!(index = %name, "dropping index");
            conn.execute(&format!("DROP INDEX IF EXISTS {}", quote(&name)), [])?;
        }
    }
    for index in layout.indexes() {
        conn.execute(&create_index_sql(index), [])?;
    }
    Ok(())
}

/// Copy the values of `property` into its denormalised column on `indexing_table`.
pub fn fill_domain_index(conn: &Connection, layout: &SchemaLayout, indexing_table: &str, property: PropertyId) -> Result<()> {
    let home = layout.storage(property);
    conn.execute(
        &format!(
            "UPDATE {t} SET {c} = (SELECT h.{c} FROM {h} AS h WHERE h.ID = {t}.ID)",
            t = quote(indexing_table),
            c = quote(home.column()),
            h = quote(home.table()),
        ),
        [],
    )?;
    Ok(())
}

// --- Fulltext ---------------------------------------------------------------------------

fn indexable_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        // Language-tagged strings: drop the tag after the NUL.
        ValueRef::Blob(b) => {
            let text = b.split(|&byte| byte == 0).next().unwrap_or_default();
            Some(String::from_utf8_lossy(text).into_owned())
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
    }
}

/// Recompute the FTS row of each subject in `ids`.
pub fn refresh_fulltext(conn: &Connection, ontology: &Ontology, layout: &SchemaLayout, ids: impl IntoIterator<Item = i64>) -> Result<()> {
    let props = layout.fulltext_properties();
    if props.is_empty() {
        return Ok(());
    }

    let mut fetches = props
        .iter()
        .map(|&p| {
            let storage = layout.storage(p);
            conn.prepare(&format!(
                "SELECT {c} FROM {t} WHERE ID = ?1 AND {c} IS NOT NULL",
                c = quote(storage.column()),
                t = quote(storage.table())
            ))
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let columns = fulltext_columns(ontology, layout);
    let quoted: Vec<_> = columns.iter().map(|c| quote(c)).collect();
    let placeholders: Vec<_> = (2..=columns.len() + 1).map(|i| format!("?{i}")).collect();
    let mut delete = conn.prepare(&format!("DELETE FROM {FTS_TABLE} WHERE rowid = ?1"))?;
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {FTS_TABLE} (rowid, {}) VALUES (?1, {})",
        quoted.join(", "),
        placeholders.join(", ")
    ))?;

    for id in ids {
        let mut values = Vec::with_capacity(fetches.len());
        for fetch in &mut fetches {
            let mut rows = fetch.query([id])?;
            let mut parts = Vec::new();
            while let Some(row) = rows.next()? {
                parts.extend(indexable_text(row.get_ref(0)?));
            }
            values.push((!parts.is_empty()).then(|| parts.join(" ")));
        }

        delete.execute([id])?;
        if values.iter().any(Option::is_some) {
            let mut params: Vec<SqlValue> = vec![id.into()];
            params.extend(values.into_iter().map(|v| v.map_or(SqlValue::Null, SqlValue::Text)));
            insert.execute(params_from_iter(params))?;
        }
    }
    Ok(())
}

/// Drop and rebuild the FTS table from scratch.
pub fn rebuild_fulltext(conn: &Connection, ontology: &Ontology, layout: &SchemaLayout) -> Result<()> {
    conn.execute(&format!("DROP TABLE IF EXISTS {FTS_TABLE}"), [])?;
    let columns = fulltext_columns(ontology, layout);
    if columns.is_empty() {
        return Ok(());
    }
    conn.execute(&create_fulltext_sql(&columns), [])?;

    let subjects: Vec<String> = layout
        .fulltext_properties()
        .iter()
        .map(|&p| format!("SELECT ID FROM {}", quote(layout.storage(p).table())))
        .collect();
    let mut stmt = conn.prepare(&subjects.join(" UNION "))?;
    let ids: Vec<i64> = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    tracing::info!(subjects = ids.len(), "rebuilding fulltext index");
    refresh_fulltext(conn, ontology, layout, ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collation::{self, Locale};
    use crate::ontology::{vocab, PropertyDefinition};
    use crate::schema::derive_schema;

    const EX: &str = "http://example.org/ex#";

    fn ontology() -> Ontology {
        let mut o = Ontology::new();
        o.add_namespace("ex", EX).unwrap();
        o.register_class(&format!("{EX}Doc"), &[o.resource_class()]).unwrap();
        o.register_property(
            &PropertyDefinition::new(format!("{EX}title"), format!("{EX}Doc"), format!("{}string", vocab::XSD))
                .single_valued()
                .indexed()
                .fulltext(),
        )
        .unwrap();
        o.register_property(
            &PropertyDefinition::new(format!("{EX}keyword"), format!("{EX}Doc"), format!("{}string", vocab::XSD))
                .fulltext(),
        )
        .unwrap();
        let mut n = 0;
        o.bind_numeric_ids::<crate::error::OntologyError>(|_| {
            n += 1;
            Ok(n)
        })
        .unwrap();
        o.freeze();
        o
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        collation::register(&conn, &Locale::new("C")).unwrap();
        conn
    }

    #[test]
    fn class_table_sql_quotes_names_and_collates_strings() {
        let o = ontology();
        let layout = derive_schema(&o).unwrap();
        let sql = create_class_table_sql(&layout.class_tables()[0]);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"ex:Doc\" (ID INTEGER NOT NULL PRIMARY KEY, \"ex:title\" TEXT COLLATE LOCALE)"
        );
    }

    #[test]
    fn create_schema_is_idempotent() {
        let o = ontology();
        let layout = derive_schema(&o).unwrap();
        let conn = conn();
        create_schema(&conn, &o, &layout).unwrap();
        create_schema(&conn, &o, &layout).unwrap();
        assert!(table_exists(&conn, "ex:Doc_ex:keyword").unwrap());
        assert!(table_exists(&conn, FTS_TABLE).unwrap());
        assert_eq!(existing_indexes(&conn).unwrap().len(), layout.indexes().len());
    }

    #[test]
    fn sync_indexes_drops_stale_ones() {
        let o = ontology();
        let layout = derive_schema(&o).unwrap();
        let conn = conn();
        create_schema(&conn, &o, &layout).unwrap();
        conn.execute_batch("CREATE INDEX \"ix:stale\" ON \"ex:Doc\" (ID)").unwrap();
        sync_indexes(&conn, &layout).unwrap();
        assert!(!existing_indexes(&conn).unwrap().contains(&"ix:stale".to_string()));
    }

    #[test]
    fn fulltext_rows_follow_values() {
        let o = ontology();
        let layout = derive_schema(&o).unwrap();
        let conn = conn();
        create_schema(&conn, &o, &layout).unwrap();
        conn.execute_batch(
            "INSERT INTO \"ex:Doc\" (ID, \"ex:title\") VALUES (100, 'Rust ownership');
             INSERT INTO \"ex:Doc_ex:keyword\" (ID, \"ex:keyword\") VALUES (100, 'borrow'), (100, 'lifetime');",
        )
        .unwrap();
        refresh_fulltext(&conn, &o, &layout, [100]).unwrap();

        let hit: i64 = conn
            .query_row("SELECT rowid FROM fts5 WHERE fts5 MATCH 'lifetime'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hit, 100);

        conn.execute_batch("DELETE FROM \"ex:Doc_ex:keyword\"; DELETE FROM \"ex:Doc\";").unwrap();
        refresh_fulltext(&conn, &o, &layout, [100]).unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM fts5", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 0);
    }
}

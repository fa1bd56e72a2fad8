//! Moving a populated store from one ontology to the next.
//!
//! The store keeps an [`OntologySnapshot`] of the layout it was last built with in
//! `schema_meta`. On open, [`plan_evolution`] diffs that snapshot against the freshly
//! derived layout and [`apply_plan`] executes the result inside one transaction whose
//! final statement bumps the schema generation.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::{ddl, quote, SchemaLayout, Storage};
use crate::db::journal::{self, Operation};
use crate::db::schema::{bump_generation, get_meta, set_meta, META_ONTOLOGY_SNAPSHOT};
use crate::error::{Result, SchemaError};
use crate::ontology::{DataType, Ontology, PropertyId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSnapshot {
    pub uri: String,
    pub name: String,
}

/// What a property looked like, and where its values were, when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub uri: String,
    pub name: String,
    pub data_type: DataType,
    pub multi_valued: bool,
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub domain_index_tables: Vec<String>,
    #[serde(default)]
    pub fulltext: bool,
}

impl PropertySnapshot {
    fn storage(&self) -> Storage {
        if self.multi_valued {
            Storage::Table {
                table: self.table.clone(),
                column: self.column.clone(),
            }
        } else {
            Storage::Column {
                table: self.table.clone(),
                column: self.column.clone(),
            }
        }
    }
}

/// Serializable summary of the layout a store was built with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OntologySnapshot {
    pub classes: Vec<ClassSnapshot>,
    pub properties: Vec<PropertySnapshot>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl OntologySnapshot {
    pub fn capture(ontology: &Ontology, layout: &SchemaLayout) -> Self {
        let classes = ontology
            .classes()
            .iter()
            .map(|c| ClassSnapshot {
                uri: c.uri().to_string(),
                name: c.name().to_string(),
            })
            .collect();
        let properties = ontology
            .properties()
            .iter()
            .map(|p| {
                let storage = layout.storage(p.id());
                PropertySnapshot {
                    uri: p.uri().to_string(),
                    name: p.name().to_string(),
                    data_type: p.data_type(),
                    multi_valued: p.is_multi_valued(),
                    table: storage.table().to_string(),
                    column: storage.column().to_string(),
                    domain_index_tables: layout.domain_index_tables(p.id()).map(|t| t.name.clone()).collect(),
                    fulltext: p.fulltext_indexed(),
                }
            })
            .collect();
        let mut indexes: Vec<String> = layout.indexes().iter().map(|i| i.name.clone()).collect();
        indexes.sort();
        Self {
            classes,
            properties,
            indexes,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SchemaError::CorruptSnapshot(e.to_string()).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SchemaError::CorruptSnapshot(e.to_string()).into())
    }

    /// Read the snapshot stored in `schema_meta`, if any.
    pub fn load(conn: &Connection) -> Result<Option<Self>> {
        get_meta(conn, META_ONTOLOGY_SNAPSHOT)?
            .map(|json| Self::from_json(&json))
            .transpose()
    }

    pub fn store(&self, conn: &Connection) -> Result<()> {
        set_meta(conn, META_ONTOLOGY_SNAPSHOT, &self.to_json()?)?;
        Ok(())
    }

    fn fulltext_names(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.fulltext)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// One step of an evolution plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    AddClass { uri: String },
    AddProperty { property: PropertyId },
    /// Single-valued column to its own table.
    WidenToMultiValued { property: PropertyId, from: PropertySnapshot },
    /// Table back to a column, keeping the smallest value per subject.
    NarrowToSingleValued {
        property: PropertyId,
        from: PropertySnapshot,
        destructive: bool,
    },
    /// Same shape, different domain class table.
    MoveDomain { property: PropertyId, from: PropertySnapshot },
    /// Values are discarded; the lexical forms of one type rarely parse as another.
    ChangeDataType {
        property: PropertyId,
        from: PropertySnapshot,
        destructive: bool,
    },
    /// No longer declared. Its data is left in place.
    RemoveProperty { uri: String },
    UpdateIndexes,
    RebuildFulltext,
}

impl SchemaChange {
    fn relocated(&self) -> Option<(PropertyId, &PropertySnapshot)> {
        match self {
            Self::WidenToMultiValued { property, from }
            | Self::NarrowToSingleValued { property, from, .. }
            | Self::MoveDomain { property, from } => Some((*property, from)),
            _ => None,
        }
    }
}

/// `true` if the property described by `snapshot` holds at least one value on disk.
pub fn property_has_values(conn: &Connection, snapshot: &PropertySnapshot) -> Result<bool> {
    if !ddl::table_exists(conn, &snapshot.table)? {
        return Ok(false);
    }
    if !ddl::table_columns(conn, &snapshot.table)?.contains(&snapshot.column) {
        return Ok(false);
    }
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} IS NOT NULL)",
        quote(&snapshot.table),
        quote(&snapshot.column)
    );
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Diff `previous` against the layout of `ontology`.
///
/// Narrowing a populated multi-valued property or retyping a populated property fails
/// unless `allow_destructive` is set.
pub fn plan_evolution(
    previous: &OntologySnapshot,
    ontology: &Ontology,
    layout: &SchemaLayout,
    allow_destructive: bool,
    mut is_populated: impl FnMut(&PropertySnapshot) -> Result<bool>,
) -> Result<Vec<SchemaChange>> {
    let mut plan = Vec::new();

    let known_classes: HashSet<&str> = previous.classes.iter().map(|c| c.uri.as_str()).collect();
    for class in ontology.classes() {
        if !known_classes.contains(class.uri()) {
            plan.push(SchemaChange::AddClass {
                uri: class.uri().to_string(),
            });
        }
    }

    let before: HashMap<&str, &PropertySnapshot> =
        previous.properties.iter().map(|p| (p.uri.as_str(), p)).collect();
    for property in ontology.properties() {
        let id = property.id();
        let Some(prev) = before.get(property.uri()) else {
            plan.push(SchemaChange::AddProperty { property: id });
            continue;
        };
        let storage = layout.storage(id);

        if prev.data_type != property.data_type() {
            let populated = is_populated(prev)?;
            if populated && !allow_destructive {
                return Err(SchemaError::UnmappableTypeChange {
                    property: property.uri().to_string(),
                    from: prev.data_type.to_string(),
                    to: property.data_type().to_string(),
                }
                .into());
            }
            plan.push(SchemaChange::ChangeDataType {
                property: id,
                from: (*prev).clone(),
                destructive: populated,
            });
        } else if prev.multi_valued && !property.is_multi_valued() {
            let populated = is_populated(prev)?;
            if populated && !allow_destructive {
                return Err(SchemaError::UnmappableCardinalityChange {
                    property: property.uri().to_string(),
                }
                .into());
            }
            plan.push(SchemaChange::NarrowToSingleValued {
                property: id,
                from: (*prev).clone(),
                destructive: populated,
            });
        } else if !prev.multi_valued && property.is_multi_valued() {
            plan.push(SchemaChange::WidenToMultiValued {
                property: id,
                from: (*prev).clone(),
            });
        } else if prev.table != storage.table() || prev.column != storage.column() {
            plan.push(SchemaChange::MoveDomain {
                property: id,
                from: (*prev).clone(),
            });
        }
    }

    for prev in &previous.properties {
        if ontology.property_by_uri(&prev.uri).is_none() {
            plan.push(SchemaChange::RemoveProperty { uri: prev.uri.clone() });
        }
    }

    let current = OntologySnapshot::capture(ontology, layout);
    let moved_fulltext = plan.iter().any(|c| match c {
        SchemaChange::ChangeDataType { from, .. } => from.fulltext,
        other => other.relocated().is_some_and(|(_, from)| from.fulltext),
    });
    let domain_indexes_changed = current
        .properties
        .iter()
        .filter_map(|p| before.get(p.uri.as_str()).map(|prev| (prev, p)))
        .any(|(prev, p)| prev.domain_index_tables != p.domain_index_tables);

    if !plan.is_empty() || current.indexes != previous.indexes || domain_indexes_changed {
        plan.push(SchemaChange::UpdateIndexes);
    }
    if moved_fulltext || current.fulltext_names() != previous.fulltext_names() {
        plan.push(SchemaChange::RebuildFulltext);
    }
    Ok(plan)
}

fn drop_storage(conn: &Connection, storage: &Storage) -> Result<()> {
    match storage {
        Storage::Table { table, .. } => {
            conn.execute(&format!("DROP TABLE IF EXISTS {}", quote(table)), [])?;
        }
        Storage::Column { table, column } => drop_column(conn, table, column)?,
    }
    Ok(())
}

fn drop_column(conn: &Connection, table: &str, column: &str) -> Result<()> {
    if ddl::table_exists(conn, table)? && ddl::table_columns(conn, table)?.contains(column) {
        conn.execute(
            &format!("ALTER TABLE {} DROP COLUMN {}", quote(table), quote(column)),
            [],
        )?;
    }
    Ok(())
}

/// Copy values from `from` into `to`, then drop `from`.
fn move_values(conn: &Connection, from: &Storage, to: &Storage) -> Result<()> {
    if !ddl::table_exists(conn, from.table())? {
        return Ok(());
    }
    let (ft, fc) = (quote(from.table()), quote(from.column()));
    let (tt, tc) = (quote(to.table()), quote(to.column()));
    let sql = match (from, to) {
        (_, Storage::Table { .. }) => {
            format!("INSERT OR IGNORE INTO {tt} (ID, {tc}) SELECT ID, {fc} FROM {ft} WHERE {fc} IS NOT NULL")
        }
        (Storage::Table { .. }, Storage::Column { .. }) => format!(
            "INSERT INTO {tt} (ID, {tc}) SELECT ID, MIN({fc}) FROM {ft} WHERE true GROUP BY ID \
             ON CONFLICT(ID) DO UPDATE SET {tc} = excluded.{tc}"
        ),
        (Storage::Column { .. }, Storage::Column { .. }) => format!(
            "INSERT INTO {tt} (ID, {tc}) SELECT ID, {fc} FROM {ft} WHERE {fc} IS NOT NULL \
             ON CONFLICT(ID) DO UPDATE SET {tc} = excluded.{tc}"
        ),
    };
    let moved = conn.execute(&sql, [])?;
    tracing::debug!(from = %from.table(), to = %to.table(), rows = moved, "values moved");
    drop_storage(conn, from)
}

/// Execute `plan` in one transaction and record the new snapshot.
///
/// Returns the new schema generation, or `None` if the plan was empty.
pub fn apply_plan(conn: &Connection, ontology: &Ontology, layout: &SchemaLayout, plan: &[SchemaChange]) -> Result<Option<u64>> {
    if plan.is_empty() {
        return Ok(None);
    }
    let tx = conn.unchecked_transaction()?;

    // Indexed columns cannot be dropped.
    ddl::drop_all_indexes(&tx)?;

    for change in plan {
        match change {
            SchemaChange::ChangeDataType { property, from, destructive } => {
                if *destructive {
                    tracing::warn!(
                        property = %ontology.property(*property).uri(),
                        from = %from.data_type,
                        to = %ontology.property(*property).data_type(),
                        "data type changed, discarding stored values"
                    );
                }
                drop_storage(&tx, &from.storage())?;
                for table in &from.domain_index_tables {
                    drop_column(&tx, table, &from.column)?;
                }
            }
            SchemaChange::RemoveProperty { uri } => {
                tracing::warn!(property = %uri, "property no longer declared, leaving its values in place");
            }
            _ => {}
        }
    }

    ddl::create_tables(&tx, layout)?;
    let added = ddl::add_missing_columns(&tx, layout)?;
    for (table, column) in &added {
        tracing::debug!(table = %table, column = %column.name, "column added");
    }

    for change in plan {
        let Some((property, from)) = change.relocated() else {
            continue;
        };
        if let SchemaChange::NarrowToSingleValued { destructive: true, .. } = change {
            tracing::warn!(
                property = %ontology.property(property).uri(),
                "narrowing to single-valued, keeping the smallest value per subject"
            );
        }
        move_values(&tx, &from.storage(), layout.storage(property))?;
        let keep: HashSet<&str> = layout.domain_index_tables(property).map(|t| t.name.as_str()).collect();
        for table in &from.domain_index_tables {
            if !keep.contains(table.as_str()) {
                drop_column(&tx, table, &from.column)?;
            }
        }
    }

    for table in layout.class_tables() {
        for column in table.columns.iter().filter(|c| c.domain_index) {
            ddl::fill_domain_index(&tx, layout, &table.name, column.property)?;
        }
    }

    ddl::sync_indexes(&tx, layout)?;
    if plan.contains(&SchemaChange::RebuildFulltext) {
        ddl::rebuild_fulltext(&tx, ontology, layout)?;
    }

    OntologySnapshot::capture(ontology, layout).store(&tx)?;
    journal::record(&tx, Operation::Migrate, plan.len() as u64, 0)?;
    let generation = bump_generation(&tx)?;
    tx.commit()?;

    tracing::info!(steps = plan.len(), generation, "ontology evolved");
    Ok(Some(generation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collation::{self, Locale};
    use crate::db::migrations::run_migrations;
    use crate::db::schema::{get_generation, init_schema};
    use crate::error::{Error, OntologyError};
    use crate::ontology::{vocab, PropertyDefinition};
    use crate::schema::derive_schema;

    const EX: &str = "http://example.org/ex#";

    fn ex(local: &str) -> String {
        format!("{EX}{local}")
    }

    fn xsd(local: &str) -> String {
        format!("{}{local}", vocab::XSD)
    }

    /// An `ex:Item` ontology whose `ex:label` is built by `label`.
    fn build(label: impl FnOnce(PropertyDefinition) -> PropertyDefinition, range: &str) -> (Ontology, SchemaLayout) {
        let mut o = Ontology::new();
        o.add_namespace("ex", EX).unwrap();
        o.register_class(&ex("Item"), &[o.resource_class()]).unwrap();
        o.register_property(&PropertyDefinition::new(ex("code"), ex("Item"), xsd("integer")).single_valued())
            .unwrap();
        o.register_property(&label(PropertyDefinition::new(ex("label"), ex("Item"), xsd(range))))
            .unwrap();
        let mut uris: Vec<String> = Vec::new();
        o.bind_numeric_ids::<OntologyError>(|uri| {
            uris.push(uri.to_string());
            Ok(uris.len() as i64)
        })
        .unwrap();
        o.freeze();
        let layout = derive_schema(&o).unwrap();
        (o, layout)
    }

    fn fresh(o: &Ontology, layout: &SchemaLayout) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        collation::register(&conn, &Locale::new("C")).unwrap();
        init_schema(&conn).unwrap();
        run_migrations(&conn).unwrap();
        ddl::create_schema(&conn, o, layout).unwrap();
        OntologySnapshot::capture(o, layout).store(&conn).unwrap();
        conn
    }

    fn evolve(conn: &Connection, o: &Ontology, layout: &SchemaLayout, allow: bool) -> Result<Vec<SchemaChange>> {
        let prev = OntologySnapshot::load(conn).unwrap().unwrap();
        let plan = plan_evolution(&prev, o, layout, allow, |p| property_has_values(conn, p))?;
        apply_plan(conn, o, layout, &plan)?;
        Ok(plan)
    }

    fn values(conn: &Connection, sql: &str) -> Vec<String> {
        conn.prepare(sql)
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn snapshot_survives_json() {
        let (o, layout) = build(|p| p, "string");
        let snap = OntologySnapshot::capture(&o, &layout);
        assert_eq!(OntologySnapshot::from_json(&snap.to_json().unwrap()).unwrap(), snap);
        assert!(matches!(
            OntologySnapshot::from_json("{not json"),
            Err(Error::Schema(SchemaError::CorruptSnapshot(_)))
        ));
    }

    #[test]
    fn identical_ontology_plans_nothing() {
        let (o, layout) = build(|p| p, "string");
        let conn = fresh(&o, &layout);
        assert!(evolve(&conn, &o, &layout, false).unwrap().is_empty());
        assert_eq!(get_generation(&conn).unwrap(), 0);
    }

    #[test]
    fn widening_moves_column_values_into_a_table() {
        let (o1, l1) = build(|p| p.single_valued(), "string");
        let conn = fresh(&o1, &l1);
        conn.execute_batch("INSERT INTO \"ex:Item\" (ID, \"ex:label\") VALUES (50, 'first')").unwrap();

        let (o2, l2) = build(|p| p, "string");
        let plan = evolve(&conn, &o2, &l2, false).unwrap();
        assert!(matches!(plan[0], SchemaChange::WidenToMultiValued { .. }));
        assert_eq!(values(&conn, "SELECT \"ex:label\" FROM \"ex:Item_ex:label\""), ["first"]);
        assert!(!ddl::table_columns(&conn, "ex:Item").unwrap().contains("ex:label"));
        assert_eq!(get_generation(&conn).unwrap(), 1);
    }

    #[test]
    fn narrowing_a_populated_property_needs_permission() {
        let (o1, l1) = build(|p| p, "string");
        let conn = fresh(&o1, &l1);
        conn.execute_batch("INSERT INTO \"ex:Item_ex:label\" (ID, \"ex:label\") VALUES (50, 'b'), (50, 'a')")
            .unwrap();

        let (o2, l2) = build(|p| p.single_valued(), "string");
        let err = evolve(&conn, &o2, &l2, false).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnmappableCardinalityChange { .. })));
        assert_eq!(get_generation(&conn).unwrap(), 0);

        evolve(&conn, &o2, &l2, true).unwrap();
        assert_eq!(values(&conn, "SELECT \"ex:label\" FROM \"ex:Item\" WHERE ID = 50"), ["a"]);
        assert!(!ddl::table_exists(&conn, "ex:Item_ex:label").unwrap());
    }

    #[test]
    fn narrowing_an_empty_property_is_free() {
        let (o1, l1) = build(|p| p, "string");
        let conn = fresh(&o1, &l1);
        let (o2, l2) = build(|p| p.single_valued(), "string");
        let plan = evolve(&conn, &o2, &l2, false).unwrap();
        assert!(plan.iter().any(|c| matches!(c, SchemaChange::NarrowToSingleValued { destructive: false, .. })));
    }

    #[test]
    fn retyping_a_populated_property_is_refused() {
        let (o1, l1) = build(|p| p.single_valued(), "string");
        let conn = fresh(&o1, &l1);
        conn.execute_batch("INSERT INTO \"ex:Item\" (ID, \"ex:label\") VALUES (50, 'x')").unwrap();
        let (o2, l2) = build(|p| p.single_valued(), "integer");
        let err = evolve(&conn, &o2, &l2, false).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::UnmappableTypeChange { .. })));
    }

    #[test]
    fn index_flag_changes_sync_indexes() {
        let (o1, l1) = build(|p| p.single_valued(), "string");
        let conn = fresh(&o1, &l1);
        let (o2, l2) = build(|p| p.single_valued().indexed(), "string");
        let plan = evolve(&conn, &o2, &l2, false).unwrap();
        assert_eq!(plan, [SchemaChange::UpdateIndexes]);
        assert!(ddl::existing_indexes(&conn).unwrap().contains(&"ix:ex:Item_ex:label".to_string()));
    }

    #[test]
    fn turning_on_fulltext_rebuilds_the_index() {
        let (o1, l1) = build(|p| p.single_valued(), "string");
        let conn = fresh(&o1, &l1);
        conn.execute_batch("INSERT INTO \"ex:Item\" (ID, \"ex:label\") VALUES (50, 'searchable words')").unwrap();
        let (o2, l2) = build(|p| p.single_valued().fulltext(), "string");
        let plan = evolve(&conn, &o2, &l2, false).unwrap();
        assert!(plan.contains(&SchemaChange::RebuildFulltext));
        let hit: i64 = conn
            .query_row("SELECT rowid FROM fts5 WHERE fts5 MATCH 'searchable'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(hit, 50);
    }
}

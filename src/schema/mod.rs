//! Relational layout derived from an ontology.
//!
//! Every class that owns single-valued properties (or domain-index columns) gets one
//! table keyed by resource ID, holding one column per single-valued property. Every
//! multi-valued property gets its own two-column `(ID, value)` table. Tables and
//! columns are named after the short names of their class and property, quoted.
//!
//! [`SchemaLayout`] is pure data; [`ddl`] turns it into statements and [`evolution`]
//! plans the move from one layout to the next.

pub mod ddl;
pub mod evolution;

use std::collections::HashMap;

use crate::error::{OntologyError, Result};
use crate::ontology::{ClassId, DataType, Ontology, PropertyId};

/// Table holding every subject, object, class and property URI.
pub const RESOURCE_TABLE: &str = "Resource";
/// Membership table of the built-in `rdf:type`.
pub const TYPE_TABLE: &str = "rdfs:Resource_rdf:type";
pub const TYPE_COLUMN: &str = "rdf:type";
pub const FTS_TABLE: &str = "fts5";
/// Name prefix of every index derived from the ontology.
pub const INDEX_PREFIX: &str = "ix:";
/// Collation applied to string columns.
pub const COLLATION: &str = "LOCALE";

/// Quote an SQL identifier.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub property: PropertyId,
    pub name: String,
    pub data_type: DataType,
    /// A denormalised copy of a property whose home table is an ancestor's.
    pub domain_index: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    pub class: ClassId,
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTable {
    pub property: PropertyId,
    pub name: String,
    pub column: String,
    pub data_type: DataType,
}

/// Where the values of one property live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// A column of the domain class table.
    Column { table: String, column: String },
    /// A dedicated `(ID, value)` table.
    Table { table: String, column: String },
}

impl Storage {
    pub fn table(&self) -> &str {
        match self {
            Self::Column { table, .. } | Self::Table { table, .. } => table,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Column { column, .. } | Self::Table { column, .. } => column,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    fn new(table: &str, columns: &[&str], unique: bool) -> Self {
        let suffix = columns.join("_");
        Self {
            name: format!("{INDEX_PREFIX}{table}_{suffix}"),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }
}

/// The complete physical layout for one ontology.
#[derive(Debug, Clone, Default)]
pub struct SchemaLayout {
    class_tables: Vec<ClassTable>,
    class_table_index: HashMap<ClassId, usize>,
    property_tables: Vec<PropertyTable>,
    storage: Vec<Storage>,
    indexes: Vec<IndexSpec>,
    fulltext: Vec<PropertyId>,
    descendant_ids: HashMap<ClassId, Vec<i64>>,
}

/// Derive the layout of `ontology`. Numeric ids must already be bound.
pub fn derive_schema(ontology: &Ontology) -> Result<SchemaLayout> {
    let mut layout = SchemaLayout::default();
    let mut storage = Vec::with_capacity(ontology.properties().len());

    for class in ontology.classes() {
        let mut columns: Vec<Column> = ontology
            .declared_properties(class.id())
            .filter(|p| !p.is_multi_valued())
            .map(|p| Column {
                property: p.id(),
                name: p.name().to_string(),
                data_type: p.data_type(),
                domain_index: false,
            })
            .collect();
        columns.extend(class.domain_indexes().iter().map(|&pid| {
            let p = ontology.property(pid);
            Column {
                property: pid,
                name: p.name().to_string(),
                data_type: p.data_type(),
                domain_index: true,
            }
        }));

        if !columns.is_empty() {
            layout.class_table_index.insert(class.id(), layout.class_tables.len());
            layout.class_tables.push(ClassTable {
                class: class.id(),
                name: class.name().to_string(),
                columns,
            });
        }

        let ids = ontology
            .descendants(class.id())
            .into_iter()
            .map(|c| {
                ontology.class(c).numeric_id().ok_or_else(|| OntologyError::UnknownClass {
                    uri: ontology.class(c).uri().to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        layout.descendant_ids.insert(class.id(), ids);
    }

    for property in ontology.properties() {
        let domain = ontology.class(property.domain());
        let entry = if property.is_multi_valued() {
            let table = format!("{}_{}", domain.name(), property.name());
            layout.property_tables.push(PropertyTable {
                property: property.id(),
                name: table.clone(),
                column: property.name().to_string(),
                data_type: property.data_type(),
            });
            layout.indexes.push(IndexSpec::new(&table, &["ID", property.name()], true));
            if property.indexed() {
                layout.indexes.push(IndexSpec::new(&table, &[property.name(), "ID"], false));
            }
            Storage::Table {
                table,
                column: property.name().to_string(),
            }
        } else {
            let table = domain.name().to_string();
            if property.indexed() {
                let mut columns = vec![property.name()];
                if let Some(secondary) = property.secondary_index() {
                    columns.push(ontology.property(secondary).name());
                }
                layout.indexes.push(IndexSpec::new(&table, &columns, false));
            }
            for &indexing in property.domain_indexes() {
                let indexing = ontology.class(indexing).name();
                layout.indexes.push(IndexSpec::new(indexing, &[property.name()], false));
            }
            Storage::Column {
                table,
                column: property.name().to_string(),
            }
        };
        storage.push(entry);

        if property.fulltext_indexed() {
            layout.fulltext.push(property.id());
        }
    }
    layout.storage = storage;

    tracing::debug!(
        class_tables = layout.class_tables.len(),
        property_tables = layout.property_tables.len(),
        indexes = layout.indexes.len(),
        "schema layout derived"
    );
    Ok(layout)
}

impl SchemaLayout {
    pub fn class_tables(&self) -> &[ClassTable] {
        &self.class_tables
    }

    pub fn property_tables(&self) -> &[PropertyTable] {
        &self.property_tables
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn class_table(&self, class: ClassId) -> Option<&ClassTable> {
        self.class_table_index.get(&class).map(|&i| &self.class_tables[i])
    }

    pub fn storage(&self, property: PropertyId) -> &Storage {
        &self.storage[property.index()]
    }

    /// Fulltext-indexed properties, in FTS column order.
    pub fn fulltext_properties(&self) -> &[PropertyId] {
        &self.fulltext
    }

    /// Numeric ids of `class` and all its descendants, for `rdf:type` filtering.
    pub fn class_with_descendant_ids(&self, class: ClassId) -> &[i64] {
        self.descendant_ids.get(&class).map_or(&[], Vec::as_slice)
    }

    /// Tables of `class` and every descendant that has one.
    pub fn table_set_for_class(&self, ontology: &Ontology, class: ClassId) -> Vec<&ClassTable> {
        ontology
            .descendants(class)
            .into_iter()
            .filter_map(|c| self.class_table(c))
            .collect()
    }

    /// Class tables that carry a denormalised copy of `property`.
    pub fn domain_index_tables(&self, property: PropertyId) -> impl Iterator<Item = &ClassTable> {
        self.class_tables
            .iter()
            .filter(move |t| t.columns.iter().any(|c| c.domain_index && c.property == property))
    }
}

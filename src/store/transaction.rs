//! Write transactions.
//!
//! A [`Transaction`] holds the store's write lock from `begin` until `commit`,
//! `rollback` or drop. Statements are written immediately inside an SQLite
//! `BEGIN IMMEDIATE` transaction; range, domain and inverse-functional checks that
//! depend on the final state run at commit, and any violation rolls everything back.

use std::collections::{BTreeSet, HashMap};
use std::sync::MutexGuard;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use tokio_util::sync::CancellationToken;

use super::Store;
use crate::cursor::{columns, Cursor};
use crate::db::journal::{self, Operation};
use crate::error::{ConstraintKind, ConstraintViolation, Error, ErrorKind, OntologyError, Result};
use crate::ontology::{ClassId, Ontology, Property, PropertyId, Range};
use crate::schema::{ddl, quote, SchemaLayout, Storage, FTS_TABLE, RESOURCE_TABLE};
use crate::value::{encode_literal, Term, BNODE_PREFIX};

/// A check that can only be decided once every statement of the transaction is in.
#[derive(Debug)]
enum Check {
    /// `resource` must be typed with `class` or one of its descendants.
    Typed {
        kind: ConstraintKind,
        subject: String,
        property: PropertyId,
        resource: i64,
        target: String,
        class: ClassId,
    },
    /// No other subject may hold `value` for `property`.
    Unique {
        subject: String,
        subject_id: i64,
        property: PropertyId,
        value: SqlValue,
    },
}

/// An open write transaction. Dropping it without committing rolls back.
pub struct Transaction<'s> {
    store: &'s Store,
    conn: MutexGuard<'s, Connection>,
    operation: Operation,
    ids: HashMap<String, i64>,
    fulltext: BTreeSet<i64>,
    checks: Vec<Check>,
    violations: Vec<ConstraintViolation>,
    inserted: u64,
    deleted: u64,
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub(super) fn begin(store: &'s Store, operation: Operation) -> Result<Self> {
        if store.options().readonly {
            return Err(Error::io(
                store.path(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "store is open read-only"),
            ));
        }
        let conn = store.lock_writer()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        tracing::debug!(operation = operation.as_str(), "transaction started");
        Ok(Self {
            store,
            conn,
            operation,
            ids: HashMap::new(),
            fulltext: BTreeSet::new(),
            checks: Vec::new(),
            violations: Vec::new(),
            inserted: 0,
            deleted: 0,
            finished: false,
        })
    }

    fn ontology(&self) -> &'s Ontology {
        let store: &'s Store = self.store;
        &store.inner.ontology
    }

    fn layout(&self) -> &'s SchemaLayout {
        let store: &'s Store = self.store;
        &store.inner.layout
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Statements written so far.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    fn resolve_property(&self, predicate: &str) -> Result<&'s Property> {
        let ontology = self.ontology();
        ontology
            .expand_name(predicate)
            .and_then(|uri| ontology.property_by_uri(&uri))
            .ok_or_else(|| {
                OntologyError::UnknownProperty {
                    uri: predicate.to_string(),
                }
                .into()
            })
    }

    fn resolve_class(&self, object: &Term) -> Result<ClassId> {
        let ontology = self.ontology();
        let name = object.as_resource().unwrap_or_default();
        ontology
            .expand_name(name)
            .and_then(|uri| ontology.class_by_uri(&uri))
            .map(|c| c.id())
            .ok_or_else(|| OntologyError::UnknownClass { uri: object.to_string() }.into())
    }

    fn resource_id(&mut self, uri: &str) -> Result<i64> {
        if let Some(&id) = self.ids.get(uri) {
            return Ok(id);
        }
        self.conn
            .prepare_cached("INSERT OR IGNORE INTO Resource (Uri) VALUES (?1)")?
            .execute([uri])?;
        let id: i64 = self
            .conn
            .prepare_cached("SELECT ID FROM Resource WHERE Uri = ?1")?
            .query_row([uri], |r| r.get(0))?;
        self.ids.insert(uri.to_string(), id);
        Ok(id)
    }

    fn lookup_id(&self, uri: &str) -> Result<Option<i64>> {
        if let Some(&id) = self.ids.get(uri) {
            return Ok(Some(id));
        }
        Ok(self
            .conn
            .prepare_cached("SELECT ID FROM Resource WHERE Uri = ?1")?
            .query_row([uri], |r| r.get(0))
            .optional()?)
    }

    fn violation(&mut self, kind: ConstraintKind, subject: &str, property: &Property, message: String) {
        tracing::debug!(%kind, subject, property = property.uri(), "constraint violation recorded");
        self.violations.push(ConstraintViolation {
            kind,
            subject: subject.to_string(),
            property: property.uri().to_string(),
            message,
        });
    }

    /// Insert one statement. `predicate` may be a full IRI or a prefixed name.
    pub fn insert(&mut self, subject: &str, predicate: &str, object: &Term) -> Result<()> {
        let property = self.resolve_property(predicate)?;
        if property.id() == self.ontology().rdf_type() {
            let class = self.resolve_class(object)?;
            let subject_id = self.resource_id(subject)?;
            return self.insert_type(subject_id, class);
        }

        let subject_id = self.resource_id(subject)?;
        let Some(value) = self.object_value(subject, property, object, true)? else {
            return Ok(());
        };

        let layout = self.layout();
        match layout.storage(property.id()) {
            Storage::Column { table, column } => {
                let existing: Option<SqlValue> = {
                    self.conn
                        .prepare_cached(&format!("INSERT OR IGNORE INTO {} (ID) VALUES (?1)", quote(table)))?
                        .execute([subject_id])?;
                    self.conn
                        .prepare_cached(&format!("SELECT {} FROM {} WHERE ID = ?1", quote(column), quote(table)))?
                        .query_row([subject_id], |r| r.get(0))
                        .optional()?
                };
                match existing {
                    Some(current) if current == value => return Ok(()),
                    Some(SqlValue::Null) | None => {}
                    Some(_) => {
                        self.violation(
                            ConstraintKind::Cardinality,
                            subject,
                            property,
                            format!("single-valued property already has a value, cannot add {object}"),
                        );
                        return Ok(());
                    }
                }
                self.conn
                    .prepare_cached(&format!("UPDATE {} SET {} = ?2 WHERE ID = ?1", quote(table), quote(column)))?
                    .execute(params![subject_id, value])?;
                for indexing in layout.domain_index_tables(property.id()) {
                    self.conn
                        .prepare_cached(&format!(
                            "UPDATE {} SET {} = ?2 WHERE ID = ?1",
                            quote(&indexing.name),
                            quote(column)
                        ))?
                        .execute(params![subject_id, value])?;
                }
                self.inserted += 1;
            }
            Storage::Table { table, column } => {
                let n = self
                    .conn
                    .prepare_cached(&format!(
                        "INSERT OR IGNORE INTO {} (ID, {}) VALUES (?1, ?2)",
                        quote(table),
                        quote(column)
                    ))?
                    .execute(params![subject_id, value])?;
                self.inserted += n as u64;
            }
        }

        let domain = property.domain();
        if domain != self.ontology().resource_class() {
            self.checks.push(Check::Typed {
                kind: ConstraintKind::Domain,
                subject: subject.to_string(),
                property: property.id(),
                resource: subject_id,
                target: subject.to_string(),
                class: domain,
            });
        }
        if property.inverse_functional() {
            self.checks.push(Check::Unique {
                subject: subject.to_string(),
                subject_id,
                property: property.id(),
                value,
            });
        }
        if property.fulltext_indexed() {
            self.fulltext.insert(subject_id);
        }
        Ok(())
    }

    /// The SQL value of `object` for `property`. On insert, a mismatch is recorded as a
    /// range violation; on delete it just means there is nothing to remove.
    fn object_value(&mut self, subject: &str, property: &'s Property, object: &Term, inserting: bool) -> Result<Option<SqlValue>> {
        let rejected = match (property.range(), object) {
            (Range::Class(class), Term::Iri(uri) | Term::BlankNode(uri)) => {
                let id = if inserting {
                    let id = self.resource_id(uri)?;
                    if class != self.ontology().resource_class() {
                        self.checks.push(Check::Typed {
                            kind: ConstraintKind::Range,
                            subject: subject.to_string(),
                            property: property.id(),
                            resource: id,
                            target: uri.clone(),
                            class,
                        });
                    }
                    Some(id)
                } else {
                    self.lookup_id(uri)?
                };
                return Ok(id.map(SqlValue::Integer));
            }
            (Range::Class(_), Term::Literal(_)) => format!("literal {object} given for a resource property"),
            (Range::Literal(data_type), Term::Literal(literal)) => match encode_literal(data_type, literal) {
                Ok(value) => return Ok(Some(value)),
                Err(reason) => reason,
            },
            (Range::Literal(data_type), _) => format!("resource {object} given for a {data_type} property"),
        };
        if inserting {
            self.violation(ConstraintKind::Range, subject, property, rejected);
        }
        Ok(None)
    }

    /// Type `subject_id` with `class` and all its ancestors.
    fn insert_type(&mut self, subject_id: i64, class: ClassId) -> Result<()> {
        let ontology = self.ontology();
        let layout = self.layout();
        let type_storage = layout.storage(ontology.rdf_type());

        for ancestor in ontology.ancestors(class) {
            let Some(class_id) = ontology.class(ancestor).numeric_id() else {
                continue;
            };
            let n = self
                .conn
                .prepare_cached(&format!(
                    "INSERT OR IGNORE INTO {} (ID, {}) VALUES (?1, ?2)",
                    quote(type_storage.table()),
                    quote(type_storage.column())
                ))?
                .execute([subject_id, class_id])?;
            self.inserted += n as u64;

            let Some(table) = layout.class_table(ancestor) else {
                continue;
            };
            self.conn
                .prepare_cached(&format!("INSERT OR IGNORE INTO {} (ID) VALUES (?1)", quote(&table.name)))?
                .execute([subject_id])?;
            for column in table.columns.iter().filter(|c| c.domain_index) {
                let home = layout.storage(column.property);
                self.conn
                    .prepare_cached(&format!(
                        "UPDATE {t} SET {c} = (SELECT h.{c} FROM {h} AS h WHERE h.ID = ?1) WHERE ID = ?1",
                        t = quote(&table.name),
                        c = quote(&column.name),
                        h = quote(home.table()),
                    ))?
                    .execute([subject_id])?;
            }
        }
        Ok(())
    }

    /// Delete one statement. Deleting something that is not there is not an error.
    pub fn delete(&mut self, subject: &str, predicate: &str, object: &Term) -> Result<()> {
        let property = self.resolve_property(predicate)?;
        let is_type = property.id() == self.ontology().rdf_type();
        let class = if is_type { Some(self.resolve_class(object)?) } else { None };
        let Some(subject_id) = self.lookup_id(subject)? else {
            return Ok(());
        };
        if let Some(class) = class {
            return self.delete_type(subject_id, class);
        }

        let Some(value) = self.object_value(subject, property, object, false)? else {
            return Ok(());
        };
        let layout = self.layout();
        let storage = layout.storage(property.id());
        let n = match storage {
            Storage::Column { table, column } => {
                let n = self
                    .conn
                    .prepare_cached(&format!(
                        "UPDATE {t} SET {c} = NULL WHERE ID = ?1 AND {c} = ?2",
                        t = quote(table),
                        c = quote(column)
                    ))?
                    .execute(params![subject_id, value])?;
                if n > 0 {
                    for indexing in layout.domain_index_tables(property.id()) {
                        self.conn
                            .prepare_cached(&format!(
                                "UPDATE {} SET {} = NULL WHERE ID = ?1",
                                quote(&indexing.name),
                                quote(column)
                            ))?
                            .execute([subject_id])?;
                    }
                }
                n
            }
            Storage::Table { table, column } => self
                .conn
                .prepare_cached(&format!(
                    "DELETE FROM {} WHERE ID = ?1 AND {} = ?2",
                    quote(table),
                    quote(column)
                ))?
                .execute(params![subject_id, value])?,
        };
        self.deleted += n as u64;
        if n > 0 && property.fulltext_indexed() {
            self.fulltext.insert(subject_id);
        }
        Ok(())
    }

    /// Remove `class` and every descendant from the subject, with the values the
    /// subject held through those classes.
    fn delete_type(&mut self, subject_id: i64, class: ClassId) -> Result<()> {
        let ontology = self.ontology();
        let layout = self.layout();
        let type_storage = layout.storage(ontology.rdf_type());

        for descendant in ontology.descendants(class) {
            let Some(class_id) = ontology.class(descendant).numeric_id() else {
                continue;
            };
            let n = self
                .conn
                .prepare_cached(&format!(
                    "DELETE FROM {} WHERE ID = ?1 AND {} = ?2",
                    quote(type_storage.table()),
                    quote(type_storage.column())
                ))?
                .execute([subject_id, class_id])?;
            if n == 0 {
                continue;
            }
            self.deleted += n as u64;

            if let Some(table) = layout.class_table(descendant) {
                self.conn
                    .prepare_cached(&format!("DELETE FROM {} WHERE ID = ?1", quote(&table.name)))?
                    .execute([subject_id])?;
            }
            for property in ontology.declared_properties(descendant) {
                if property.fulltext_indexed() {
                    self.fulltext.insert(subject_id);
                }
                if property.id() == ontology.rdf_type() {
                    continue;
                }
                if let Storage::Table { table, .. } = layout.storage(property.id()) {
                    self.deleted += self
                        .conn
                        .prepare_cached(&format!("DELETE FROM {} WHERE ID = ?1", quote(table)))?
                        .execute([subject_id])? as u64;
                }
            }
        }
        Ok(())
    }

    /// Insert every statement a cursor yields. Blank nodes become `urn:bnode:` IRIs,
    /// consistently within this call.
    pub fn insert_from_cursor(&mut self, cursor: &mut dyn Cursor, cancel: Option<&CancellationToken>) -> Result<u64> {
        let mut blanks: HashMap<String, String> = HashMap::new();
        let mut skolem = |id: &str| -> String {
            blanks
                .entry(id.to_string())
                .or_insert_with(|| format!("{BNODE_PREFIX}{}", uuid::Uuid::now_v7()))
                .clone()
        };

        let mut count = 0;
        while cursor.next()? {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::info!(statements = count, "load cancelled");
                return Err(Error::Cancelled);
            }
            let (Some(subject), Some(predicate), Some(object)) = (
                Term::from_cursor(&*cursor, columns::SUBJECT),
                cursor.get_string(columns::PREDICATE).map(str::to_string),
                Term::from_cursor(&*cursor, columns::OBJECT),
            ) else {
                continue;
            };

            let subject = match subject {
                Term::Iri(iri) => iri,
                Term::BlankNode(id) => skolem(&id),
                Term::Literal(_) => {
                    tracing::warn!(location = ?cursor.get_parser_location(), "skipping statement with a literal subject");
                    continue;
                }
            };
            let object = match object {
                Term::BlankNode(id) => Term::Iri(skolem(&id)),
                other => other,
            };

            if let Err(e) = self.insert(&subject, &predicate, &object) {
                if let Some(location) = cursor.get_parser_location() {
                    tracing::error!(%location, error = %e, "statement rejected");
                }
                return Err(e);
            }
            count += 1;
        }
        Ok(count)
    }

    /// Empty every data table, keeping the ontology's own resource rows.
    pub(crate) fn clear_all(&mut self) -> Result<()> {
        let ontology = self.ontology();
        let layout = self.layout();

        for table in layout.class_tables() {
            self.conn.execute(&format!("DELETE FROM {}", quote(&table.name)), [])?;
        }
        for table in layout.property_tables() {
            self.deleted += self.conn.execute(&format!("DELETE FROM {}", quote(&table.name)), [])? as u64;
        }
        if ddl::table_exists(&self.conn, FTS_TABLE)? {
            self.conn.execute(&format!("DELETE FROM {FTS_TABLE}"), [])?;
        }

        let keep: Vec<String> = ontology
            .classes()
            .iter()
            .filter_map(|c| c.numeric_id())
            .chain(ontology.properties().iter().filter_map(|p| p.numeric_id()))
            .map(|id| id.to_string())
            .collect();
        self.conn.execute(
            &format!("DELETE FROM {RESOURCE_TABLE} WHERE ID NOT IN ({})", keep.join(", ")),
            [],
        )?;
        self.ids.clear();
        self.fulltext.clear();
        tracing::info!(deleted = self.deleted, "store cleared");
        Ok(())
    }

    fn run_checks(&mut self) -> Result<()> {
        let ontology = self.ontology();
        let layout = self.layout();
        let type_storage = layout.storage(ontology.rdf_type());

        for check in std::mem::take(&mut self.checks) {
            match check {
                Check::Typed {
                    kind,
                    subject,
                    property,
                    resource,
                    target,
                    class,
                } => {
                    let ids: Vec<String> = layout
                        .class_with_descendant_ids(class)
                        .iter()
                        .map(i64::to_string)
                        .collect();
                    let typed: bool = self.conn.query_row(
                        &format!(
                            "SELECT EXISTS(SELECT 1 FROM {} WHERE ID = ?1 AND {} IN ({}))",
                            quote(type_storage.table()),
                            quote(type_storage.column()),
                            ids.join(", ")
                        ),
                        [resource],
                        |r| r.get(0),
                    )?;
                    if !typed {
                        let class = ontology.class(class).uri();
                        self.violation(
                            kind,
                            &subject,
                            ontology.property(property),
                            format!("<{target}> is not an instance of <{class}>"),
                        );
                    }
                }
                Check::Unique {
                    subject,
                    subject_id,
                    property,
                    value,
                } => {
                    let storage = layout.storage(property);
                    let taken: bool = self.conn.query_row(
                        &format!(
                            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1 AND ID != ?2)",
                            quote(storage.table()),
                            quote(storage.column())
                        ),
                        params![value, subject_id],
                        |r| r.get(0),
                    )?;
                    if taken {
                        self.violation(
                            ConstraintKind::InverseFunctional,
                            &subject,
                            ontology.property(property),
                            "value is already used by another subject".into(),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.run_checks()?;
        if let Some(first) = self.violations.first() {
            return Err(first.clone().into());
        }
        let touched = std::mem::take(&mut self.fulltext);
        ddl::refresh_fulltext(&self.conn, self.ontology(), self.layout(), touched)?;
        journal::record(&self.conn, self.operation, self.inserted, self.deleted)?;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Make the transaction's writes visible, or roll them all back on failure.
    pub fn commit(mut self) -> Result<()> {
        let result = self.flush();
        match &result {
            Ok(()) => {
                self.finished = true;
                tracing::info!(
                    operation = self.operation.as_str(),
                    inserted = self.inserted,
                    deleted = self.deleted,
                    "transaction committed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, violations = self.violations.len(), "commit failed, rolling back");
                self.abort();
                if e.kind() == ErrorKind::Integrity {
                    self.store.mark_corrupted(&e.to_string());
                }
            }
        }
        result
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        tracing::info!(operation = self.operation.as_str(), "transaction rolled back");
        Ok(())
    }

    fn abort(&mut self) {
        self.finished = true;
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(operation = self.operation.as_str(), "transaction dropped without commit");
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::open;

    fn count(store: &Store, sql: &str) -> i64 {
        let conn = store.open_readonly_connection().unwrap();
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    fn person(tx: &mut Transaction<'_>, uri: &str) {
        tx.insert(uri, "rdf:type", &Term::iri("http://example.org/ex#Person")).unwrap();
    }

    #[test]
    fn commit_writes_values_and_journal() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        person(&mut tx, "urn:1");
        tx.insert("urn:1", "ex:name", &Term::string("Alice")).unwrap();
        tx.insert("urn:1", "ex:nick", &Term::string("al")).unwrap();
        tx.insert("urn:1", "ex:nick", &Term::string("ally")).unwrap();
        tx.commit().unwrap();

        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person" WHERE "ex:name" = 'Alice'"#), 1);
        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person_ex:nick""#), 2);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM fts5 WHERE fts5 MATCH 'alice'"), 1);
        let journal = store.journal(1).unwrap();
        assert_eq!(journal[0].operation, Operation::Update);
        assert_eq!(journal[0].inserted, 5);
    }

    #[test]
    fn second_value_of_single_valued_property_is_rejected() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        person(&mut tx, "urn:1");
        tx.insert("urn:1", "ex:age", &Term::integer(30)).unwrap();
        tx.insert("urn:1", "ex:age", &Term::integer(30)).unwrap();
        tx.insert("urn:1", "ex:age", &Term::integer(31)).unwrap();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(err.to_string().contains("cardinality"), "{err}");
        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person""#), 0);
    }

    #[test]
    fn unparseable_literal_is_a_range_violation() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        person(&mut tx, "urn:1");
        tx.insert("urn:1", "ex:age", &Term::string("thirty")).unwrap();
        let Err(Error::ConstraintViolation(v)) = tx.commit() else {
            panic!("expected a constraint violation");
        };
        assert_eq!(v.kind, ConstraintKind::Range);
        assert_eq!(v.property, "http://example.org/ex#age");
    }

    #[test]
    fn resource_object_must_have_the_range_type() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        tx.insert("urn:e", "rdf:type", &Term::iri("http://example.org/ex#Employee")).unwrap();
        tx.insert("urn:e", "ex:boss", &Term::iri("urn:nobody")).unwrap();
        let Err(Error::ConstraintViolation(v)) = tx.commit() else {
            panic!("expected a constraint violation");
        };
        assert_eq!(v.kind, ConstraintKind::Range);

        let mut tx = store.begin().unwrap();
        tx.insert("urn:e", "rdf:type", &Term::iri("http://example.org/ex#Employee")).unwrap();
        tx.insert("urn:e", "ex:boss", &Term::iri("urn:b")).unwrap();
        // Typing the object later in the same transaction is enough.
        person(&mut tx, "urn:b");
        tx.commit().unwrap();
    }

    #[test]
    fn untyped_subject_breaks_the_domain() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        tx.insert("urn:1", "ex:nick", &Term::string("x")).unwrap();
        let Err(Error::ConstraintViolation(v)) = tx.commit() else {
            panic!("expected a constraint violation");
        };
        assert_eq!(v.kind, ConstraintKind::Domain);
    }

    #[test]
    fn inverse_functional_values_are_unique() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        person(&mut tx, "urn:1");
        person(&mut tx, "urn:2");
        tx.insert("urn:1", "ex:email", &Term::string("a@example.org")).unwrap();
        tx.insert("urn:2", "ex:email", &Term::string("a@example.org")).unwrap();
        let Err(Error::ConstraintViolation(v)) = tx.commit() else {
            panic!("expected a constraint violation");
        };
        assert_eq!(v.kind, ConstraintKind::InverseFunctional);
    }

    #[test]
    fn unknown_predicate_fails_immediately() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        let err = tx.insert("urn:1", "ex:missing", &Term::string("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ontology);
    }

    #[test]
    fn deleting_a_type_drops_subclass_rows() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        tx.insert("urn:e", "rdf:type", &Term::iri("http://example.org/ex#Employee")).unwrap();
        tx.insert("urn:e", "ex:name", &Term::string("Eve")).unwrap();
        tx.insert("urn:e", "ex:nick", &Term::string("e")).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        tx.delete("urn:e", "rdf:type", &Term::iri("http://example.org/ex#Person")).unwrap();
        tx.commit().unwrap();

        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person""#), 0);
        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person_ex:nick""#), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM fts5"), 0);
    }

    #[test]
    fn deleting_a_value_clears_the_column() {
        let (_tmp, store) = open();
        let mut tx = store.begin().unwrap();
        person(&mut tx, "urn:1");
        tx.insert("urn:1", "ex:age", &Term::integer(30)).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        tx.delete("urn:1", "ex:age", &Term::integer(29)).unwrap();
        tx.delete("urn:nobody", "ex:age", &Term::integer(30)).unwrap();
        assert_eq!(tx.deleted(), 0);
        tx.delete("urn:1", "ex:age", &Term::integer(30)).unwrap();
        assert_eq!(tx.deleted(), 1);
        tx.commit().unwrap();
        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person" WHERE "ex:age" IS NOT NULL"#), 0);
    }

    #[test]
    fn dropped_transaction_rolls_back_and_releases_the_lock() {
        let (_tmp, store) = open();
        {
            let mut tx = store.begin().unwrap();
            person(&mut tx, "urn:1");
        }
        assert_eq!(count(&store, r#"SELECT COUNT(*) FROM "ex:Person""#), 0);
        store.begin().unwrap().rollback().unwrap();
    }

    #[test]
    fn blank_nodes_are_skolemised_once_per_load() {
        use crate::cursor::{Cell, MemoryCursor, ValueType};

        let (_tmp, store) = open();
        let mut cursor = MemoryCursor::new(
            ["subject", "predicate", "object", "graph"].map(String::from).to_vec(),
            vec![
                vec![
                    Cell::new(ValueType::BlankNode, "b0"),
                    Cell::uri(crate::ontology::vocab::RDF_TYPE),
                    Cell::uri("http://example.org/ex#Person"),
                    Cell::default(),
                ],
                vec![
                    Cell::new(ValueType::BlankNode, "b0"),
                    Cell::uri("http://example.org/ex#name"),
                    Cell::string("Anon"),
                    Cell::default(),
                ],
            ],
        );
        let mut tx = store.begin().unwrap();
        assert_eq!(tx.insert_from_cursor(&mut cursor, None).unwrap(), 2);
        tx.commit().unwrap();

        let uri: String = store
            .open_readonly_connection()
            .unwrap()
            .query_row(
                r#"SELECT r.Uri FROM "ex:Person" p JOIN Resource r ON r.ID = p.ID WHERE p."ex:name" = 'Anon'"#,
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(uri.starts_with(BNODE_PREFIX), "{uri}");
    }
}

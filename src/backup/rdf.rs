//! Logical backups as Turtle.
//!
//! Export walks the storage of every property and streams one triple per stored
//! value. Restore clears the store and reinserts through a normal transaction, so a
//! backup that breaks the current ontology's constraints is rejected as a whole.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use oxrdf::{Literal, NamedNode, Term as RdfTerm, Triple};
use oxrdfio::{RdfFormat, RdfSerializer};
use tokio_util::sync::CancellationToken;

use super::partial_path;
use crate::cursor::{Cursor, RdfFileCursor, SqlCursor, ValueType};
use crate::db::journal::Operation;
use crate::error::{BackupStage, Error, FormatError, Result, SourceLocation};
use crate::ontology::{DataType, Property};
use crate::schema::{quote, SchemaLayout, RESOURCE_TABLE};
use crate::store::Store;

/// `SELECT subject-uri, value` over the storage of `property`.
fn statements_sql(layout: &SchemaLayout, property: &Property) -> String {
    let storage = layout.storage(property.id());
    let value = if property.data_type() == DataType::Resource {
        format!("(SELECT o.Uri FROM {RESOURCE_TABLE} AS o WHERE o.ID = v.{})", quote(storage.column()))
    } else {
        format!("v.{}", quote(storage.column()))
    };
    format!(
        "SELECT r.Uri, {value} FROM {t} AS v JOIN {RESOURCE_TABLE} AS r ON r.ID = v.ID \
         WHERE v.{c} IS NOT NULL ORDER BY v.ID",
        t = quote(storage.table()),
        c = quote(storage.column()),
    )
}

/// The object of the current row as an RDF term.
fn object_term(cursor: &dyn Cursor) -> Option<RdfTerm> {
    let text = cursor.get_string(1)?;
    Some(match cursor.get_value_type(1) {
        ValueType::Unbound => return None,
        ValueType::Uri => NamedNode::new_unchecked(text).into(),
        _ => match (cursor.get_language(1), cursor.get_datatype(1)) {
            (Some(lang), _) => Literal::new_language_tagged_literal_unchecked(text, lang.to_ascii_lowercase()).into(),
            (None, None) => Literal::new_simple_literal(text).into(),
            (None, Some(dt)) if dt == DataType::String.datatype_iri().unwrap_or_default() => {
                Literal::new_simple_literal(text).into()
            }
            (None, Some(dt)) => Literal::new_typed_literal(text, NamedNode::new_unchecked(dt)).into(),
        },
    })
}

/// Write every stored statement to `dest` as Turtle. Returns the statement count.
pub fn export_to(store: &Store, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
    let partial = partial_path(dest);
    let result = write_turtle(store, &partial, cancel).and_then(|n| {
        std::fs::rename(&partial, dest).map_err(|e| Error::io(dest, e).at_stage(BackupStage::Finalize))?;
        Ok(n)
    });
    if result.is_err() && partial.exists() {
        if let Err(e) = std::fs::remove_file(&partial) {
            tracing::warn!(path = %partial.display(), error = %e, "could not remove partial export");
        }
    }
    result
}

fn write_turtle(store: &Store, partial: &Path, cancel: &CancellationToken) -> Result<u64> {
    let reader = store.reader().map_err(|e| e.at_stage(BackupStage::OpenSource))?;
    let ontology = reader.ontology();

    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (prefix, base) in ontology.namespaces().iter() {
        serializer = serializer.with_prefix(prefix, base).map_err(|e| {
            Error::from(FormatError::Syntax {
                location: SourceLocation::default(),
                message: format!("invalid namespace {prefix}: {base}: {e}"),
            })
        })?;
    }

    let file = File::create(partial).map_err(|e| Error::io(partial, e).at_stage(BackupStage::OpenDestination))?;
    let mut writer = serializer.for_writer(BufWriter::new(file));
    let io_err = |e: std::io::Error| Error::io(partial, e).at_stage(BackupStage::CopyPages);

    let mut count = 0u64;
    for property in ontology.properties() {
        let predicate = NamedNode::new_unchecked(property.uri());
        let mut stmt = reader.connection().prepare(&statements_sql(reader.layout(), property))?;
        let rows = stmt.query([])?;
        let mut cursor = SqlCursor::new(
            rows,
            vec!["subject".into(), "object".into()],
            vec![DataType::Resource, property.data_type()],
        )
        .with_cancellation(cancel.clone());

        while cursor.next()? {
            let (Some(subject), Some(object)) = (cursor.get_string(0), object_term(&cursor)) else {
                continue;
            };
            let triple = Triple::new(NamedNode::new_unchecked(subject), predicate.clone(), object);
            writer.serialize_triple(&triple).map_err(io_err)?;
            count += 1;
        }
        tracing::debug!(property = property.uri(), statements = count, "property exported");
    }

    let mut out = writer.finish().map_err(io_err)?;
    out.flush().map_err(io_err)?;
    out.get_ref().sync_all().map_err(io_err)?;
    Ok(count)
}

/// Replace the store's data with the statements of the Turtle file at `src`.
pub fn restore_from(store: &Store, src: &Path, cancel: &CancellationToken) -> Result<u64> {
    let mut cursor = RdfFileCursor::with_format(src, RdfFormat::Turtle)?;
    let mut tx = store.begin_with(Operation::Restore)?;
    tx.clear_all()?;
    let n = tx.insert_from_cursor(&mut cursor, Some(cancel))?;
    tx.commit()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;
    use crate::value::Term;

    fn populate(store: &Store) {
        let mut tx = store.begin().unwrap();
        tx.insert("urn:1", "rdf:type", &Term::iri("http://example.org/ex#Person")).unwrap();
        tx.insert("urn:1", "ex:name", &Term::string("Zoë")).unwrap();
        tx.insert("urn:1", "ex:age", &Term::integer(41)).unwrap();
        tx.insert("urn:1", "ex:nick", &Term::string("z")).unwrap();
        tx.insert("urn:2", "rdf:type", &Term::iri("http://example.org/ex#Employee")).unwrap();
        tx.insert("urn:2", "ex:boss", &Term::iri("urn:1")).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn export_writes_every_statement() {
        let (tmp, store) = fixtures::open();
        populate(&store);
        let dest = tmp.path().join("dump.ttl");
        let n = export_to(&store, &dest, &CancellationToken::new()).unwrap();
        // Two type rows for urn:1, three for urn:2, four values.
        assert_eq!(n, 9);

        let text = std::fs::read_to_string(&dest).unwrap();
        assert!(text.contains("@prefix ex:"), "{text}");
        assert!(text.contains("\"Zoë\""), "{text}");
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn cancelled_export_leaves_no_file() {
        let (tmp, store) = fixtures::open();
        populate(&store);
        let dest = tmp.path().join("dump.ttl");
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(export_to(&store, &dest, &token), Err(Error::Cancelled)));
        assert!(!dest.exists());
    }
}

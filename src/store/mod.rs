//! The store handle.
//!
//! [`Store::open`] runs the initialization gate (version check, integrity repair,
//! format migrations, ontology evolution, locale reindex) and returns a cheaply
//! cloneable handle. Writes go through a single [`Transaction`] at a time; reads use
//! independent read-only connections from [`Store::reader`].

mod init;
mod reader;
mod transaction;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cursor::open_sources;
use crate::db::collation::Locale;
use crate::db::journal::{self, Operation};
use crate::db::{self, migrations, schema as meta};
use crate::error::{Error, Result};
use crate::ontology::Ontology;
use crate::query::{PatternCompiler, QueryCompiler};
use crate::schema::{quote, SchemaLayout, RESOURCE_TABLE, TYPE_TABLE};
use crate::value::Term;

pub use reader::{PreparedQuery, Reader};
pub use transaction::Transaction;

/// Pages copied per step of a binary backup.
pub const DEFAULT_PAGE_STEP: i32 = 256;
pub const DEFAULT_DB_NAME: &str = "meta.db";

/// Everything [`Store::open`] needs to know.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub data_dir: PathBuf,
    pub db_name: String,
    /// Ontology files or directories, merged in order.
    pub ontology_sources: Vec<PathBuf>,
    /// RDF files or directories loaded once, when the store is created.
    pub data_sources: Vec<PathBuf>,
    pub busy_timeout: Duration,
    pub readonly: bool,
    pub allow_destructive_migration: bool,
    pub page_step: i32,
    /// Collation locale. Defaults to the process locale.
    pub locale: Option<Locale>,
}

impl StoreOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_name: DEFAULT_DB_NAME.into(),
            ontology_sources: Vec::new(),
            data_sources: Vec::new(),
            busy_timeout: Duration::from_secs(5),
            readonly: false,
            allow_destructive_migration: false,
            page_step: DEFAULT_PAGE_STEP,
            locale: None,
        }
    }

    pub fn with_ontology(mut self, source: impl Into<PathBuf>) -> Self {
        self.ontology_sources.push(source.into());
        self
    }

    pub fn with_data(mut self, source: impl Into<PathBuf>) -> Self {
        self.data_sources.push(source.into());
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn allow_destructive_migration(mut self) -> Self {
        self.allow_destructive_migration = true;
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    /// The marker left behind when an integrity check could not be repaired.
    pub fn sentinel_path(&self) -> PathBuf {
        self.data_dir.join(format!(".{}.corrupted", self.db_name))
    }
}

/// Diagnostics returned by [`Store::check_health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub path: PathBuf,
    pub file_size: u64,
    pub schema_version: u32,
    pub generation: u64,
    pub locale: String,
    /// `None` when `PRAGMA integrity_check` reports no problems.
    pub integrity: Option<String>,
    pub classes: usize,
    pub properties: usize,
    pub resources: i64,
    pub typed_resources: i64,
    pub transactions: i64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.integrity.is_none()
    }
}

/// Shared handle to an open store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    options: StoreOptions,
    db_path: PathBuf,
    locale: Locale,
    ontology: Arc<Ontology>,
    layout: Arc<SchemaLayout>,
    compiler: Arc<dyn QueryCompiler>,
    writer: Mutex<Connection>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if self.options.readonly {
            return;
        }
        let conn = match self.writer.get_mut() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = db::checkpoint(conn) {
            tracing::warn!(error = %e, "WAL checkpoint on close failed");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.db_path)
            .field("readonly", &self.inner.options.readonly)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create the store described by `options`.
    pub fn open(options: StoreOptions) -> Result<Self> {
        Self::open_with_compiler(options, Arc::new(PatternCompiler))
    }

    /// Like [`Store::open`], compiling queries with `compiler`.
    pub fn open_with_compiler(options: StoreOptions, compiler: Arc<dyn QueryCompiler>) -> Result<Self> {
        init::open(options, compiler)
    }

    pub fn ontology(&self) -> &Ontology {
        &self.inner.ontology
    }

    pub fn layout(&self) -> &SchemaLayout {
        &self.inner.layout
    }

    pub fn path(&self) -> &Path {
        &self.inner.db_path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn locale(&self) -> &Locale {
        &self.inner.locale
    }

    /// Start a write transaction, waiting up to the busy timeout for the write lock.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self, Operation::Update)
    }

    pub(crate) fn begin_with(&self, operation: Operation) -> Result<Transaction<'_>> {
        Transaction::begin(self, operation)
    }

    /// Open an independent read-only connection.
    pub fn reader(&self) -> Result<Reader> {
        let conn = self.open_readonly_connection()?;
        Ok(Reader::new(
            conn,
            Arc::clone(&self.inner.ontology),
            Arc::clone(&self.inner.layout),
            Arc::clone(&self.inner.compiler),
        ))
    }

    /// Run a query and copy every row out as strings.
    pub fn query(&self, text: &str, bindings: &[(&str, Term)]) -> Result<Vec<Vec<Option<String>>>> {
        let reader = self.reader()?;
        let mut query = reader.prepare(text, bindings)?;
        let rows = query.cursor()?.collect_strings()?;
        Ok(rows)
    }

    /// Insert every statement of `sources` in one transaction.
    pub fn load_data(&self, sources: &[PathBuf], cancel: Option<&CancellationToken>) -> Result<u64> {
        let mut cursor = open_sources(sources)?;
        let mut tx = self.begin_with(Operation::Load)?;
        let n = tx.insert_from_cursor(&mut cursor, cancel)?;
        tx.commit()?;
        tracing::info!(statements = n, sources = sources.len(), "data loaded");
        Ok(n)
    }

    /// Full integrity check plus row counts.
    pub fn check_health(&self) -> Result<HealthReport> {
        let conn = self.open_readonly_connection()?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

        Ok(HealthReport {
            path: self.inner.db_path.clone(),
            file_size: std::fs::metadata(&self.inner.db_path).map(|m| m.len()).unwrap_or(0),
            schema_version: migrations::get_schema_version(&conn)?,
            generation: meta::get_generation(&conn)?,
            locale: meta::get_meta(&conn, meta::META_LOCALE)?.unwrap_or_default(),
            integrity: db::integrity_check(&conn, false)?,
            classes: self.inner.ontology.classes().len(),
            properties: self.inner.ontology.properties().len(),
            resources: count(&format!("SELECT COUNT(*) FROM {RESOURCE_TABLE}"))?,
            typed_resources: count(&format!("SELECT COUNT(DISTINCT ID) FROM {}", quote(TYPE_TABLE)))?,
            transactions: journal::count(&conn)?,
        })
    }

    /// Recent journal entries, newest first.
    pub fn journal(&self, limit: usize) -> Result<Vec<journal::JournalEntry>> {
        let conn = self.open_readonly_connection()?;
        Ok(journal::recent(&conn, limit)?)
    }

    pub fn generation(&self) -> Result<u64> {
        let conn = self.open_readonly_connection()?;
        Ok(meta::get_generation(&conn)?)
    }

    pub(crate) fn open_readonly_connection(&self) -> Result<Connection> {
        db::open_readonly(&self.inner.db_path, self.inner.options.busy_timeout, &self.inner.locale)
    }

    /// Take the write lock, polling until the busy timeout runs out.
    pub(crate) fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>> {
        let deadline = Instant::now() + self.inner.options.busy_timeout;
        loop {
            match self.inner.writer.try_lock() {
                Ok(guard) => return Ok(guard),
                // A panicked writer left its transaction to be rolled back on drop.
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TryLockError::WouldBlock) => {
                    return Err(Error::Busy(format!(
                        "write lock on {} not released within {:?}",
                        self.inner.db_path.display(),
                        self.inner.options.busy_timeout
                    )))
                }
            }
        }
    }

    /// Leave the corruption marker for the next open.
    pub(crate) fn mark_corrupted(&self, reason: &str) {
        let sentinel = self.inner.options.sentinel_path();
        tracing::error!(reason, sentinel = %sentinel.display(), "marking store as corrupted");
        if let Err(e) = std::fs::write(&sentinel, reason) {
            tracing::warn!(error = %e, "could not write corruption marker");
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Store, StoreOptions};
    use tempfile::TempDir;

    pub const ONTOLOGY: &str = r#"@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
@prefix nrl: <http://tracker.api.gnome.org/ontology/v3/nrl#> .
@prefix ex: <http://example.org/ex#> .

ex: a nrl:Namespace ; nrl:prefix "ex" .
ex:Person a rdfs:Class ; rdfs:subClassOf rdfs:Resource .
ex:Employee a rdfs:Class ; rdfs:subClassOf ex:Person .
ex:name a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:string ; nrl:maxCardinality 1 ; nrl:fulltextIndexed true .
ex:age a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:integer ; nrl:maxCardinality 1 .
ex:nick a rdf:Property ; rdfs:domain ex:Person ; rdfs:range xsd:string .
ex:email a nrl:InverseFunctionalProperty ; rdfs:domain ex:Person ; rdfs:range xsd:string .
ex:boss a rdf:Property ; rdfs:domain ex:Employee ; rdfs:range ex:Person ; nrl:maxCardinality 1 .
"#;

    pub fn options(tmp: &TempDir) -> StoreOptions {
        let path = tmp.path().join("test.ontology");
        if !path.exists() {
            std::fs::write(&path, ONTOLOGY).unwrap();
        }
        StoreOptions::new(tmp.path().join("db")).with_ontology(path)
    }

    pub fn open() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(options(&tmp)).unwrap();
        (tmp, store)
    }
}

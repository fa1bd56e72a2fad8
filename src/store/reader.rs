//! Read-only query access.

use std::sync::Arc;

use rusqlite::{params_from_iter, Connection, Statement};
use tokio_util::sync::CancellationToken;

use crate::cursor::SqlCursor;
use crate::error::Result;
use crate::ontology::Ontology;
use crate::query::{CompiledQuery, QueryCompiler};
use crate::schema::SchemaLayout;
use crate::value::Term;

/// A read-only connection plus what it needs to compile queries.
///
/// Readers run concurrently with each other and with the writer; each sees the
/// last committed state as of its statement's start.
pub struct Reader {
    conn: Connection,
    ontology: Arc<Ontology>,
    layout: Arc<SchemaLayout>,
    compiler: Arc<dyn QueryCompiler>,
}

impl Reader {
    pub(crate) fn new(
        conn: Connection,
        ontology: Arc<Ontology>,
        layout: Arc<SchemaLayout>,
        compiler: Arc<dyn QueryCompiler>,
    ) -> Self {
        Self {
            conn,
            ontology,
            layout,
            compiler,
        }
    }

    /// Compile `text` and prepare the resulting statement. `bindings` fill `~name`
    /// placeholders.
    pub fn prepare(&self, text: &str, bindings: &[(&str, Term)]) -> Result<PreparedQuery<'_>> {
        let compiled = self.compiler.compile(&self.ontology, &self.layout, text, bindings)?;
        tracing::debug!(sql = %compiled.sql, params = compiled.params.len(), "query compiled");
        let stmt = self.conn.prepare(&compiled.sql)?;
        Ok(PreparedQuery { stmt, compiled })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn layout(&self) -> &SchemaLayout {
        &self.layout
    }
}

/// A compiled query ready to run, possibly more than once.
pub struct PreparedQuery<'conn> {
    stmt: Statement<'conn>,
    compiled: CompiledQuery,
}

impl PreparedQuery<'_> {
    /// Output variable names, in column order.
    pub fn variables(&self) -> &[String] {
        &self.compiled.variables
    }

    /// The generated SQL.
    pub fn sql(&self) -> &str {
        &self.compiled.sql
    }

    /// Execute and return a cursor over the result rows.
    pub fn cursor(&mut self) -> Result<SqlCursor<'_>> {
        let names = self.compiled.variables.clone();
        let types = self.compiled.column_types.clone();
        let rows = self.stmt.query(params_from_iter(self.compiled.params.iter()))?;
        Ok(SqlCursor::new(rows, names, types))
    }

    /// Like [`PreparedQuery::cursor`], failing with `Cancelled` once `token` fires.
    pub fn cursor_with_cancellation(&mut self, token: CancellationToken) -> Result<SqlCursor<'_>> {
        Ok(self.cursor()?.with_cancellation(token))
    }
}

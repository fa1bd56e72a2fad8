//! Cursor over the rows of a compiled query.

use rusqlite::Rows;
use tokio_util::sync::CancellationToken;

use super::{cell_at, Cell, Cursor, ValueType};
use crate::error::{Error, Result};
use crate::ontology::DataType;
use crate::value::decode_into;

/// Reads rows from a running SQLite statement and decodes every column according to
/// the data type the query compiler assigned to it.
///
/// Resource columns arrive already resolved to URIs. The cursor borrows the statement,
/// so it cannot outlive the [`crate::store::PreparedQuery`] it came from.
pub struct SqlCursor<'stmt> {
    rows: Rows<'stmt>,
    names: Vec<String>,
    types: Vec<DataType>,
    row: Vec<Cell>,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl<'stmt> SqlCursor<'stmt> {
    pub(crate) fn new(rows: Rows<'stmt>, names: Vec<String>, types: Vec<DataType>) -> Self {
        let row = vec![Cell::default(); names.len()];
        Self {
            rows,
            names,
            types,
            row,
            cancel: None,
            finished: false,
        }
    }

    /// Fail the next call to `next()` once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Copy every remaining row out as lexical strings.
    pub fn collect_strings(mut self) -> Result<Vec<Vec<Option<String>>>> {
        let mut out = Vec::new();
        while self.next()? {
            out.push(
                (0..self.n_columns())
                    .map(|c| self.get_string(c).map(str::to_string))
                    .collect(),
            );
        }
        Ok(out)
    }
}

impl Cursor for SqlCursor<'_> {
    fn next(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.close();
            return Err(Error::Cancelled);
        }

        match self.rows.next()? {
            Some(row) => {
                for (i, cell) in self.row.iter_mut().enumerate() {
                    decode_into(self.types[i], row.get_ref(i)?, cell);
                }
                Ok(true)
            }
            None => {
                self.close();
                Ok(false)
            }
        }
    }

    fn n_columns(&self) -> usize {
        self.names.len()
    }

    fn variable_name(&self, column: usize) -> Option<&str> {
        self.names.get(column).map(String::as_str)
    }

    fn get_value_type(&self, column: usize) -> ValueType {
        cell_at(&self.row, column).map_or(ValueType::Unbound, |c| c.kind)
    }

    fn get_string(&self, column: usize) -> Option<&str> {
        cell_at(&self.row, column).map(|c| c.text.as_str())
    }

    fn get_datatype(&self, column: usize) -> Option<&str> {
        cell_at(&self.row, column)?.datatype.as_deref()
    }

    fn get_language(&self, column: usize) -> Option<&str> {
        cell_at(&self.row, column)?.language.as_deref()
    }

    fn close(&mut self) {
        self.finished = true;
        self.row.iter_mut().for_each(Cell::clear);
    }
}

//! Forward-only, typed result iteration.
//!
//! A [`Cursor`] owns the backing buffer of its current row. Accessors hand out
//! borrows of that buffer, so the borrow checker ends them before the next call to
//! [`Cursor::next`]: callers that want to keep a value copy it out first.
//!
//! Implementations:
//! - [`rdf::RdfFileCursor`] streams the statements of one RDF file.
//! - [`merge::MergeCursor`] drains a set of child cursors, last-added first.
//! - [`directory::DirectoryCursor`] walks the RDF files of a directory in lexical order.
//! - [`sql::SqlCursor`] reads rows of a compiled query.
//! - [`MemoryCursor`] serves rows built in memory.

pub mod directory;
pub mod merge;
pub mod rdf;
pub mod sql;

use crate::error::{Result, SourceLocation};

pub use directory::{open_sources, DirectoryCursor};
pub use merge::MergeCursor;
pub use rdf::{DefaultDetector, FormatDetector, RdfFileCursor};
pub use sql::SqlCursor;

/// The type of a value in the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    /// No value: the column is unbound for this row, or the cursor has no current row.
    #[default]
    Unbound,
    Uri,
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
    BlankNode,
}

/// One value of the current row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub kind: ValueType,
    pub text: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Cell {
    pub fn new(kind: ValueType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn uri(text: impl Into<String>) -> Self {
        Self::new(ValueType::Uri, text)
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::new(ValueType::String, text)
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Reset to unbound while keeping the string allocation for the next row.
    pub(crate) fn clear(&mut self) {
        self.kind = ValueType::Unbound;
        self.text.clear();
        self.datatype = None;
        self.language = None;
    }

    pub(crate) fn set(&mut self, kind: ValueType, text: &str) {
        self.kind = kind;
        self.text.clear();
        self.text.push_str(text);
        self.datatype = None;
        self.language = None;
    }
}

/// Column positions of the statements produced by RDF cursors.
pub mod columns {
    pub const SUBJECT: usize = 0;
    pub const PREDICATE: usize = 1;
    pub const OBJECT: usize = 2;
    pub const GRAPH: usize = 3;
}

/// A positioned, forward-only view over a sequence of rows.
///
/// Cursors are not `Send`: SQL cursors borrow a prepared statement of one
/// connection. Build and drain a cursor on the thread that owns its source.
pub trait Cursor {
    /// Advance to the next row. `Ok(false)` means end of stream.
    fn next(&mut self) -> Result<bool>;

    fn n_columns(&self) -> usize;

    /// Name of the column, if the producer has one (query variables do).
    fn variable_name(&self, column: usize) -> Option<&str>;

    /// Type of the value in `column`, or [`ValueType::Unbound`].
    fn get_value_type(&self, column: usize) -> ValueType;

    /// Lexical form of the value in `column`.
    fn get_string(&self, column: usize) -> Option<&str>;

    /// Datatype IRI of a literal value.
    fn get_datatype(&self, _column: usize) -> Option<&str> {
        None
    }

    /// Language tag of a language-tagged string.
    fn get_language(&self, _column: usize) -> Option<&str> {
        None
    }

    fn get_integer(&self, column: usize) -> Option<i64> {
        self.get_string(column)?.parse().ok()
    }

    fn get_double(&self, column: usize) -> Option<f64> {
        self.get_string(column)?.parse().ok()
    }

    fn get_boolean(&self, column: usize) -> Option<bool> {
        match self.get_string(column)? {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    /// Where the current row came from, for cursors reading a text source.
    fn get_parser_location(&self) -> Option<SourceLocation> {
        None
    }

    /// Release underlying resources early. Further `next` calls return `Ok(false)`.
    fn close(&mut self) {}
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn n_columns(&self) -> usize {
        (**self).n_columns()
    }

    fn variable_name(&self, column: usize) -> Option<&str> {
        (**self).variable_name(column)
    }

    fn get_value_type(&self, column: usize) -> ValueType {
        (**self).get_value_type(column)
    }

    fn get_string(&self, column: usize) -> Option<&str> {
        (**self).get_string(column)
    }

    fn get_datatype(&self, column: usize) -> Option<&str> {
        (**self).get_datatype(column)
    }

    fn get_language(&self, column: usize) -> Option<&str> {
        (**self).get_language(column)
    }

    fn get_integer(&self, column: usize) -> Option<i64> {
        (**self).get_integer(column)
    }

    fn get_double(&self, column: usize) -> Option<f64> {
        (**self).get_double(column)
    }

    fn get_boolean(&self, column: usize) -> Option<bool> {
        (**self).get_boolean(column)
    }

    fn get_parser_location(&self) -> Option<SourceLocation> {
        (**self).get_parser_location()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Read accessors shared by cursors that keep their current row as a `Vec<Cell>`.
pub(crate) fn cell_at(row: &[Cell], column: usize) -> Option<&Cell> {
    row.get(column).filter(|c| c.kind != ValueType::Unbound)
}

/// A cursor over rows held in memory.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    names: Vec<String>,
    rows: std::collections::VecDeque<Vec<Cell>>,
    current: Vec<Cell>,
}

impl MemoryCursor {
    pub fn new(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            names,
            rows: rows.into(),
            current: Vec::new(),
        }
    }

    /// A four-column statement cursor with URI subjects and predicates.
    pub fn from_statements<'a>(statements: impl IntoIterator<Item = (&'a str, &'a str, Cell)>) -> Self {
        let rows = statements
            .into_iter()
            .map(|(s, p, o)| vec![Cell::uri(s), Cell::uri(p), o, Cell::default()])
            .collect();
        Self::new(
            ["subject", "predicate", "object", "graph"].map(String::from).to_vec(),
            rows,
        )
    }
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> Result<bool> {
        match self.rows.pop_front() {
            Some(row) => {
                self.current = row;
                Ok(true)
            }
            None => {
                self.current.clear();
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
        cell_at(&self.current, column).map_or(ValueType::Unbound, |c| c.kind)
    }

    fn get_string(&self, column: usize) -> Option<&str> {
        cell_at(&self.current, column).map(|c| c.text.as_str())
    }

    fn get_datatype(&self, column: usize) -> Option<&str> {
        cell_at(&self.current, column)?.datatype.as_deref()
    }

    fn get_language(&self, column: usize) -> Option<&str> {
        cell_at(&self.current, column)?.language.as_deref()
    }

    fn close(&mut self) {
        self.rows.clear();
        self.current.clear();
    }
}

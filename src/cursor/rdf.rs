//! Cursor over the statements of one RDF file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use oxrdf::{GraphName, Literal, Subject, Term};
use oxrdfio::{RdfFormat, RdfParseError, RdfParser, ReaderQuadParser};

use super::{cell_at, Cell, Cursor, ValueType};
use crate::error::{Error, FormatError, Result, SourceLocation};
use crate::ontology::DataType;

/// Suffix of ontology description files. They are always Turtle.
pub const ONTOLOGY_SUFFIX: &str = "ontology";

const SNIFF_LEN: usize = 512;

/// Decides whether a file holds RDF, and in which serialization.
pub trait FormatDetector: Send + Sync {
    fn detect(&self, path: &Path) -> Result<Option<RdfFormat>>;
}

/// Detects by file extension first, then by sniffing the first bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDetector;

impl FormatDetector for DefaultDetector {
    fn detect(&self, path: &Path) -> Result<Option<RdfFormat>> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if ext == ONTOLOGY_SUFFIX {
                return Ok(Some(RdfFormat::Turtle));
            }
            if let Some(format) = RdfFormat::from_extension(ext) {
                return Ok(Some(format));
            }
        }

        let mut head = Vec::with_capacity(SNIFF_LEN);
        File::open(path)
            .and_then(|f| f.take(SNIFF_LEN as u64).read_to_end(&mut head))
            .map_err(|e| Error::io(path, e))?;
        Ok(sniff(&head))
    }
}

fn sniff(head: &[u8]) -> Option<RdfFormat> {
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}');
    let first = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))?;

    if first.starts_with("<?xml") || first.starts_with("<rdf:RDF") {
        return Some(RdfFormat::RdfXml);
    }
    let lower = first.to_ascii_lowercase();
    if lower.starts_with("@prefix") || lower.starts_with("@base") || lower.starts_with("prefix") || lower.starts_with("base") {
        return Some(RdfFormat::Turtle);
    }
    // Turtle is a superset of N-Triples.
    if first.starts_with('<') || first.starts_with("_:") {
        return Some(RdfFormat::Turtle);
    }
    None
}

/// Streams `(subject, predicate, object, graph)` rows from an RDF file.
///
/// The parser only reports positions for syntax errors, so for successfully parsed
/// statements [`Cursor::get_parser_location`] reports the 1-based statement ordinal as
/// the line and 0 as the column.
pub struct RdfFileCursor {
    path: PathBuf,
    parser: Option<ReaderQuadParser<BufReader<File>>>,
    row: Vec<Cell>,
    ordinal: u64,
}

impl std::fmt::Debug for RdfFileCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdfFileCursor")
            .field("path", &self.path)
            .field("ordinal", &self.ordinal)
            .field("open", &self.parser.is_some())
            .finish()
    }
}

impl RdfFileCursor {
    /// Open `path`, detecting its serialization with [`DefaultDetector`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &DefaultDetector)
    }

    pub fn open_with(path: impl AsRef<Path>, detector: &dyn FormatDetector) -> Result<Self> {
        let path = path.as_ref();
        let format = detector
            .detect(path)?
            .ok_or_else(|| FormatError::Unrecognized { path: path.to_path_buf() })?;
        Self::with_format(path, format)
    }

    pub fn with_format(path: impl AsRef<Path>, format: RdfFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        tracing::debug!(path = %path.display(), format = ?format, "opening RDF source");
        Ok(Self {
            path: path.to_path_buf(),
            parser: Some(RdfParser::from_format(format).for_reader(BufReader::new(file))),
            row: vec![Cell::default(); 4],
            ordinal: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self, line: u64, column: u64) -> SourceLocation {
        SourceLocation {
            path: Some(self.path.clone()),
            line,
            column,
        }
    }

    fn fill(&mut self, quad: oxrdf::Quad) {
        let [subject, predicate, object, graph] = &mut self.row[..] else {
            return;
        };

        match &quad.subject {
            Subject::NamedNode(n) => subject.set(ValueType::Uri, n.as_str()),
            Subject::BlankNode(b) => subject.set(ValueType::BlankNode, b.as_str()),
            #[allow(unreachable_patterns)]
            _ => subject.clear(),
        }

        predicate.set(ValueType::Uri, quad.predicate.as_str());

        match &quad.object {
            Term::NamedNode(n) => object.set(ValueType::Uri, n.as_str()),
            Term::BlankNode(b) => object.set(ValueType::BlankNode, b.as_str()),
            Term::Literal(l) => set_literal(object, l),
            #[allow(unreachable_patterns)]
            _ => object.clear(),
        }

        match &quad.graph_name {
            GraphName::NamedNode(n) => graph.set(ValueType::Uri, n.as_str()),
            GraphName::BlankNode(b) => graph.set(ValueType::BlankNode, b.as_str()),
            GraphName::DefaultGraph => graph.clear(),
        }
    }
}

fn set_literal(cell: &mut Cell, literal: &Literal) {
    let datatype = literal.datatype().as_str();
    let kind = match DataType::from_datatype_iri(datatype) {
        Some(DataType::Integer) => ValueType::Integer,
        Some(DataType::Double) => ValueType::Double,
        Some(DataType::Boolean) => ValueType::Boolean,
        Some(DataType::Date | DataType::DateTime) => ValueType::DateTime,
        _ => ValueType::String,
    };
    cell.set(kind, literal.value());
    cell.datatype = Some(datatype.to_string());
    cell.language = literal.language().map(str::to_string);
}

impl Cursor for RdfFileCursor {
    fn next(&mut self) -> Result<bool> {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(false);
        };

        match parser.next() {
            Some(Ok(quad)) => {
                self.ordinal += 1;
                self.fill(quad);
                Ok(true)
            }
            None => {
                self.close();
                Ok(false)
            }
            Some(Err(RdfParseError::Io(e))) => {
                self.close();
                Err(Error::io(&self.path, e))
            }
            Some(Err(RdfParseError::Syntax(e))) => {
                self.close();
                let (line, column) = e
                    .location()
                    .map_or((0, 0), |r| (r.start.line + 1, r.start.column + 1));
                Err(FormatError::Syntax {
                    location: self.location(line, column),
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    fn n_columns(&self) -> usize {
        4
    }

    fn variable_name(&self, column: usize) -> Option<&str> {
        ["subject", "predicate", "object", "graph"].get(column).copied()
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

    fn get_parser_location(&self) -> Option<SourceLocation> {
        (self.ordinal > 0).then(|| self.location(self.ordinal, 0))
    }

    fn close(&mut self) {
        self.parser = None;
        self.row.iter_mut().for_each(Cell::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::columns;
    use crate::error::ErrorKind;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn streams_statements_with_typed_objects() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "data.ttl",
            r#"@prefix ex: <http://example.org/ex#> .
<urn:1> ex:name "Alice" ; ex:age 30 ; ex:label "Hallo"@de .
"#,
        );

        let mut cursor = RdfFileCursor::open(&path).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_string(columns::SUBJECT), Some("urn:1"));
        assert_eq!(cursor.get_string(columns::OBJECT), Some("Alice"));
        assert_eq!(cursor.get_value_type(columns::OBJECT), ValueType::String);
        assert_eq!(cursor.get_parser_location().unwrap().line, 1);

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_value_type(columns::OBJECT), ValueType::Integer);
        assert_eq!(cursor.get_integer(columns::OBJECT), Some(30));

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_language(columns::OBJECT), Some("de"));
        assert!(!cursor.next().unwrap());
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn syntax_errors_carry_file_and_position() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write(tmp.path(), "bad.ttl", "<urn:1> <urn:p> \"unterminated .\n");
        let mut cursor = RdfFileCursor::open(&path).unwrap();
        let err = cursor.next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("bad.ttl:"), "{err}");
    }

    #[test]
    fn detector_uses_extension_then_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let onto = write(tmp.path(), "base.ontology", "");
        let sniffed = write(tmp.path(), "seed.data", "# comment\n@prefix ex: <http://e/> .\n");
        let xml = write(tmp.path(), "seed.rdfdata", "<?xml version=\"1.0\"?>\n<rdf:RDF/>");
        let junk = write(tmp.path(), "notes.txt", "hello world");

        let d = DefaultDetector;
        assert_eq!(d.detect(&onto).unwrap(), Some(RdfFormat::Turtle));
        assert_eq!(d.detect(&sniffed).unwrap(), Some(RdfFormat::Turtle));
        assert_eq!(d.detect(&xml).unwrap(), Some(RdfFormat::RdfXml));
        assert_eq!(d.detect(&junk).unwrap(), None);
    }

    #[test]
    fn unrecognized_file_is_a_format_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let junk = write(tmp.path(), "notes.txt", "hello world");
        let err = RdfFileCursor::open(&junk).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}

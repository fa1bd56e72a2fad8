//! Cursor over every RDF file of a directory, in lexical filename order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::merge::MergeCursor;
use super::rdf::{DefaultDetector, FormatDetector, RdfFileCursor};
use super::{Cursor, ValueType};
use crate::error::{Error, Result, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The file list has not been built yet.
    Uninitialized,
    Streaming,
    Exhausted,
    /// A previous call failed; the cursor refuses further work.
    Failed,
}

enum Source {
    Directory(PathBuf),
    Paths(Vec<PathBuf>),
}

/// Streams the statements of several RDF sources as one cursor.
///
/// Built from a directory, the cursor lists it once on the first [`Cursor::next`],
/// keeps the files the detector recognises and sorts them by file name. Built from an
/// explicit list, it keeps the list order and opens directories in it as nested
/// directory cursors. Each file is opened only when the previous one is exhausted.
///
/// Any error (listing, opening or parsing) is returned immediately and leaves the
/// cursor unusable: later calls fail without retrying the file.
pub struct DirectoryCursor {
    source: Source,
    detector: Arc<dyn FormatDetector>,
    files: Vec<PathBuf>,
    next_file: usize,
    merge: MergeCursor,
    state: State,
}

impl DirectoryCursor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::build(Source::Directory(dir.into()))
    }

    /// A cursor over the given files and directories, in the order given.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self::build(Source::Paths(paths.into_iter().collect()))
    }

    fn build(source: Source) -> Self {
        Self {
            source,
            detector: Arc::new(DefaultDetector),
            files: Vec::new(),
            next_file: 0,
            merge: MergeCursor::new(),
            state: State::Uninitialized,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn FormatDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// The resolved file list. Empty until the first `next()`.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn enumerate(&mut self) -> Result<()> {
        self.files = match &self.source {
            Source::Paths(paths) => paths.clone(),
            Source::Directory(dir) => list_rdf_files(dir, self.detector.as_ref())?,
        };
        tracing::debug!(files = self.files.len(), "resolved RDF sources");
        Ok(())
    }

    fn open_child(&self, path: &Path) -> Result<Box<dyn Cursor>> {
        if path.is_dir() {
            return Ok(Box::new(
                DirectoryCursor::new(path).with_detector(Arc::clone(&self.detector)),
            ));
        }
        Ok(Box::new(RdfFileCursor::open_with(path, self.detector.as_ref())?))
    }

    fn advance(&mut self) -> Result<bool> {
        loop {
            match self.state {
                State::Uninitialized => {
                    self.enumerate()?;
                    self.state = State::Streaming;
                }
                State::Streaming => {
                    if self.merge.next()? {
                        return Ok(true);
                    }
                    let Some(path) = self.files.get(self.next_file).cloned() else {
                        self.state = State::Exhausted;
                        return Ok(false);
                    };
                    self.next_file += 1;
                    let child = self.open_child(&path)?;
                    self.merge.add(child);
                }
                State::Exhausted => return Ok(false),
                State::Failed => {
                    return Err(Error::io(
                        self.files.get(self.next_file.saturating_sub(1)).cloned().unwrap_or_default(),
                        std::io::Error::other("cursor is unusable after an earlier failure"),
                    ))
                }
            }
        }
    }
}

/// Files of `dir` that look like RDF, sorted by file name.
pub fn list_rdf_files(dir: &Path, detector: &dyn FormatDetector) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if detector.detect(&path)?.is_some() {
            files.push(path);
        } else {
            tracing::debug!(path = %path.display(), "skipping non-RDF file");
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

impl Cursor for DirectoryCursor {
    fn next(&mut self) -> Result<bool> {
        let result = self.advance();
        if result.is_err() && self.state != State::Failed {
            self.merge.close();
            self.state = State::Failed;
        }
        result
    }

    fn n_columns(&self) -> usize {
        4
    }

    fn variable_name(&self, column: usize) -> Option<&str> {
        self.merge.variable_name(column)
    }

    fn get_value_type(&self, column: usize) -> ValueType {
        self.merge.get_value_type(column)
    }

    fn get_string(&self, column: usize) -> Option<&str> {
        self.merge.get_string(column)
    }

    fn get_datatype(&self, column: usize) -> Option<&str> {
        self.merge.get_datatype(column)
    }

    fn get_language(&self, column: usize) -> Option<&str> {
        self.merge.get_language(column)
    }

    fn get_parser_location(&self) -> Option<SourceLocation> {
        self.merge.get_parser_location()
    }

    fn close(&mut self) {
        self.merge.close();
        self.state = State::Exhausted;
    }
}

/// Open a cursor over `sources`: a single file directly, anything else through a
/// [`DirectoryCursor`].
pub fn open_sources(sources: &[PathBuf]) -> Result<Box<dyn Cursor>> {
    match sources {
        [single] if single.is_file() => Ok(Box::new(RdfFileCursor::open(single)?)),
        [single] => Ok(Box::new(DirectoryCursor::new(single.clone()))),
        many => Ok(Box::new(DirectoryCursor::from_paths(many.to_vec()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::columns;
    use crate::error::ErrorKind;

    fn statement(subject: &str) -> String {
        format!("<urn:{subject}> <urn:p> \"{subject}\" .\n")
    }

    fn subjects(cursor: &mut dyn Cursor) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        while cursor.next()? {
            seen.push(cursor.get_string(columns::SUBJECT).unwrap_or_default().to_string());
        }
        Ok(seen)
    }

    #[test]
    fn files_are_visited_in_lexical_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        // Written out of order on purpose.
        std::fs::write(tmp.path().join("c.ttl"), statement("c")).unwrap();
        std::fs::write(tmp.path().join("a.ontology"), statement("a")).unwrap();
        std::fs::write(tmp.path().join("README"), "not rdf").unwrap();
        std::fs::write(tmp.path().join("b.ontology"), statement("b")).unwrap();

        let mut cursor = DirectoryCursor::new(tmp.path());
        assert_eq!(subjects(&mut cursor).unwrap(), ["urn:a", "urn:b", "urn:c"]);
        let names: Vec<_> = cursor
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.ontology", "b.ontology", "c.ttl"]);
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn empty_files_are_skipped_transparently() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.ttl"), "").unwrap();
        std::fs::write(tmp.path().join("b.ttl"), statement("b")).unwrap();
        let mut cursor = DirectoryCursor::new(tmp.path());
        assert_eq!(subjects(&mut cursor).unwrap(), ["urn:b"]);
    }

    #[test]
    fn parse_error_makes_the_cursor_unusable() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.ttl"), statement("a")).unwrap();
        std::fs::write(tmp.path().join("b.ttl"), "<urn:b> <urn:p> .\n").unwrap();
        std::fs::write(tmp.path().join("c.ttl"), statement("c")).unwrap();

        let mut cursor = DirectoryCursor::new(tmp.path());
        assert!(cursor.next().unwrap());
        let err = cursor.next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(cursor.next().is_err());
    }

    #[test]
    fn missing_directory_fails_on_first_next() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cursor = DirectoryCursor::new(tmp.path().join("nope"));
        assert_eq!(cursor.next().unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn explicit_paths_keep_their_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.ttl");
        let b = tmp.path().join("b.ttl");
        std::fs::write(&a, statement("a")).unwrap();
        std::fs::write(&b, statement("b")).unwrap();

        let mut cursor = open_sources(&[b, a]).unwrap();
        assert_eq!(subjects(cursor.as_mut()).unwrap(), ["urn:b", "urn:a"]);
    }
}

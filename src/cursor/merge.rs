//! Cursor composed of several child cursors.

use super::{Cursor, ValueType};
use crate::error::{Result, SourceLocation};

/// Drains its children one after another, starting from the last one added.
///
/// The last-registered source wins: accessors always read through the child that is
/// currently active, so a later (overriding) source is seen first. A child is dropped
/// as soon as it reports end of stream. With no active child every accessor returns
/// the unbound value.
///
/// A child added after iteration started becomes active immediately; once it is
/// exhausted the walk resumes at the nearest earlier child that is still open.
#[derive(Default)]
pub struct MergeCursor {
    children: Vec<Option<Box<dyn Cursor>>>,
    current: Option<usize>,
}

impl MergeCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_children(children: impl IntoIterator<Item = Box<dyn Cursor>>) -> Self {
        let mut merge = Self::new();
        for child in children {
            merge.add(child);
        }
        merge
    }

    pub fn add(&mut self, child: Box<dyn Cursor>) {
        self.children.push(Some(child));
        self.current = Some(self.children.len() - 1);
    }

    /// Number of children that have not been exhausted yet.
    pub fn open_children(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }

    fn active(&self) -> Option<&dyn Cursor> {
        self.current
            .and_then(|i| self.children.get(i))
            .and_then(|c| c.as_deref())
    }

    /// Release child `index` and move to the nearest earlier child still open.
    fn retire(&mut self, index: usize) {
        if let Some(mut child) = self.children[index].take() {
            child.close();
        }
        self.current = self.children[..index].iter().rposition(Option::is_some);
    }
}

impl Cursor for MergeCursor {
    fn next(&mut self) -> Result<bool> {
        while let Some(index) = self.current {
            let Some(child) = self.children[index].as_mut() else {
                self.retire(index);
                continue;
            };
            if child.next()? {
                return Ok(true);
            }
            self.retire(index);
        }
        Ok(false)
    }

    fn n_columns(&self) -> usize {
        self.active()
            .or_else(|| self.children.iter().flatten().next().map(|c| &**c))
            .map_or(0, |c| c.n_columns())
    }

    fn variable_name(&self, column: usize) -> Option<&str> {
        self.active()?.variable_name(column)
    }

    fn get_value_type(&self, column: usize) -> ValueType {
        self.active()
            .map_or(ValueType::Unbound, |c| c.get_value_type(column))
    }

    fn get_string(&self, column: usize) -> Option<&str> {
        self.active()?.get_string(column)
    }

    fn get_datatype(&self, column: usize) -> Option<&str> {
        self.active()?.get_datatype(column)
    }

    fn get_language(&self, column: usize) -> Option<&str> {
        self.active()?.get_language(column)
    }

    fn get_parser_location(&self) -> Option<SourceLocation> {
        self.active()?.get_parser_location()
    }

    fn close(&mut self) {
        for mut child in self.children.iter_mut().filter_map(Option::take) {
            child.close();
        }
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{columns, Cell, MemoryCursor};

    fn single(subject: &str) -> Box<dyn Cursor> {
        Box::new(MemoryCursor::from_statements([(
            subject,
            "urn:p",
            Cell::string("v"),
        )]))
    }

    fn drain(cursor: &mut dyn Cursor) -> Vec<String> {
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push(cursor.get_string(columns::SUBJECT).unwrap().to_string());
        }
        seen
    }

    #[test]
    fn last_added_child_is_drained_first() {
        let mut merge = MergeCursor::from_children([single("X"), single("Y"), single("Z")]);
        assert_eq!(drain(&mut merge), ["Z", "Y", "X"]);
        assert!(!merge.next().unwrap());
        assert_eq!(merge.open_children(), 0);
    }

    #[test]
    fn accessors_are_unbound_without_an_active_child() {
        let mut merge = MergeCursor::new();
        assert_eq!(merge.get_value_type(columns::SUBJECT), ValueType::Unbound);
        assert_eq!(merge.get_string(columns::SUBJECT), None);
        assert!(merge.get_parser_location().is_none());
        assert!(!merge.next().unwrap());

        merge.add(single("A"));
        assert!(merge.next().unwrap());
        assert!(!merge.next().unwrap());
        assert_eq!(merge.get_value_type(columns::SUBJECT), ValueType::Unbound);
    }

    #[test]
    fn exhausted_children_are_released_immediately() {
        let mut merge = MergeCursor::from_children([single("X"), single("Y")]);
        assert!(merge.next().unwrap());
        assert_eq!(merge.open_children(), 2);
        assert!(merge.next().unwrap());
        assert_eq!(merge.get_string(columns::SUBJECT), Some("X"));
        assert_eq!(merge.open_children(), 1);
    }

    #[test]
    fn child_added_mid_stream_becomes_active() {
        let mut merge = MergeCursor::from_children([single("X")]);
        merge.add(single("Y"));
        assert!(merge.next().unwrap());
        merge.add(single("Z"));
        assert_eq!(drain(&mut merge), ["Z", "X"]);
    }
}

//! Source positions and offset maps shared by every diagnostic-producing
//! component. Assembly diagnostics point at `(file, line, column)` triples;
//! sections additionally keep an ordered map from byte offsets back to the
//! source position that emitted them.

use std::fmt::Display;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A line/column pair within one source file. Both are 1-based.
pub struct LineCol {
    /// Line number
    pub line: u64,
    /// Column number
    pub col: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A full source position: file name plus line and column
pub struct SourcePos {
    /// Name of the source file
    pub file: Arc<str>,
    /// Line number, 1-based
    pub line: u64,
    /// Column number, 1-based
    pub col: u64,
}

impl SourcePos {
    /// Create a source position from a file name and a line/column pair
    pub fn new(file: Arc<str>, line_col: LineCol) -> Self {
        Self {
            file,
            line: line_col.line,
            col: line_col.col,
        }
    }

    /// The same file at another line/column (used for per-operator
    /// positions inside one expression)
    pub fn with_line_col(&self, line_col: LineCol) -> Self {
        Self {
            file: self.file.clone(),
            line: line_col.line,
            col: line_col.col,
        }
    }
}

impl Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone, Default)]
/// Maps byte offsets within one source buffer to line/column pairs
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of `text`
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Translate a byte offset to its line/column pair. Offsets past the
    /// end of the indexed buffer land on the last line.
    pub fn line_col(&self, offset: usize) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(after) => after - 1,
        };
        LineCol {
            line: line as u64 + 1,
            col: (offset - self.line_starts[line]) as u64 + 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Ordered map from section byte offsets to the source positions that
/// produced them. Offsets are appended in increasing order as the
/// assembler emits bytes.
pub struct OffsetPosMap {
    entries: Vec<(u64, SourcePos)>,
}

impl OffsetPosMap {
    /// Record that bytes from `offset` onward came from `pos`. Appending
    /// a position for an already-recorded offset replaces it.
    pub fn push(&mut self, offset: u64, pos: SourcePos) {
        match self.entries.last_mut() {
            Some(last) if last.0 == offset => last.1 = pos,
            _ => self.entries.push((offset, pos)),
        }
    }

    /// The source position covering `offset`: the entry with the greatest
    /// recorded offset not above it
    pub fn lookup(&self, offset: u64) -> Option<&SourcePos> {
        let idx = match self.entries.binary_search_by_key(&offset, |e| e.0) {
            Ok(exact) => exact,
            Err(0) => return None,
            Err(after) => after - 1,
        };
        Some(&self.entries[idx].1)
    }

    /// All recorded entries in offset order
    pub fn entries(&self) -> &[(u64, SourcePos)] {
        &self.entries
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncdef\n\nx");
        assert_eq!(index.line_col(0), LineCol { line: 1, col: 1 });
        assert_eq!(index.line_col(2), LineCol { line: 1, col: 3 });
        assert_eq!(index.line_col(3), LineCol { line: 2, col: 1 });
        assert_eq!(index.line_col(6), LineCol { line: 2, col: 4 });
        assert_eq!(index.line_col(8), LineCol { line: 3, col: 1 });
        assert_eq!(index.line_col(9), LineCol { line: 4, col: 1 });
    }

    #[test]
    fn test_offset_pos_map() {
        let file: Arc<str> = Arc::from("test.s");
        let mut map = OffsetPosMap::default();
        map.push(0, SourcePos::new(file.clone(), LineCol { line: 1, col: 1 }));
        map.push(8, SourcePos::new(file.clone(), LineCol { line: 2, col: 1 }));
        map.push(8, SourcePos::new(file.clone(), LineCol { line: 3, col: 1 }));
        assert_eq!(map.lookup(0).unwrap().line, 1);
        assert_eq!(map.lookup(7).unwrap().line, 1);
        assert_eq!(map.lookup(8).unwrap().line, 3);
        assert_eq!(map.lookup(100).unwrap().line, 3);
        assert_eq!(map.entries().len(), 2);
    }
}

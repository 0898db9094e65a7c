use serde::Serialize;
use std::sync::Arc;

/// Byte range in a source file plus the 1-based line/column of its start.
///
/// Spans are carried by every token, AST node and HIR node. `file` is shared
/// so that cloning a span does not copy the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub file: Arc<str>,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(file: Arc<str>, start: usize, end: usize, line: usize, col: usize) -> Self {
        Span {
            file,
            start,
            end,
            line,
            col,
        }
    }

    /// Zero-width span at a position.
    pub fn point(file: Arc<str>, at: usize, line: usize, col: usize) -> Self {
        Span::new(file, at, at, line, col)
    }

    /// Cover both spans. Line/col come from whichever span starts earlier.
    /// Spans from different files do not merge; the receiver wins.
    pub fn merge(&self, other: &Span) -> Span {
        if self.file != other.file {
            return self.clone();
        }
        let (line, col) = if self.start <= other.start {
            (self.line, self.col)
        } else {
            (other.line, other.col)
        };
        Span {
            file: self.file.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(start: usize, end: usize, line: usize, col: usize) -> Span {
        Span::new(Arc::from("test.flv"), start, end, line, col)
    }

    #[test]
    fn merge_covers_both_ranges() {
        let a = sp(4, 9, 1, 5);
        let b = sp(12, 20, 2, 3);
        let m = a.merge(&b);
        assert_eq!((m.start, m.end), (4, 20));
        assert_eq!((m.line, m.col), (1, 5));
    }

    #[test]
    fn merge_takes_position_of_earlier_start() {
        let a = sp(12, 20, 2, 3);
        let b = sp(4, 9, 1, 5);
        let m = a.merge(&b);
        assert_eq!((m.line, m.col), (1, 5));
    }

    #[test]
    fn merge_ignores_foreign_file() {
        let a = sp(0, 3, 1, 1);
        let b = Span::new(Arc::from("other.flv"), 10, 20, 4, 1);
        assert_eq!(a.merge(&b), a);
    }
}

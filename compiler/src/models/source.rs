//! Source positions and spans shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};

/// Identifies one source file within a compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const UNKNOWN: FileId = FileId(u32::MAX);
}

/// A point in a source file. Immutable; copied into every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SourceLocation {
    pub fn new(file_id: FileId, line: u32, column: u32, offset: u32) -> Self {
        Self {
            file_id,
            line,
            column,
            offset,
        }
    }

    pub fn start_of(file_id: FileId) -> Self {
        Self::new(file_id, 1, 1, 0)
    }

    pub fn unknown() -> Self {
        Self::new(FileId::UNKNOWN, 0, 0, 0)
    }
}

/// A half-open byte range between two locations in the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Span {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    pub fn point(loc: SourceLocation) -> Self {
        Self {
            start: loc,
            end: loc,
        }
    }

    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.start.offset && offset < self.end.offset
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let start = if self.start.offset <= other.start.offset {
            self.start
        } else {
            other.start
        };
        let end = if self.end.offset >= other.end.offset {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_contains_is_half_open() {
        let a = SourceLocation::new(FileId(0), 1, 1, 10);
        let b = SourceLocation::new(FileId(0), 1, 6, 15);
        let span = Span::new(a, b);

        assert!(span.contains(10));
        assert!(span.contains(14));
        assert!(!span.contains(15));
        assert!(!span.contains(9));
    }

    #[test]
    fn span_merge_covers_both() {
        let s1 = Span::new(
            SourceLocation::new(FileId(0), 1, 1, 0),
            SourceLocation::new(FileId(0), 1, 5, 4),
        );
        let s2 = Span::new(
            SourceLocation::new(FileId(0), 2, 1, 10),
            SourceLocation::new(FileId(0), 2, 8, 17),
        );

        let merged = s1.merge(&s2);
        assert_eq!(merged.start.offset, 0);
        assert_eq!(merged.end.offset, 17);
    }
}

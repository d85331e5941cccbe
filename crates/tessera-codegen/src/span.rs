//! Source locations carried by typed tree nodes

use std::ops::Range;

/// A span representing a range in source code.
///
/// The front end resolves line numbers before handing the tree over, so the
/// span carries the line of its first byte alongside the byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the start of the span
    pub start: u32,
    /// Byte offset of the end of the span (exclusive)
    pub end: u32,
    /// 1-indexed line of `start`, 0 when unknown
    pub line: u32,
}

impl Span {
    /// Create a new span from start and end byte offsets
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            line: 0,
        }
    }

    /// Attach a line number
    #[must_use]
    pub const fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Length of the span in bytes
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns true if the span is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Create a span that encompasses both self and other
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        let (start, line) = if self.start <= other.start {
            (self.start, self.line)
        } else {
            (other.start, other.line)
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end, line }
    }

    /// Create a dummy span for synthesized nodes
    #[must_use]
    pub const fn dummy() -> Self {
        Self {
            start: u32::MAX,
            end: u32::MAX,
            line: 0,
        }
    }

    /// Check if this is a dummy span
    #[must_use]
    pub const fn is_dummy(&self) -> bool {
        self.start == u32::MAX && self.end == u32::MAX
    }

    /// Convert to a Range<usize> for slicing
    #[must_use]
    pub const fn as_range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dummy() {
            write!(f, "<synthesized>")
        } else if self.line > 0 {
            write!(f, "{}..{} (line {})", self.start, self.end, self.line)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_merge_keeps_first_line() {
        let a = Span::new(10, 14).with_line(2);
        let b = Span::new(3, 6).with_line(1);
        let merged = a.merge(b);
        assert_eq!(merged.start, 3);
        assert_eq!(merged.end, 14);
        assert_eq!(merged.line, 1);
    }

    #[test]
    fn span_dummy() {
        let span = Span::dummy();
        assert!(span.is_dummy());
        assert_eq!(span.to_string(), "<synthesized>");
        assert!(!Span::new(0, 0).is_dummy());
    }

    #[test]
    fn span_display() {
        assert_eq!(Span::new(4, 9).to_string(), "4..9");
        assert_eq!(Span::new(4, 9).with_line(3).to_string(), "4..9 (line 3)");
        assert_eq!(Span::new(4, 9).len(), 5);
    }
}

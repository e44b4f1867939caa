use std::ops::Range;

use miette::SourceSpan;

/// Byte offset from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        let start = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        Span::new(SrcOffset(start), end - start)
    }

    pub fn range(&self) -> Range<usize> {
        self.offs.0..self.offs.0 + self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

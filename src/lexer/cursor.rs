// Modelled on `rustc_lexer`'s cursor, cut down to what a line-oriented
// assembly lexer needs.

use std::str::Chars;

pub const EOF_CHAR: char = '\0';

/// Peekable iterator over a char sequence, tracking absolute source offsets.
pub struct Cursor<'a> {
    chars: Chars<'a>,
    len: usize,
    /// Offset of the slice within the full source file.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str, base: usize) -> Cursor<'a> {
        Cursor {
            chars: input.chars(),
            len: input.len(),
            base,
        }
    }

    /// Peek the next character without consuming it.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    /// Consume and return the next character.
    pub fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    /// Absolute offset of the cursor within the full source.
    pub fn pos(&self) -> usize {
        self.base + self.len - self.chars.as_str().len()
    }

    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Consume characters while the predicate holds.
    pub fn take_while(&mut self, pred: impl Fn(char) -> bool) {
        while pred(self.first()) && !self.is_eof() {
            self.bump();
        }
    }
}

use std::num::IntErrorKind;
use std::str::FromStr;

use miette::Result;

use crate::error;
use crate::isa::{DirKind, Register};
use crate::span::{Span, SrcOffset};

pub mod cursor;

use cursor::Cursor;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Label definition, label reference or mnemonic; text is recovered
    /// from the span.
    Ident,
    /// Numeric literal, decimal or 0x-prefixed hex, already range-checked.
    Num(u16),
    Reg(Register),
    Dir(DirKind),
    Comma,
    Colon,
    Hash,
    LBracket,
    RBracket,
    Plus,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize one source line. `base` is the byte offset of `line` within
/// `src`; spans are absolute so diagnostics can point into the full file.
///
/// Everything from `;` onward is a comment and is stripped before scanning.
pub fn tokenize_line(src: &str, line: &str, base: usize) -> Result<Vec<Token>> {
    let line = &line[..line.find(';').unwrap_or(line.len())];
    let mut cur = Cursor::new(line, base);
    let mut toks = Vec::new();

    loop {
        let start = cur.pos();
        let Some(c) = cur.bump() else { break };
        let kind = match c {
            c if c.is_whitespace() => continue,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '#' => TokenKind::Hash,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '+' => TokenKind::Plus,
            // Digit-led literals are scanned greedily while alphanumeric so
            // that malformed ones like `0x12G` fail here instead of
            // splitting into surprising token pairs.
            c if c.is_ascii_digit() => {
                cur.take_while(|c| c.is_ascii_alphanumeric());
                let span = Span::new(SrcOffset(start), cur.pos() - start);
                let text = &src[span.range()];
                let val = parse_u16(text).map_err(|e| error::lex_bad_lit(span, src, e))?;
                TokenKind::Num(val)
            }
            '.' => {
                cur.take_while(is_ident_char);
                let span = Span::new(SrcOffset(start), cur.pos() - start);
                match DirKind::from_str(&src[span.range()]) {
                    Ok(dir) => TokenKind::Dir(dir),
                    Err(()) => return Err(error::lex_invalid_dir(span, src)),
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                cur.take_while(is_ident_char);
                let span = Span::new(SrcOffset(start), cur.pos() - start);
                match Register::from_str(&src[span.range()]) {
                    Ok(reg) => TokenKind::Reg(reg),
                    Err(()) => TokenKind::Ident,
                }
            }
            _ => {
                let span = Span::new(SrcOffset(start), cur.pos() - start);
                return Err(error::lex_unknown(span, src));
            }
        };
        toks.push(Token {
            kind,
            span: Span::new(SrcOffset(start), cur.pos() - start),
        });
    }

    Ok(toks)
}

fn parse_u16(text: &str) -> Result<u16, std::num::ParseIntError> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse::<u16>()
    }
}

// Surfaced for tests that want to distinguish overflow from garbage.
#[allow(dead_code)]
pub(crate) fn lit_overflows(text: &str) -> bool {
    matches!(
        parse_u16(text).map_err(|e| e.kind().clone()),
        Err(IntErrorKind::PosOverflow)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize_line(src, src, 0)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn punctuation_and_registers() {
        assert_eq!(
            kinds("loop: add r1, R2"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Reg(Register::R1),
                TokenKind::Comma,
                TokenKind::Reg(Register::R2),
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(kinds("#10"), vec![TokenKind::Hash, TokenKind::Num(10)]);
        assert_eq!(kinds("0x1F"), vec![TokenKind::Num(0x1F)]);
        assert_eq!(kinds("0XFFFF"), vec![TokenKind::Num(0xFFFF)]);
    }

    #[test]
    fn indexed_punctuation() {
        assert_eq!(
            kinds("[r2 + 4]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Reg(Register::R2),
                TokenKind::Plus,
                TokenKind::Num(4),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn comment_stripped() {
        assert_eq!(kinds("nop ; this text & is ! ignored"), vec![TokenKind::Ident]);
        assert!(kinds("; whole line").is_empty());
    }

    #[test]
    fn directives() {
        assert_eq!(kinds(".org"), vec![TokenKind::Dir(DirKind::Org)]);
        assert_eq!(kinds(".WORD"), vec![TokenKind::Dir(DirKind::Word)]);
        assert!(tokenize_line(".blkw", ".blkw", 0).is_err());
    }

    #[test]
    fn bad_character() {
        assert!(tokenize_line("add r0 @", "add r0 @", 0).is_err());
    }

    #[test]
    fn bad_literals() {
        assert!(tokenize_line("65536", "65536", 0).is_err());
        assert!(tokenize_line("0x12G", "0x12G", 0).is_err());
        assert!(tokenize_line("12ab", "12ab", 0).is_err());
        assert!(lit_overflows("65536"));
    }

    #[test]
    fn span_offsets_are_absolute() {
        let src = "nop\nadd r0, #1";
        let toks = tokenize_line(src, "add r0, #1", 4).unwrap();
        assert_eq!(&src[toks[0].span.range()], "add");
        assert_eq!(&src[toks[3].span.range()], "1");
    }

    #[test]
    fn underscore_identifiers() {
        let src = "_start: nop";
        let toks = tokenize_line(src, src, 0).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(&src[toks[0].span.range()], "_start");
    }
}

use std::iter::Peekable;
use std::slice::Iter;
use std::str::FromStr;

use miette::Result;

use crate::error;
use crate::isa::{DirKind, InstrKind, Register};
use crate::lexer::{tokenize_line, Token, TokenKind};
use crate::span::{Span, SrcOffset};

/// A single parsed operand, with the source span it came from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Operand {
    pub kind: OperandKind,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum OperandKind {
    Reg(Register),
    /// `#n`
    Imm(u16),
    /// Bare identifier, resolved against the symbol table in pass 2.
    LabelRef(String),
    /// Bare numeric literal (address or raw value).
    Num(u16),
    /// `[rs]` register-indirect
    Ind(Register),
    /// `[rs + n]` register plus constant offset
    IndOffs(Register, u16),
}

/// What the line does, beyond defining a label.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineBody {
    /// Label-only or comment-only line.
    Empty,
    Instr(InstrKind),
    Dir(DirKind),
}

/// One structured source line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SrcLine {
    /// 1-based physical line number.
    pub line_no: usize,
    pub label: Option<(String, Span)>,
    pub body: LineBody,
    pub operands: Vec<Operand>,
    /// Span of the trimmed line text, for diagnostics and the source map.
    pub span: Span,
}

/// Parse full source text into structured lines. Lines that are empty after
/// trimming are dropped; comment-only lines are kept as `LineBody::Empty`
/// so the source map stays aligned with the file.
pub fn parse(src: &str) -> Result<Vec<SrcLine>> {
    let mut lines = Vec::new();
    let mut offs = 0;

    for (idx, raw) in src.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if !line.trim().is_empty() {
            let toks = tokenize_line(src, line, offs)?;
            lines.push(parse_line(src, idx + 1, &toks, trimmed_span(line, offs))?);
        }
        offs += raw.len() + 1;
    }

    Ok(lines)
}

fn trimmed_span(line: &str, base: usize) -> Span {
    let trimmed = line.trim();
    let lead = line.len() - line.trim_start().len();
    Span::new(SrcOffset(base + lead), trimmed.len())
}

fn parse_line(src: &str, line_no: usize, toks: &[Token], span: Span) -> Result<SrcLine> {
    let mut it = toks.iter().peekable();

    // Optional `ident:` label prefix
    let label = match (toks.first(), toks.get(1)) {
        (
            Some(Token {
                kind: TokenKind::Ident,
                span: lspan,
            }),
            Some(Token {
                kind: TokenKind::Colon,
                ..
            }),
        ) => {
            it.next();
            it.next();
            Some((src[lspan.range()].to_string(), *lspan))
        }
        _ => None,
    };

    let body = match it.next() {
        None => {
            return Ok(SrcLine {
                line_no,
                label,
                body: LineBody::Empty,
                operands: Vec::new(),
                span,
            })
        }
        Some(tok) => match tok.kind {
            TokenKind::Ident => {
                // Mnemonic recognition happens exactly once, here. Pass 1
                // and pass 2 both consume the resulting closed enum, so a
                // mnemonic can never be sized by one pass and rejected by
                // the other.
                let text = &src[tok.span.range()];
                match InstrKind::from_str(text) {
                    Ok(kind) => LineBody::Instr(kind),
                    Err(()) => return Err(error::asm_unsupported(tok.span, src)),
                }
            }
            TokenKind::Dir(dir) => LineBody::Dir(dir),
            _ => return Err(error::parse_expected(tok.span, src, "an instruction or directive")),
        },
    };

    let mut operands = Vec::new();
    while let Some(tok) = it.next() {
        if tok.kind == TokenKind::Comma {
            continue;
        }
        operands.push(parse_operand(src, span, tok, &mut it)?);
    }

    Ok(SrcLine {
        line_no,
        label,
        body,
        operands,
        span,
    })
}

fn parse_operand(
    src: &str,
    line_span: Span,
    tok: &Token,
    it: &mut Peekable<Iter<Token>>,
) -> Result<Operand> {
    let op = match tok.kind {
        TokenKind::Reg(reg) => Operand {
            kind: OperandKind::Reg(reg),
            span: tok.span,
        },
        TokenKind::Hash => {
            let num = expect(src, line_span, it, "a number after '#'")?;
            match num.kind {
                TokenKind::Num(val) => Operand {
                    kind: OperandKind::Imm(val),
                    span: tok.span.join(num.span),
                },
                _ => return Err(error::parse_expected(num.span, src, "a number after '#'")),
            }
        }
        TokenKind::Num(val) => Operand {
            kind: OperandKind::Num(val),
            span: tok.span,
        },
        TokenKind::Ident => Operand {
            kind: OperandKind::LabelRef(src[tok.span.range()].to_string()),
            span: tok.span,
        },
        TokenKind::LBracket => parse_indexed(src, line_span, tok, it)?,
        _ => return Err(error::parse_expected(tok.span, src, "an operand")),
    };
    Ok(op)
}

/// `[rs]` or `[rs + n]`, using the bracket punctuation reserved for
/// indexed addressing.
fn parse_indexed(
    src: &str,
    line_span: Span,
    open: &Token,
    it: &mut Peekable<Iter<Token>>,
) -> Result<Operand> {
    let reg_tok = expect(src, line_span, it, "a register after '['")?;
    let TokenKind::Reg(reg) = reg_tok.kind else {
        return Err(error::parse_expected(reg_tok.span, src, "a register after '['"));
    };

    let next = expect(src, line_span, it, "']' or '+'")?;
    match next.kind {
        TokenKind::RBracket => Ok(Operand {
            kind: OperandKind::Ind(reg),
            span: open.span.join(next.span),
        }),
        TokenKind::Plus => {
            let num = expect(src, line_span, it, "a number after '+'")?;
            let TokenKind::Num(offs) = num.kind else {
                return Err(error::parse_expected(num.span, src, "a number after '+'"));
            };
            let close = expect(src, line_span, it, "']'")?;
            if close.kind != TokenKind::RBracket {
                return Err(error::parse_expected(close.span, src, "']'"));
            }
            Ok(Operand {
                kind: OperandKind::IndOffs(reg, offs),
                span: open.span.join(close.span),
            })
        }
        _ => Err(error::parse_expected(next.span, src, "']' or '+'")),
    }
}

fn expect<'t>(
    src: &str,
    line_span: Span,
    it: &mut Peekable<Iter<'t, Token>>,
    what: &str,
) -> Result<&'t Token> {
    it.next().ok_or_else(|| error::parse_eol(line_span, src, what))
}

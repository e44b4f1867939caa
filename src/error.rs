use std::num::ParseIntError;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::span::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "valid tokens are identifiers, numbers, registers and `, : # [ ] +`",
        labels = vec![LabeledSpan::at(span, "unexpected character")],
        "Encountered an unexpected character at offset {}",
        span.offs(),
    )
    .with_source_code(src.to_string())
}

pub fn lex_bad_lit(span: Span, src: &str, e: ParseIntError) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "decimal or 0x-prefixed hex literals from 0 to 65,535 are allowed",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid numeric literal: {e}",
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_dir(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::dir",
        help = "available directives are .org and .word",
        labels = vec![LabeledSpan::at(span, "incorrect directive")],
        "Encountered an invalid directive.",
    )
    .with_source_code(src.to_string())
}

// Parser errors

pub fn parse_expected(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "check the operands for this line",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Expected {expected}",
    )
    .with_source_code(src.to_string())
}

pub fn parse_eol(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_eol",
        help = "the line ends before this operand is complete",
        labels = vec![LabeledSpan::at(span, "incomplete operand")],
        "Expected {expected} before end of line",
    )
    .with_source_code(src.to_string())
}

pub fn parse_operand(span: Span, src: &str, instr: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand",
        help = format!("check the operand forms allowed for {instr}"),
        labels = vec![LabeledSpan::at(span, "invalid operand")],
        "{instr} expects {expected}",
    )
    .with_source_code(src.to_string())
}

// Assembler errors

pub fn asm_unsupported(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unsupported",
        help = "check the instruction listing for the supported mnemonics",
        labels = vec![LabeledSpan::at(span, "unknown mnemonic")],
        "Unsupported instruction",
    )
    .with_source_code(src.to_string())
}

pub fn asm_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels may only be defined once per file",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label definition",
    )
    .with_source_code(src.to_string())
}

pub fn asm_undefined_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_label",
        help = "the referenced label is not defined anywhere in this file",
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Reference to undefined label",
    )
    .with_source_code(src.to_string())
}

pub fn asm_org_forward(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_label",
        help = "addressing is resolved in one forward pass, so .org may only \
                name a label defined above it",
        labels = vec![LabeledSpan::at(span, "not yet defined")],
        ".org references a label that is not yet defined",
    )
    .with_source_code(src.to_string())
}

pub fn asm_range(span: Span, src: &str, val: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::range",
        help = "signed offsets range from -32,768 to 32,767; values from 0 to 65,535",
        labels = vec![LabeledSpan::at(span, "does not fit in 16 bits")],
        "Value {val} does not fit in a 16-bit word",
    )
    .with_source_code(src.to_string())
}

// Runtime faults. These have no source span: they report against the
// machine state instead.

pub fn run_address(addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::address",
        help = "16-bit word accesses need two bytes inside 0x0000-0xFFFF",
        "Memory access at 0x{addr:04X} falls outside the addressable space",
    )
}

pub fn run_stack(sp: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::address",
        help = "the stack segment spans 0x1000-0x7FFF and grows downward from 0x7FFF",
        "Stack pointer 0x{sp:04X} left the stack segment",
    )
}

pub fn run_decode(word: u16, addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::decode",
        help = "the word at this address is not a valid opcode/mode combination",
        "Cannot decode instruction word 0x{word:04X} at 0x{addr:04X}",
    )
}

pub fn run_load(base: u16, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::address",
        help = "the image must fit between the base address and 0xFFFF",
        "Program image of {len} bytes does not fit at base 0x{base:04X}",
    )
}

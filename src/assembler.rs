//! Two-pass assembler. Pass 1 walks parsed lines with a running byte
//! address, building the symbol table; pass 2 re-walks them against the
//! frozen table and emits instruction words.
//!
//! Addressing is byte-granular throughout: one emitted word advances the
//! location counter by 2, and a jump (opcode word + offset word) spans 4
//! bytes. PC-relative offsets are relative to the address immediately
//! after the full instruction, which is exactly the CPU's PC value once
//! both words have been fetched.

use miette::Result;

use crate::error;
use crate::isa::{pack, AddrMode, DirKind, InstrKind, Register, DEFAULT_ORIGIN};
use crate::parser::{self, LineBody, Operand, OperandKind, SrcLine};
use crate::span::Span;
use crate::symbol::SymbolTable;

/// Assembled program: flat little-endian image plus debugging artifacts.
pub struct Program {
    /// Address of the first emitted word; the natural load base.
    pub origin: u16,
    /// Little-endian byte sequence of all emitted words, no header.
    pub bytes: Vec<u8>,
    pub symbols: SymbolTable,
    /// One entry per non-empty source line, in file order.
    pub map: Vec<MapEntry>,
}

/// Source map record correlating emitted bytes back to a source line.
/// Never mutated after assembly; consumed by external debugging display.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MapEntry {
    /// 1-based source line number.
    pub line_no: usize,
    /// Address of the first emitted word, or None if the line emits nothing.
    pub addr: Option<u16>,
    pub bytes: Vec<u8>,
    /// Trimmed original source text.
    pub text: String,
}

/// Addressing context built by pass 1 and consumed read-only by pass 2.
struct AsmContext {
    line_addr: Vec<u16>,
    symbols: SymbolTable,
}

/// Assemble source text into a program image.
///
/// Pure function: no state persists across calls, and identical source
/// yields byte-identical output. The first error aborts the call with no
/// partial output.
pub fn assemble(src: &str) -> Result<Program> {
    let lines = parser::parse(src)?;
    let ctx = pass1(src, &lines)?;
    pass2(src, &lines, ctx)
}

// ---------------- Pass 1: addressing & symbols ----------------

fn pass1(src: &str, lines: &[SrcLine]) -> Result<AsmContext> {
    let mut addr: u16 = DEFAULT_ORIGIN;
    let mut line_addr = Vec::with_capacity(lines.len());
    let mut symbols = SymbolTable::new();

    for line in lines {
        line_addr.push(addr);

        if let Some((name, span)) = &line.label {
            if symbols.insert(name, addr).is_err() {
                return Err(error::asm_duplicate_label(*span, src));
            }
        }

        match line.body {
            LineBody::Empty => {}
            LineBody::Dir(DirKind::Org) => {
                addr = org_target(src, line, &symbols)?;
            }
            LineBody::Dir(DirKind::Word) => {
                addr = addr.wrapping_add(2);
            }
            LineBody::Instr(kind) => {
                addr = addr.wrapping_add(2 * instr_words(kind, &line.operands));
            }
        }
    }

    Ok(AsmContext { line_addr, symbols })
}

/// Resolve the operand of `.org`: a numeric literal, or a label that is
/// already defined. Pass 1 is single-directional, so forward references
/// here cannot be supported.
fn org_target(src: &str, line: &SrcLine, symbols: &SymbolTable) -> Result<u16> {
    let op = expect_arity(src, line, 1)?;
    match &op[0].kind {
        OperandKind::Num(val) => Ok(*val),
        OperandKind::LabelRef(name) => symbols
            .get(name)
            .ok_or_else(|| error::asm_org_forward(op[0].span, src)),
        _ => Err(error::parse_operand(
            op[0].span,
            src,
            ".org",
            "a numeric literal or an already-defined label",
        )),
    }
}

/// Word count for an instruction, by mnemonic identity and operand shape.
/// This is the sizing half of the encoding rules in `encode_instr`; both
/// match on the same closed enum.
fn instr_words(kind: InstrKind, ops: &[Operand]) -> u16 {
    use InstrKind::*;
    match kind {
        Nop | Halt | Ret | Push | Pop => 1,
        // Jumps always carry a signed offset word
        Jmp | Jz | Jnz | Jc | Jnc | Jn | Call => 2,
        Mov | Add | Sub | And | Or | Xor | Cmp | Shl | Shr => {
            match ops.get(1).map(|op| &op.kind) {
                Some(OperandKind::Imm(_)) => 2,
                _ => 1,
            }
        }
        Load | Store | In | Out => match ops.get(1).map(|op| &op.kind) {
            // Register-indirect packs into the opcode word
            Some(OperandKind::Ind(_)) => 1,
            // Direct and offset forms carry an address word
            _ => 2,
        },
    }
}

// ---------------- Pass 2: encoding ----------------

fn pass2(src: &str, lines: &[SrcLine], ctx: AsmContext) -> Result<Program> {
    let mut bytes = Vec::new();
    let mut map = Vec::with_capacity(lines.len());
    let mut origin = None;

    for (i, line) in lines.iter().enumerate() {
        let addr = ctx.line_addr[i];
        let mut words = Vec::new();

        match line.body {
            LineBody::Empty => {}
            // Addressing-only; emits nothing
            LineBody::Dir(DirKind::Org) => {}
            LineBody::Dir(DirKind::Word) => {
                let ops = expect_arity(src, line, 1)?;
                words.push(resolve_value(src, &ops[0], &ctx.symbols)?);
            }
            LineBody::Instr(kind) => {
                encode_instr(src, kind, line, addr, &ctx.symbols, &mut words)?;
            }
        }

        debug_assert_eq!(
            words.len() as u16,
            match line.body {
                LineBody::Instr(kind) => instr_words(kind, &line.operands),
                LineBody::Dir(DirKind::Word) => 1,
                _ => 0,
            },
            "pass 1 sizing must match pass 2 emission"
        );

        let line_bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        if origin.is_none() && !line_bytes.is_empty() {
            origin = Some(addr);
        }
        map.push(MapEntry {
            line_no: line.line_no,
            addr: (!line_bytes.is_empty()).then_some(addr),
            bytes: line_bytes.clone(),
            text: src[line.span.range()].to_string(),
        });
        bytes.extend(line_bytes);
    }

    Ok(Program {
        origin: origin.unwrap_or(DEFAULT_ORIGIN),
        bytes,
        symbols: ctx.symbols,
        map,
    })
}

fn encode_instr(
    src: &str,
    kind: InstrKind,
    line: &SrcLine,
    addr: u16,
    symbols: &SymbolTable,
    out: &mut Vec<u16>,
) -> Result<()> {
    use InstrKind::*;
    match kind {
        Nop | Halt | Ret => {
            expect_arity(src, line, 0)?;
            out.push(pack(kind, AddrMode::Register, 0, 0));
        }
        Push | Pop => {
            let ops = expect_arity(src, line, 1)?;
            let rd = expect_reg(src, kind, &ops[0])?;
            out.push(pack(kind, AddrMode::Register, rd as u8, 0));
        }
        Mov | Add | Sub | And | Or | Xor | Cmp | Shl | Shr => {
            let ops = expect_arity(src, line, 2)?;
            let rd = expect_reg(src, kind, &ops[0])?;
            match ops[1].kind {
                OperandKind::Reg(rs) => {
                    out.push(pack(kind, AddrMode::Register, rd as u8, rs as u8));
                }
                OperandKind::Imm(val) => {
                    out.push(pack(kind, AddrMode::Immediate, rd as u8, 0));
                    out.push(val);
                }
                _ => {
                    return Err(error::parse_operand(
                        ops[1].span,
                        src,
                        kind.mnemonic(),
                        "a register or immediate second operand",
                    ))
                }
            }
        }
        Jmp | Jz | Jnz | Jc | Jnc | Jn | Call => {
            let ops = expect_arity(src, line, 1)?;
            let target = match &ops[0].kind {
                OperandKind::Num(val) => *val,
                OperandKind::LabelRef(name) => symbols
                    .get(name)
                    .ok_or_else(|| error::asm_undefined_label(ops[0].span, src))?,
                _ => {
                    return Err(error::parse_operand(
                        ops[0].span,
                        src,
                        kind.mnemonic(),
                        "a label or address target",
                    ))
                }
            };
            // Relative to the address immediately after both words of the
            // jump, i.e. the PC the CPU holds when it applies the offset.
            let offset = target as i32 - (addr as i32 + 4);
            if i16::try_from(offset).is_err() {
                return Err(error::asm_range(ops[0].span, src, offset));
            }
            out.push(pack(kind, AddrMode::PcRelative, 0, 0));
            out.push(offset as u16);
        }
        Load | Store | In | Out => {
            let ops = expect_arity(src, line, 2)?;
            let rd = expect_reg(src, kind, &ops[0])?;
            match &ops[1].kind {
                OperandKind::Num(_) | OperandKind::LabelRef(_) => {
                    let target = resolve_value(src, &ops[1], symbols)?;
                    out.push(pack(kind, AddrMode::Direct, rd as u8, 0));
                    out.push(target);
                }
                OperandKind::Ind(rs) => {
                    out.push(pack(kind, AddrMode::Indirect, rd as u8, *rs as u8));
                }
                OperandKind::IndOffs(rs, offs) => {
                    out.push(pack(kind, AddrMode::Offset, rd as u8, *rs as u8));
                    out.push(*offs);
                }
                _ => {
                    return Err(error::parse_operand(
                        ops[1].span,
                        src,
                        kind.mnemonic(),
                        "an address, [reg] or [reg + offset] operand",
                    ))
                }
            }
        }
    }
    Ok(())
}

/// Resolve a raw-number or label operand to its 16-bit value.
fn resolve_value(src: &str, op: &Operand, symbols: &SymbolTable) -> Result<u16> {
    match &op.kind {
        OperandKind::Num(val) => Ok(*val),
        OperandKind::LabelRef(name) => symbols
            .get(name)
            .ok_or_else(|| error::asm_undefined_label(op.span, src)),
        _ => Err(error::parse_operand(
            op.span,
            src,
            "this line",
            "a numeric literal or label",
        )),
    }
}

fn expect_reg(src: &str, kind: InstrKind, op: &Operand) -> Result<Register> {
    match op.kind {
        OperandKind::Reg(reg) => Ok(reg),
        _ => Err(error::parse_operand(
            op.span,
            src,
            kind.mnemonic(),
            "a register first operand",
        )),
    }
}

fn expect_arity<'l>(src: &str, line: &'l SrcLine, n: usize) -> Result<&'l [Operand]> {
    if line.operands.len() != n {
        return Err(error::parse_operand(
            line.span,
            src,
            &src[line.span.range()],
            match n {
                0 => "no operands",
                1 => "exactly one operand",
                _ => "exactly two operands",
            },
        ));
    }
    Ok(&line.operands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(src: &str) -> Vec<u16> {
        let prog = assemble(src).unwrap();
        prog.bytes
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn deterministic() {
        let src = "start: mov r0, #5\n  call fn\n  halt\nfn: ret\n";
        assert_eq!(assemble(src).unwrap().bytes, assemble(src).unwrap().bytes);
    }

    #[test]
    fn immediate_add_matches_original_encoding() {
        // The hand-assembled words from the original emulator smoke test
        assert_eq!(
            words("add r0, #10\nadd r0, #5\nnop\nhalt"),
            vec![0x2900, 10, 0x2900, 5, 0x0000, 0x0800]
        );
    }

    #[test]
    fn register_form_is_one_word() {
        assert_eq!(
            words("add r1, r2"),
            vec![pack(InstrKind::Add, AddrMode::Register, 1, 2)]
        );
    }

    #[test]
    fn forward_reference_offset() {
        // jmp at 0x8000 (4 bytes), nop at 0x8004, end at 0x8006
        let src = "jmp end\nnop\nend: halt";
        let prog = assemble(src).unwrap();
        assert_eq!(prog.symbols.get("end"), Some(0x8006));
        let w = words(src);
        assert_eq!(w[0], pack(InstrKind::Jmp, AddrMode::PcRelative, 0, 0));
        // offset + (jump address + 4) == label address
        assert_eq!(w[1] as i16 as i32 + (0x8000 + 4), 0x8006);
        assert_eq!(w[1], 2);
    }

    #[test]
    fn backward_reference_offset() {
        // top at 0x8000, jmp at 0x8002
        let src = "top: nop\njmp top";
        let w = words(src);
        assert_eq!(w[2] as i16 as i32 + (0x8002 + 4), 0x8000);
        assert_eq!(w[2], (-6i16) as u16);
    }

    #[test]
    fn duplicate_label_fails_with_no_output() {
        let res = assemble("x: nop\nx: halt");
        assert!(res.is_err());
    }

    #[test]
    fn undefined_label_fails() {
        assert!(assemble("jmp nowhere").is_err());
        assert!(assemble(".word nowhere").is_err());
    }

    #[test]
    fn org_sets_addressing_only() {
        let src = ".org 0x9000\nhere: halt";
        let prog = assemble(src).unwrap();
        assert_eq!(prog.symbols.get("here"), Some(0x9000));
        assert_eq!(prog.origin, 0x9000);
        // .org itself emits nothing
        assert_eq!(prog.bytes.len(), 2);
    }

    #[test]
    fn org_accepts_defined_label_only() {
        let src = "base: nop\n.org base\nhalt";
        let prog = assemble(src).unwrap();
        assert_eq!(prog.symbols.get("base"), Some(0x8000));
        assert!(assemble(".org later\nlater: nop").is_err());
    }

    #[test]
    fn word_directive() {
        let src = "val: .word 0x1234\nptr: .word val";
        let w = words(src);
        assert_eq!(w, vec![0x1234, 0x8000]);
    }

    #[test]
    fn label_only_line_takes_next_address() {
        let src = "nop\nmark:\nhalt";
        let prog = assemble(src).unwrap();
        assert_eq!(prog.symbols.get("mark"), Some(0x8002));
    }

    #[test]
    fn stack_forms() {
        assert_eq!(
            words("push r3\npop r6"),
            vec![
                pack(InstrKind::Push, AddrMode::Register, 3, 0),
                pack(InstrKind::Pop, AddrMode::Register, 6, 0),
            ]
        );
    }

    #[test]
    fn memory_forms() {
        assert_eq!(
            words("load r1, 0x0010"),
            vec![pack(InstrKind::Load, AddrMode::Direct, 1, 0), 0x0010]
        );
        assert_eq!(
            words("load r1, [r2]"),
            vec![pack(InstrKind::Load, AddrMode::Indirect, 1, 2)]
        );
        assert_eq!(
            words("store r1, [r2 + 4]"),
            vec![pack(InstrKind::Store, AddrMode::Offset, 1, 2), 4]
        );
    }

    #[test]
    fn io_forms() {
        assert_eq!(
            words("in r0, 0xF001\nout r1, 0xF000"),
            vec![
                pack(InstrKind::In, AddrMode::Direct, 0, 0),
                0xF001,
                pack(InstrKind::Out, AddrMode::Direct, 1, 0),
                0xF000,
            ]
        );
    }

    #[test]
    fn operand_shape_errors() {
        assert!(assemble("add #5, r0").is_err());
        assert!(assemble("add r0").is_err());
        assert!(assemble("push #5").is_err());
        assert!(assemble("halt r0").is_err());
        assert!(assemble("mov r0, [r1 + r2]").is_err());
    }

    #[test]
    fn source_map_entries() {
        let src = "; header\nstart: mov r0, #1\nhalt";
        let prog = assemble(src).unwrap();
        assert_eq!(prog.map.len(), 3);
        assert_eq!(prog.map[0].addr, None);
        assert!(prog.map[0].bytes.is_empty());
        assert_eq!(prog.map[1].line_no, 2);
        assert_eq!(prog.map[1].addr, Some(0x8000));
        assert_eq!(prog.map[1].bytes.len(), 4);
        assert_eq!(prog.map[1].text, "start: mov r0, #1");
        assert_eq!(prog.map[2].addr, Some(0x8004));
    }

    #[test]
    fn branch_offset_out_of_range() {
        // Target so far below the jump that the offset underflows i16
        let src = ".org 0xF000\njmp 0x0000";
        assert!(assemble(src).is_err());
    }
}

//! The BR-16 instruction set: a fixed, small, teaching-grade ISA.
//!
//! An instruction word is 16 bits laid out as
//! `opcode(5) | mode(3) | rd(3) | rs(3) | unused(2)`. Immediate, direct,
//! offset and PC-relative forms carry one additional raw 16-bit word.

use std::fmt;
use std::str::FromStr;

/// Default assembly origin and load base for program images.
pub const DEFAULT_ORIGIN: u16 = 0x8000;
/// Initial stack pointer. The stack grows downward from here.
pub const SP_INIT: u16 = 0x7FFF;

/// Fixed memory segmentation. Ranges are inclusive byte addresses.
pub const DATA_START: u16 = 0x0000;
pub const DATA_END: u16 = 0x0FFF;
pub const STACK_START: u16 = 0x1000;
pub const STACK_END: u16 = 0x7FFF;
pub const CODE_START: u16 = 0x8000;
pub const CODE_END: u16 = 0xEFFF;
pub const IO_START: u16 = 0xF000;
pub const IO_END: u16 = 0xF0FF;

/// Represents the CPU's general-purpose registers.
///
/// Roles beyond R0-R7 being interchangeable (e.g. using R6 as a frame
/// pointer) are calling conventions only and are not enforced in hardware.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    pub fn from_bits(bits: u8) -> Register {
        // Field is masked to 3 bits before this is called.
        match bits & 0b111 {
            0 => Register::R0,
            1 => Register::R1,
            2 => Register::R2,
            3 => Register::R3,
            4 => Register::R4,
            5 => Register::R5,
            6 => Register::R6,
            _ => Register::R7,
        }
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some('r' | 'R'), Some(num), None) => match num {
                '0' => Ok(Register::R0),
                '1' => Ok(Register::R1),
                '2' => Ok(Register::R2),
                '3' => Ok(Register::R3),
                '4' => Ok(Register::R4),
                '5' => Ok(Register::R5),
                '6' => Ok(Register::R6),
                '7' => Ok(Register::R7),
                _ => Err(()),
            },
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", *self as u8)
    }
}

/// Assembler directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Org,
    Word,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(".org") {
            Ok(DirKind::Org)
        } else if s.eq_ignore_ascii_case(".word") {
            Ok(DirKind::Word)
        } else {
            Err(())
        }
    }
}

/// The closed instruction set. Both assembler passes and the emulator match
/// exhaustively on this enum, so sizing, encoding and execution cannot
/// drift apart for any mnemonic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Nop = 0,
    Halt = 1,
    Mov = 2,
    Load = 3,
    Store = 4,
    Add = 5,
    Sub = 6,
    And = 7,
    Or = 8,
    Xor = 9,
    Cmp = 10,
    Shl = 11,
    Shr = 12,
    Jmp = 13,
    Jz = 14,
    Jnz = 15,
    Jc = 16,
    Jnc = 17,
    Jn = 18,
    Call = 19,
    Ret = 20,
    Push = 21,
    Pop = 22,
    In = 23,
    Out = 24,
}

impl InstrKind {
    pub fn opcode(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Option<InstrKind> {
        use InstrKind::*;
        Some(match bits {
            0 => Nop,
            1 => Halt,
            2 => Mov,
            3 => Load,
            4 => Store,
            5 => Add,
            6 => Sub,
            7 => And,
            8 => Or,
            9 => Xor,
            10 => Cmp,
            11 => Shl,
            12 => Shr,
            13 => Jmp,
            14 => Jz,
            15 => Jnz,
            16 => Jc,
            17 => Jnc,
            18 => Jn,
            19 => Call,
            20 => Ret,
            21 => Push,
            22 => Pop,
            23 => In,
            24 => Out,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        use InstrKind::*;
        match self {
            Nop => "NOP",
            Halt => "HALT",
            Mov => "MOV",
            Load => "LOAD",
            Store => "STORE",
            Add => "ADD",
            Sub => "SUB",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Cmp => "CMP",
            Shl => "SHL",
            Shr => "SHR",
            Jmp => "JMP",
            Jz => "JZ",
            Jnz => "JNZ",
            Jc => "JC",
            Jnc => "JNC",
            Jn => "JN",
            Call => "CALL",
            Ret => "RET",
            Push => "PUSH",
            Pop => "POP",
            In => "IN",
            Out => "OUT",
        }
    }
}

impl FromStr for InstrKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use InstrKind::*;
        // Mnemonics are case-insensitive in source.
        Ok(match s.to_ascii_uppercase().as_str() {
            "NOP" => Nop,
            "HALT" => Halt,
            "MOV" => Mov,
            "LOAD" => Load,
            "STORE" => Store,
            "ADD" => Add,
            "SUB" => Sub,
            "AND" => And,
            "OR" => Or,
            "XOR" => Xor,
            "CMP" => Cmp,
            "SHL" => Shl,
            "SHR" => Shr,
            "JMP" => Jmp,
            "JZ" => Jz,
            "JNZ" => Jnz,
            "JC" => Jc,
            "JNC" => Jnc,
            "JN" => Jn,
            "CALL" => Call,
            "RET" => Ret,
            "PUSH" => Push,
            "POP" => Pop,
            "IN" => In,
            "OUT" => Out,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

/// Addressing mode selector, bits 10:8 of the instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddrMode {
    Register = 0,
    Immediate = 1,
    Direct = 2,
    Indirect = 3,
    Offset = 4,
    PcRelative = 5,
}

impl AddrMode {
    pub fn from_bits(bits: u8) -> Option<AddrMode> {
        use AddrMode::*;
        Some(match bits {
            0 => Register,
            1 => Immediate,
            2 => Direct,
            3 => Indirect,
            4 => Offset,
            5 => PcRelative,
            _ => return None,
        })
    }

    /// Whether an opcode word in this mode is followed by an extra raw word
    /// (immediate value, address, or signed PC-relative offset).
    pub fn has_extra_word(self) -> bool {
        use AddrMode::*;
        matches!(self, Immediate | Direct | Offset | PcRelative)
    }
}

impl fmt::Display for AddrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddrMode::*;
        f.pad(match self {
            Register => "reg",
            Immediate => "imm",
            Direct => "dir",
            Indirect => "ind",
            Offset => "offs",
            PcRelative => "rel",
        })
    }
}

/// Pack instruction fields into a single word.
pub fn pack(kind: InstrKind, mode: AddrMode, rd: u8, rs: u8) -> u16 {
    ((kind.opcode() as u16 & 0x1F) << 11)
        | ((mode as u16 & 0x07) << 8)
        | ((rd as u16 & 0x07) << 5)
        | ((rs as u16 & 0x07) << 2)
}

/// Whether `addr` falls inside the memory-mapped I/O segment.
pub fn in_io_segment(addr: u16) -> bool {
    (IO_START..=IO_END).contains(&addr)
}

/// Whether `addr` is a valid stack pointer value.
pub fn in_stack_segment(addr: u16) -> bool {
    (STACK_START..=STACK_END).contains(&addr)
}

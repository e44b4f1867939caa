// Assembling
mod lexer;
mod parser;
mod assembler;
pub use assembler::{assemble, MapEntry, Program};

// Running
mod runtime;
pub use runtime::{Cpu, Device, Status, DEFAULT_CYCLE_LIMIT, MEMORY_MAX};
mod alu;
pub use alu::Flags;
mod trace;
pub use trace::{replay, CycleTrace, DecodedInstr, MemWrite};

// Shared machine definition
mod isa;
pub use isa::{
    AddrMode, InstrKind, Register, CODE_END, CODE_START, DATA_END, DATA_START, DEFAULT_ORIGIN,
    IO_END, IO_START, SP_INIT, STACK_END, STACK_START,
};
mod symbol;
pub use symbol::SymbolTable;

mod error;
mod span;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

//! Execution trace records. One entry is appended per retired instruction
//! ("cycle" in this machine's vocabulary — not a hardware clock edge).
//! Entries are value records, never mutated after a run; replay tooling
//! reconstructs memory by folding the write lists in order.

use std::fmt;

use fxhash::FxHashMap;

use crate::alu::Flags;
use crate::isa::{AddrMode, InstrKind};

/// A single byte written to memory during a cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemWrite {
    pub addr: u16,
    pub old: u8,
    pub new: u8,
}

/// Instruction fields as extracted during decode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DecodedInstr {
    pub kind: InstrKind,
    pub mode: AddrMode,
    pub rd: u8,
    pub rs: u8,
    /// Immediate, address or branch offset word, if the form carries one.
    pub extra: Option<u16>,
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5} {:<4} rd={} rs={}", self.kind, self.mode, self.rd, self.rs)?;
        if let Some(extra) = self.extra {
            write!(f, " x={extra:04X}")?;
        }
        Ok(())
    }
}

/// State snapshot for one retired instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CycleTrace {
    /// 0-based retired-instruction index.
    pub cycle: usize,
    /// PC of the retired instruction (pre-fetch-advance).
    pub pc: u16,
    pub sp: u16,
    /// Register file after the instruction executed.
    pub regs: [u16; 8],
    pub flags: Flags,
    pub instr: DecodedInstr,
    /// Memory writes this cycle, in the order they happened.
    pub writes: Vec<MemWrite>,
}

/// Fold the write lists of `trace` into cumulative memory contents:
/// address -> final byte value over all touched addresses. A consumer can
/// reconstruct memory at any cycle by truncating the slice first.
pub fn replay(trace: &[CycleTrace]) -> FxHashMap<u16, u8> {
    let mut mem = FxHashMap::default();
    for entry in trace {
        for write in &entry.writes {
            mem.insert(write.addr, write.new);
        }
    }
    mem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{AddrMode, InstrKind};

    fn entry(cycle: usize, writes: Vec<MemWrite>) -> CycleTrace {
        CycleTrace {
            cycle,
            pc: 0x8000,
            sp: 0x7FFF,
            regs: [0; 8],
            flags: Flags::default(),
            instr: DecodedInstr {
                kind: InstrKind::Nop,
                mode: AddrMode::Register,
                rd: 0,
                rs: 0,
                extra: None,
            },
            writes,
        }
    }

    #[test]
    fn replay_keeps_last_write() {
        let trace = vec![
            entry(
                0,
                vec![
                    MemWrite { addr: 0x1000, old: 0, new: 0xAA },
                    MemWrite { addr: 0x1001, old: 0, new: 0xBB },
                ],
            ),
            entry(1, vec![MemWrite { addr: 0x1000, old: 0xAA, new: 0xCC }]),
        ];
        let mem = replay(&trace);
        assert_eq!(mem.get(&0x1000), Some(&0xCC));
        assert_eq!(mem.get(&0x1001), Some(&0xBB));
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn replay_respects_truncation() {
        let trace = vec![
            entry(0, vec![MemWrite { addr: 0x2000, old: 0, new: 1 }]),
            entry(1, vec![MemWrite { addr: 0x2000, old: 1, new: 2 }]),
        ];
        let mem = replay(&trace[..1]);
        assert_eq!(mem.get(&0x2000), Some(&1));
    }

    #[test]
    fn decoded_display() {
        let instr = DecodedInstr {
            kind: InstrKind::Add,
            mode: AddrMode::Immediate,
            rd: 0,
            rs: 0,
            extra: Some(10),
        };
        assert_eq!(instr.to_string(), "ADD   imm  rd=0 rs=0 x=000A");
    }
}

//! Fetch-decode-execute engine for the BR-16.
//!
//! One "cycle" is one retired instruction. The loop is fully synchronous
//! and deterministic; each `step` either completes and appends exactly one
//! trace entry, or faults leaving the state and trace as of the last
//! completed cycle.

use std::fmt;

use miette::Result;

use crate::alu::{self, Flags};
use crate::error;
use crate::isa::{
    in_io_segment, in_stack_segment, AddrMode, InstrKind, Register, DEFAULT_ORIGIN, SP_INIT,
};
use crate::trace::{CycleTrace, DecodedInstr, MemWrite};

/// The CPU addresses 64KiB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Guard for `run` against programs that never halt.
pub const DEFAULT_CYCLE_LIMIT: usize = 1_000_000;

/// Memory-mapped I/O capability, injected by the embedding caller.
///
/// The core hardwires no per-address semantics: which address is an output
/// port and which is an input port is configuration that lives entirely in
/// the device implementation, keeping the core headlessly testable.
pub trait Device {
    /// Called after a byte has been stored within the I/O segment.
    fn on_write(&mut self, addr: u16, val: u8);
    /// Service a byte read within the I/O segment. Return None to fall
    /// through to the stored memory contents.
    fn on_read(&mut self, addr: u16) -> Option<u8>;
}

/// How a run ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// The program executed HALT.
    Halted { cycles: usize },
    /// The cycle ceiling was reached before HALT.
    Exhausted { cycles: usize },
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Halted { cycles } => write!(f, "halted after {cycles} cycles"),
            Status::Exhausted { cycles } => {
                write!(f, "cycle limit reached after {cycles} cycles")
            }
        }
    }
}

/// Represents complete machine state during runtime.
///
/// One instance owns its registers and memory exclusively; independent runs
/// use independent instances.
pub struct Cpu {
    /// System memory - 64KiB in size.
    mem: Box<[u8; MEMORY_MAX]>,
    /// 8x 16-bit general-purpose registers
    reg: [u16; 8],
    sp: u16,
    pc: u16,
    flags: Flags,
    // Microarchitectural registers; trace visibility only
    ir: u16,
    mar: u16,
    mdr: u16,
    halted: bool,
    cycle: usize,
    trace: Vec<CycleTrace>,
    /// Writes of the cycle in flight, drained into the trace entry.
    writes: Vec<MemWrite>,
    device: Option<Box<dyn Device>>,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            mem: Box::new([0; MEMORY_MAX]),
            reg: [0; 8],
            sp: SP_INIT,
            pc: DEFAULT_ORIGIN,
            flags: Flags::default(),
            ir: 0,
            mar: 0,
            mdr: 0,
            halted: false,
            cycle: 0,
            trace: Vec::new(),
            writes: Vec::new(),
            device: None,
        }
    }

    /// Copy a flat program image into memory at `base` and point PC at it.
    pub fn load_image(&mut self, image: &[u8], base: u16) -> Result<()> {
        if base as usize + image.len() > MEMORY_MAX {
            return Err(error::run_load(base, image.len()));
        }
        self.mem[base as usize..base as usize + image.len()].copy_from_slice(image);
        self.pc = base;
        Ok(())
    }

    /// CPU loaded with an assembled program at its origin.
    pub fn from_program(program: &crate::assembler::Program) -> Result<Cpu> {
        let mut cpu = Cpu::new();
        cpu.load_image(&program.bytes, program.origin)?;
        Ok(cpu)
    }

    pub fn set_device(&mut self, device: Box<dyn Device>) {
        self.device = Some(device);
    }

    // State accessors. The state is frozen and fully inspectable once a
    // run ends.

    pub fn reg(&self, r: Register) -> u16 {
        self.reg[r as usize]
    }

    pub fn regs(&self) -> [u16; 8] {
        self.reg
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn ir(&self) -> u16 {
        self.ir
    }

    pub fn mar(&self) -> u16 {
        self.mar
    }

    pub fn mdr(&self) -> u16 {
        self.mdr
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn cycles(&self) -> usize {
        self.cycle
    }

    pub fn trace(&self) -> &[CycleTrace] {
        &self.trace
    }

    pub fn into_trace(self) -> Vec<CycleTrace> {
        self.trace
    }

    /// Raw memory inspection, bypassing any device.
    pub fn peek_byte(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    pub fn peek_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([
            self.mem[addr as usize],
            self.mem[addr.wrapping_add(1) as usize],
        ])
    }

    /// Run until HALT or the cycle ceiling, whichever comes first.
    pub fn run(&mut self, max_cycles: usize) -> Result<Status> {
        let limit = self.cycle + max_cycles;
        while !self.halted && self.cycle < limit {
            self.step()?;
        }
        Ok(if self.halted {
            Status::Halted { cycles: self.cycle }
        } else {
            Status::Exhausted { cycles: self.cycle }
        })
    }

    /// Retire one instruction. No-op once halted.
    pub fn step(&mut self) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        let pc0 = self.pc;

        // Fetch
        self.mar = self.pc;
        self.mdr = self.fetch_word(self.mar)?;
        self.ir = self.mdr;
        self.pc = self.pc.wrapping_add(2);

        // Decode
        let opcode = (self.ir >> 11) as u8;
        let kind = InstrKind::from_bits(opcode).ok_or_else(|| error::run_decode(self.ir, pc0))?;
        let mode = AddrMode::from_bits(((self.ir >> 8) & 0x07) as u8)
            .ok_or_else(|| error::run_decode(self.ir, pc0))?;
        let rd = ((self.ir >> 5) & 0x07) as u8;
        let rs = ((self.ir >> 2) & 0x07) as u8;
        let extra = if mode.has_extra_word() {
            self.mar = self.pc;
            self.mdr = self.fetch_word(self.mar)?;
            self.pc = self.pc.wrapping_add(2);
            Some(self.mdr)
        } else {
            None
        };
        let instr = DecodedInstr { kind, mode, rd, rs, extra };

        // Execute
        self.execute(instr, pc0)?;

        // A trace entry is appended only after the step fully completed,
        // never mid-step.
        let entry = CycleTrace {
            cycle: self.cycle,
            pc: pc0,
            sp: self.sp,
            regs: self.reg,
            flags: self.flags,
            instr,
            writes: std::mem::take(&mut self.writes),
        };
        self.trace.push(entry);
        self.cycle += 1;
        Ok(())
    }

    fn execute(&mut self, instr: DecodedInstr, pc0: u16) -> Result<()> {
        use InstrKind::*;
        let DecodedInstr { kind, mode, rd, rs, extra } = instr;
        let rd = rd as usize;

        match kind {
            Nop => {}
            Halt => self.halted = true,
            Mov => {
                self.reg[rd] = self.src_value(mode, rs, extra, pc0)?;
            }
            Load => {
                let val = match mode {
                    AddrMode::Immediate => extra.unwrap_or(0),
                    AddrMode::Register => self.reg[rs as usize],
                    _ => {
                        let addr = self.effective_addr(mode, rs, extra, pc0)?;
                        self.read_word(addr)?
                    }
                };
                self.reg[rd] = val;
            }
            Store => {
                let addr = self.effective_addr(mode, rs, extra, pc0)?;
                self.write_word(addr, self.reg[rd])?;
            }
            Add | Sub | And | Or | Xor | Cmp => {
                let a = self.reg[rd];
                let b = self.src_value(mode, rs, extra, pc0)?;
                let (res, flags) = match kind {
                    Add => alu::add(a, b),
                    // CMP computes SUB for flags only
                    Sub | Cmp => alu::sub(a, b),
                    And => alu::and(a, b),
                    Or => alu::or(a, b),
                    Xor => alu::xor(a, b),
                    _ => unreachable!(),
                };
                self.flags = flags;
                if kind != Cmp {
                    self.reg[rd] = res;
                }
            }
            Shl | Shr => {
                let a = self.reg[rd];
                let count = self.src_value(mode, rs, extra, pc0)?;
                let (res, flags) = if kind == Shl {
                    alu::shl(a, count)
                } else {
                    alu::shr(a, count)
                };
                self.flags = flags;
                self.reg[rd] = res;
            }
            Jmp | Jz | Jnz | Jc | Jnc | Jn | Call => {
                if mode != AddrMode::PcRelative {
                    return Err(error::run_decode(self.ir, pc0));
                }
                let taken = match kind {
                    Jmp | Call => true,
                    Jz => self.flags.zero(),
                    Jnz => !self.flags.zero(),
                    Jc => self.flags.carry(),
                    Jnc => !self.flags.carry(),
                    Jn => self.flags.negative(),
                    _ => unreachable!(),
                };
                if taken {
                    if kind == Call {
                        // Return address is the already-advanced PC
                        self.push_word(self.pc)?;
                    }
                    // PC already sits just past the instruction, which is
                    // exactly what the assembler computed the offset from.
                    self.pc = self.pc.wrapping_add(extra.unwrap_or(0));
                }
            }
            Ret => {
                self.pc = self.pop_word()?;
            }
            Push => {
                self.push_word(self.reg[rd])?;
            }
            Pop => {
                self.reg[rd] = self.pop_word()?;
            }
            In => {
                let addr = self.effective_addr(mode, rs, extra, pc0)?;
                self.reg[rd] = self.read_byte(addr) as u16;
            }
            Out => {
                let addr = self.effective_addr(mode, rs, extra, pc0)?;
                self.write_byte(addr, (self.reg[rd] & 0xFF) as u8);
            }
        }
        Ok(())
    }

    /// Second-operand value for register/immediate forms.
    fn src_value(&self, mode: AddrMode, rs: u8, extra: Option<u16>, pc0: u16) -> Result<u16> {
        match mode {
            AddrMode::Register => Ok(self.reg[rs as usize]),
            AddrMode::Immediate => Ok(extra.unwrap_or(0)),
            _ => Err(error::run_decode(self.ir, pc0)),
        }
    }

    /// Effective memory address for direct/indirect/offset forms.
    fn effective_addr(&self, mode: AddrMode, rs: u8, extra: Option<u16>, pc0: u16) -> Result<u16> {
        match mode {
            AddrMode::Direct => Ok(extra.unwrap_or(0)),
            AddrMode::Indirect => Ok(self.reg[rs as usize]),
            AddrMode::Offset => Ok(self.reg[rs as usize].wrapping_add(extra.unwrap_or(0))),
            _ => Err(error::run_decode(self.ir, pc0)),
        }
    }

    // Memory. Addresses are 16-bit by construction; the one impossible
    // access is a word whose high byte would land at 0x10000.

    fn fetch_word(&mut self, addr: u16) -> Result<u16> {
        if addr == u16::MAX {
            return Err(error::run_address(addr));
        }
        Ok(u16::from_le_bytes([
            self.mem[addr as usize],
            self.mem[addr as usize + 1],
        ]))
    }

    fn read_byte(&mut self, addr: u16) -> u8 {
        if in_io_segment(addr) {
            if let Some(device) = self.device.as_mut() {
                if let Some(val) = device.on_read(addr) {
                    return val;
                }
            }
        }
        self.mem[addr as usize]
    }

    fn read_word(&mut self, addr: u16) -> Result<u16> {
        if addr == u16::MAX {
            return Err(error::run_address(addr));
        }
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr + 1);
        self.mar = addr;
        self.mdr = u16::from_le_bytes([lo, hi]);
        Ok(self.mdr)
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        let old = self.mem[addr as usize];
        self.mem[addr as usize] = val;
        self.writes.push(MemWrite { addr, old, new: val });
        if in_io_segment(addr) {
            if let Some(device) = self.device.as_mut() {
                device.on_write(addr, val);
            }
        }
    }

    fn write_word(&mut self, addr: u16, val: u16) -> Result<()> {
        if addr == u16::MAX {
            return Err(error::run_address(addr));
        }
        let [lo, hi] = val.to_le_bytes();
        self.write_byte(addr, lo);
        self.write_byte(addr + 1, hi);
        self.mar = addr;
        self.mdr = val;
        Ok(())
    }

    // Stack. SP moves by exactly 2 per push/pop and must stay within the
    // stack segment.

    fn push_word(&mut self, val: u16) -> Result<()> {
        let new_sp = self.sp.wrapping_sub(2);
        if !in_stack_segment(new_sp) {
            return Err(error::run_stack(new_sp));
        }
        self.write_word(new_sp, val)?;
        self.sp = new_sp;
        Ok(())
    }

    fn pop_word(&mut self) -> Result<u16> {
        let val = self.read_word(self.sp)?;
        let new_sp = self.sp.wrapping_add(2);
        if !in_stack_segment(new_sp) {
            return Err(error::run_stack(new_sp));
        }
        self.sp = new_sp;
        Ok(val)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

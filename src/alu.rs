//! Arithmetic/logic unit: 16-bit operations plus flag derivation.
//!
//! Flag rule: Z = result is zero; N = bit 15 of the result; C = unsigned
//! carry/borrow out of the 16-bit operation; V = signed overflow
//! (same-sign operands producing a differing-sign result). Logical
//! operations clear C and V; shifts capture the last shifted-out bit in C.

use std::fmt;

/// Processor flags, packed into the low 4 bits of the FLAGS register.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Flags {
    bits: u8,
}

impl Flags {
    pub const Z: u8 = 0b0001;
    pub const N: u8 = 0b0010;
    pub const C: u8 = 0b0100;
    pub const V: u8 = 0b1000;

    pub fn from_bits(bits: u8) -> Flags {
        Flags { bits: bits & 0x0F }
    }

    pub fn bits(self) -> u8 {
        self.bits
    }

    pub fn zero(self) -> bool {
        self.bits & Self::Z != 0
    }

    pub fn negative(self) -> bool {
        self.bits & Self::N != 0
    }

    pub fn carry(self) -> bool {
        self.bits & Self::C != 0
    }

    pub fn overflow(self) -> bool {
        self.bits & Self::V != 0
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, ch) in [
            (self.zero(), 'Z'),
            (self.negative(), 'N'),
            (self.carry(), 'C'),
            (self.overflow(), 'V'),
        ] {
            write!(f, "{}", if set { ch } else { '-' })?;
        }
        Ok(())
    }
}

fn derive(result: u16, carry: bool, overflow: bool) -> Flags {
    let mut bits = 0;
    if result == 0 {
        bits |= Flags::Z;
    }
    if result & 0x8000 != 0 {
        bits |= Flags::N;
    }
    if carry {
        bits |= Flags::C;
    }
    if overflow {
        bits |= Flags::V;
    }
    Flags { bits }
}

pub fn add(a: u16, b: u16) -> (u16, Flags) {
    let wide = a as u32 + b as u32;
    let res = wide as u16;
    let overflow = (a ^ b) & 0x8000 == 0 && (a ^ res) & 0x8000 != 0;
    (res, derive(res, wide > 0xFFFF, overflow))
}

/// Subtraction; also provides CMP semantics (flags only, result discarded).
pub fn sub(a: u16, b: u16) -> (u16, Flags) {
    let res = a.wrapping_sub(b);
    let overflow = (a ^ b) & 0x8000 != 0 && (a ^ res) & 0x8000 != 0;
    (res, derive(res, a < b, overflow))
}

pub fn and(a: u16, b: u16) -> (u16, Flags) {
    let res = a & b;
    (res, derive(res, false, false))
}

pub fn or(a: u16, b: u16) -> (u16, Flags) {
    let res = a | b;
    (res, derive(res, false, false))
}

pub fn xor(a: u16, b: u16) -> (u16, Flags) {
    let res = a ^ b;
    (res, derive(res, false, false))
}

/// Left shift by `count & 0xF`, last shifted-out bit captured in C.
pub fn shl(a: u16, count: u16) -> (u16, Flags) {
    let count = (count & 0xF) as u32;
    if count == 0 {
        return (a, derive(a, false, false));
    }
    let carry = a & (1 << (16 - count)) != 0;
    let res = a << count;
    (res, derive(res, carry, false))
}

/// Logical right shift by `count & 0xF`, last shifted-out bit captured in C.
pub fn shr(a: u16, count: u16) -> (u16, Flags) {
    let count = (count & 0xF) as u32;
    if count == 0 {
        return (a, derive(a, false, false));
    }
    let carry = a & (1 << (count - 1)) != 0;
    let res = a >> count;
    (res, derive(res, carry, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_flags() {
        #[rustfmt::skip]
        let cases: &[(u16, u16, u16, bool, bool, bool, bool)] = &[
            // a       b       res     z      n      c      v
            (0x0000, 0x0000, 0x0000, true,  false, false, false),
            (0x0001, 0x0002, 0x0003, false, false, false, false),
            (0xFFFF, 0x0001, 0x0000, true,  false, true,  false),
            (0x7FFF, 0x0001, 0x8000, false, true,  false, true),
            (0x8000, 0x8000, 0x0000, true,  false, true,  true),
            (0xFFFF, 0xFFFF, 0xFFFE, false, true,  true,  false),
        ];
        for &(a, b, res, z, n, c, v) in cases {
            let (r, f) = add(a, b);
            assert_eq!(r, res, "add(0x{a:04X}, 0x{b:04X})");
            assert_eq!(
                (f.zero(), f.negative(), f.carry(), f.overflow()),
                (z, n, c, v),
                "flags for add(0x{a:04X}, 0x{b:04X})"
            );
        }
    }

    #[test]
    fn sub_flags() {
        #[rustfmt::skip]
        let cases: &[(u16, u16, u16, bool, bool, bool, bool)] = &[
            (0x0005, 0x0005, 0x0000, true,  false, false, false),
            (0x0005, 0x0003, 0x0002, false, false, false, false),
            (0x0003, 0x0005, 0xFFFE, false, true,  true,  false),
            (0x8000, 0x0001, 0x7FFF, false, false, false, true),
            (0x0000, 0x8000, 0x8000, false, true,  true,  true),
        ];
        for &(a, b, res, z, n, c, v) in cases {
            let (r, f) = sub(a, b);
            assert_eq!(r, res, "sub(0x{a:04X}, 0x{b:04X})");
            assert_eq!(
                (f.zero(), f.negative(), f.carry(), f.overflow()),
                (z, n, c, v),
                "flags for sub(0x{a:04X}, 0x{b:04X})"
            );
        }
    }

    #[test]
    fn logic_clears_carry_overflow() {
        let (r, f) = and(0xFF00, 0x0FF0);
        assert_eq!(r, 0x0F00);
        assert!(!f.carry() && !f.overflow());
        let (r, f) = or(0x8000, 0x0001);
        assert_eq!(r, 0x8001);
        assert!(f.negative());
        let (r, f) = xor(0xAAAA, 0xAAAA);
        assert_eq!(r, 0);
        assert!(f.zero());
    }

    #[test]
    fn shifts_capture_carry() {
        let (r, f) = shl(0x8001, 1);
        assert_eq!(r, 0x0002);
        assert!(f.carry());
        let (r, f) = shl(0x4000, 1);
        assert_eq!(r, 0x8000);
        assert!(!f.carry() && f.negative());
        let (r, f) = shr(0x0003, 1);
        assert_eq!(r, 0x0001);
        assert!(f.carry());
        let (r, f) = shr(0x0004, 2);
        assert_eq!(r, 0x0001);
        assert!(!f.carry());
    }

    #[test]
    fn shift_by_zero_keeps_value() {
        let (r, f) = shl(0x1234, 0);
        assert_eq!(r, 0x1234);
        assert!(!f.carry());
    }

    #[test]
    fn flag_display() {
        let (_, f) = add(0xFFFF, 0x0001);
        assert_eq!(f.to_string(), "Z-C-");
    }
}

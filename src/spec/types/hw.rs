use derive_more::Display;
use num_derive::FromPrimitive;
use static_assertions::const_assert;
use strum_macros::EnumIter;

pub type Byte = u8;
pub type Word = u16;

pub const BYTE_WIDTH: usize = 8;

pub const FLASHEND: usize = 0x3FFF;
pub const RAMEND: usize = 0x08FF;

/// Number of program words (16-bit instruction slots) in flash.
pub const FLASH_SIZE: usize = FLASHEND + 1;
/// Number of bytes of data memory, including the register file and I/O window.
pub const RAM_SIZE: usize = RAMEND + 1;

pub const REGISTER_COUNT: usize = 32;
pub const IO_OFFSET: usize = 0x20;
pub const IO_SIZE: usize = 0x40;

// The first 256 data memory cells are the register file, the I/O window and
// the extended I/O window. Assembled data begins immediately afterwards.
pub const REGISTER_WINDOW: usize = 0x100;
pub const RAM_START: usize = REGISTER_WINDOW;

pub const PCL_ADDR: usize = 0x5B;
pub const PCH_ADDR: usize = 0x5C;
pub const SPL_ADDR: usize = 0x5D;
pub const SPH_ADDR: usize = 0x5E;
pub const SREG_ADDR: usize = 0x5F;

const_assert!(REGISTER_COUNT + IO_SIZE <= REGISTER_WINDOW);
const_assert!(SPL_ADDR == IO_OFFSET + 0x3D);
const_assert!(SPH_ADDR == IO_OFFSET + 0x3E);
const_assert!(SREG_ADDR == IO_OFFSET + 0x3F);
const_assert!(RAM_START < RAM_SIZE);
const_assert!(RAMEND <= Word::MAX as usize);

pub const MAX_STEPS: u64 = 1_000_000;

pub const fn lo8(v: Word) -> Byte {
    (v & 0x00FF) as Byte
}

pub const fn hi8(v: Word) -> Byte {
    (v >> BYTE_WIDTH) as Byte
}

pub const fn word_from_bytes(lo: Byte, hi: Byte) -> Word {
    ((hi as Word) << BYTE_WIDTH) | lo as Word
}

/// Truncates to the low byte, so `-1` becomes `0xFF`.
pub const fn byte_from_i64_wrapping(i: i64) -> Byte {
    (i & 0xFF) as Byte
}

pub const fn io_to_data_addr(io: usize) -> usize {
    io + IO_OFFSET
}

/// The status register bits, by index.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromPrimitive, EnumIter)]
pub enum SRegBit {
    C = 0,
    Z = 1,
    N = 2,
    V = 3,
    S = 4,
    H = 5,
    T = 6,
    I = 7,
}

/// A 16-bit pointer formed from a pair of the upper registers.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    pub const fn lo_reg(self) -> usize {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }

    pub const fn hi_reg(self) -> usize {
        self.lo_reg() + 1
    }

    pub fn from_letter(c: char) -> Option<Pointer> {
        match c.to_ascii_uppercase() {
            'X' => Some(Pointer::X),
            'Y' => Some(Pointer::Y),
            'Z' => Some(Pointer::Z),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_helpers() {
        assert_eq!(lo8(0x1234), 0x34);
        assert_eq!(hi8(0x1234), 0x12);
        assert_eq!(word_from_bytes(0x34, 0x12), 0x1234);
        assert_eq!(byte_from_i64_wrapping(-1), 0xFF);
        assert_eq!(byte_from_i64_wrapping(0x1FF), 0xFF);
    }

    #[test]
    fn pointer_registers() {
        assert_eq!(Pointer::X.lo_reg(), 26);
        assert_eq!(Pointer::Z.hi_reg(), 31);
        assert_eq!(Pointer::from_letter('y'), Some(Pointer::Y));
        assert_eq!(Pointer::from_letter('W'), None);
    }
}

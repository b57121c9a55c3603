use crate::spec::types::hw::{hi8, Byte, SRegBit, Word};
use bitflags::bitflags;
use std::fmt::{self, Display};

bitflags! {
    #[derive(Default)]
    pub struct Flags: Byte {
        const C = 1 << 0;
        const Z = 1 << 1;
        const N = 1 << 2;
        const V = 1 << 3;
        const S = 1 << 4;
        const H = 1 << 5;
        const T = 1 << 6;
        const I = 1 << 7;
    }
}

impl Flags {
    pub fn of_bit(bit: SRegBit) -> Flags {
        Flags::from_bits_truncate(1 << bit as u8)
    }

    const ARITH: Flags = Flags::from_bits_truncate(
        Flags::H.bits | Flags::S.bits | Flags::V.bits | Flags::N.bits | Flags::Z.bits | Flags::C.bits,
    );
    const LOGIC: Flags =
        Flags::from_bits_truncate(Flags::S.bits | Flags::V.bits | Flags::N.bits | Flags::Z.bits);
    const SHIFT: Flags = Flags::from_bits_truncate(Flags::LOGIC.bits | Flags::C.bits);
    const PRODUCT: Flags = Flags::from_bits_truncate(Flags::Z.bits | Flags::C.bits);
}

#[rustfmt::skip]
impl Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.contains(Flags::I) { 'I' } else { 'i' })?;
        write!(f, "{}", if self.contains(Flags::T) { 'T' } else { 't' })?;
        write!(f, "{}", if self.contains(Flags::H) { 'H' } else { 'h' })?;
        write!(f, "{}", if self.contains(Flags::S) { 'S' } else { 's' })?;
        write!(f, "{}", if self.contains(Flags::V) { 'V' } else { 'v' })?;
        write!(f, "{}", if self.contains(Flags::N) { 'N' } else { 'n' })?;
        write!(f, "{}", if self.contains(Flags::Z) { 'Z' } else { 'z' })?;
        write!(f, "{}", if self.contains(Flags::C) { 'C' } else { 'c' })?;
        Ok(())
    }
}

/// The value an operation produces and the status bits it writes. Bits outside `mask` are
/// left as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpResult<T> {
    pub val: T,
    pub flags: Flags,
    pub mask: Flags,
}

impl<T> OpResult<T> {
    pub fn apply(&self, sreg: Flags) -> Flags {
        (sreg & !self.mask) | (self.flags & self.mask)
    }
}

fn bit(v: Byte, n: u8) -> bool {
    v & (1 << n) != 0
}

fn flags(c: bool, z: bool, n: bool, v: bool, h: bool) -> Flags {
    let mut f = Flags::empty();
    f.set(Flags::C, c);
    f.set(Flags::Z, z);
    f.set(Flags::N, n);
    f.set(Flags::V, v);
    f.set(Flags::S, n ^ v);
    f.set(Flags::H, h);
    f
}

/// `ADD`/`ADC`, and `LSL`/`ROL` as `Rd + Rd`.
pub fn add(d: Byte, r: Byte, carry: bool) -> OpResult<Byte> {
    let res = d.wrapping_add(r).wrapping_add(carry as Byte);
    let (d3, r3, res3) = (bit(d, 3), bit(r, 3), bit(res, 3));
    let (d7, r7, res7) = (bit(d, 7), bit(r, 7), bit(res, 7));

    OpResult {
        val: res,
        flags: flags(
            d7 && r7 || r7 && !res7 || !res7 && d7,
            res == 0,
            res7,
            d7 && r7 && !res7 || !d7 && !r7 && res7,
            d3 && r3 || r3 && !res3 || !res3 && d3,
        ),
        mask: Flags::ARITH,
    }
}

/// `SUB`/`SBC`/`CP`/`CPC` and their immediate forms. With `z_chain` set, Z may only stay set
/// (the multi-byte compare rule of the carrying forms), otherwise it reflects this byte alone.
pub fn sub(d: Byte, r: Byte, carry: bool, z_chain: Option<bool>) -> OpResult<Byte> {
    let res = d.wrapping_sub(r).wrapping_sub(carry as Byte);
    let (d3, r3, res3) = (bit(d, 3), bit(r, 3), bit(res, 3));
    let (d7, r7, res7) = (bit(d, 7), bit(r, 7), bit(res, 7));

    OpResult {
        val: res,
        flags: flags(
            !d7 && r7 || r7 && res7 || res7 && !d7,
            res == 0 && z_chain.unwrap_or(true),
            res7,
            d7 && !r7 && !res7 || !d7 && r7 && res7,
            !d3 && r3 || r3 && res3 || res3 && !d3,
        ),
        mask: Flags::ARITH,
    }
}

/// Two's complement negation, which is exactly `0 - Rd`.
pub fn neg(d: Byte) -> OpResult<Byte> {
    sub(0, d, false, None)
}

/// `AND`/`OR`/`EOR` and friends: V cleared, N/Z from the result.
pub fn logic(res: Byte) -> OpResult<Byte> {
    OpResult {
        val: res,
        flags: flags(false, res == 0, bit(res, 7), false, false),
        mask: Flags::LOGIC,
    }
}

pub fn com(d: Byte) -> OpResult<Byte> {
    let res = !d;
    OpResult {
        val: res,
        flags: flags(true, res == 0, bit(res, 7), false, false),
        mask: Flags::SHIFT,
    }
}

pub fn inc(d: Byte) -> OpResult<Byte> {
    let res = d.wrapping_add(1);
    OpResult {
        val: res,
        flags: flags(false, res == 0, bit(res, 7), d == 0x7F, false),
        mask: Flags::LOGIC,
    }
}

pub fn dec(d: Byte) -> OpResult<Byte> {
    let res = d.wrapping_sub(1);
    OpResult {
        val: res,
        flags: flags(false, res == 0, bit(res, 7), d == 0x80, false),
        mask: Flags::LOGIC,
    }
}

fn shift_right(d: Byte, top: Byte) -> OpResult<Byte> {
    let res = (d >> 1) | top;
    let (c, n) = (bit(d, 0), bit(res, 7));
    OpResult {
        val: res,
        flags: flags(c, res == 0, n, n ^ c, false),
        mask: Flags::SHIFT,
    }
}

pub fn lsr(d: Byte) -> OpResult<Byte> {
    shift_right(d, 0)
}

pub fn asr(d: Byte) -> OpResult<Byte> {
    shift_right(d, d & 0x80)
}

pub fn ror(d: Byte, carry: bool) -> OpResult<Byte> {
    shift_right(d, (carry as Byte) << 7)
}

/// `ADIW`: `Rd+1:Rd + K`.
pub fn add_word(w: Word, k: Word) -> OpResult<Word> {
    let res = w.wrapping_add(k);
    let (dh7, r15) = (bit(hi8(w), 7), bit(hi8(res), 7));
    OpResult {
        val: res,
        flags: flags(!r15 && dh7, res == 0, r15, !dh7 && r15, false),
        mask: Flags::SHIFT,
    }
}

/// `SBIW`: `Rd+1:Rd - K`.
pub fn sub_word(w: Word, k: Word) -> OpResult<Word> {
    let res = w.wrapping_sub(k);
    let (dh7, r15) = (bit(hi8(w), 7), bit(hi8(res), 7));
    OpResult {
        val: res,
        flags: flags(r15 && !dh7, res == 0, r15, dh7 && !r15, false),
        mask: Flags::SHIFT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
    /// Signed multiplicand, unsigned multiplier.
    Mixed,
}

fn product(d: Byte, r: Byte, signedness: Signedness) -> Word {
    match signedness {
        Signedness::Unsigned => d as Word * r as Word,
        Signedness::Signed => (d as i8 as i16).wrapping_mul(r as i8 as i16) as Word,
        Signedness::Mixed => (d as i8 as i16).wrapping_mul(r as i16) as Word,
    }
}

/// `MUL`/`MULS`/`MULSU`: C is bit 15 of the product.
pub fn mul(d: Byte, r: Byte, signedness: Signedness) -> OpResult<Word> {
    let res = product(d, r, signedness);
    OpResult {
        val: res,
        flags: flags(res & 0x8000 != 0, res == 0, false, false, false),
        mask: Flags::PRODUCT,
    }
}

/// `FMUL`/`FMULS`/`FMULSU`: the product shifted left once, C is bit 15 before the shift.
pub fn fmul(d: Byte, r: Byte, signedness: Signedness) -> OpResult<Word> {
    let raw = product(d, r, signedness);
    let res = raw << 1;
    OpResult {
        val: res,
        flags: flags(raw & 0x8000 != 0, res == 0, false, false, false),
        mask: Flags::PRODUCT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(res: &OpResult<impl Copy>) -> Flags {
        res.flags & res.mask
    }

    #[test]
    fn display() {
        assert_eq!(Flags::empty().to_string(), "ithsvnzc");
        assert_eq!((Flags::I | Flags::Z | Flags::C).to_string(), "IthsvnZC");
    }

    #[test]
    fn add_boundaries() {
        let r = add(0, 0, false);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z);

        let r = add(255, 1, false);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z | Flags::C | Flags::H);

        let r = add(127, 1, false);
        assert_eq!(r.val, 128);
        assert_eq!(set(&r), Flags::N | Flags::V | Flags::H);

        let r = add(0x80, 0x80, false);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z | Flags::C | Flags::V | Flags::S);

        let r = add(5, 10, false);
        assert_eq!(r.val, 15);
        assert_eq!(set(&r), Flags::empty());

        assert_eq!(add(0xFF, 0, true).val, 0);
    }

    #[test]
    fn sub_boundaries() {
        let r = sub(0, 1, false, None);
        assert_eq!(r.val, 0xFF);
        assert_eq!(set(&r), Flags::C | Flags::H | Flags::N | Flags::S);

        let r = sub(0x80, 1, false, None);
        assert_eq!(r.val, 0x7F);
        assert_eq!(set(&r), Flags::V | Flags::S | Flags::H);

        let r = sub(5, 5, false, None);
        assert_eq!(set(&r), Flags::Z);
    }

    #[test]
    fn carrying_compare_keeps_zero_sticky() {
        assert!(!sub(0, 0, false, Some(false)).flags.contains(Flags::Z));
        assert!(sub(0, 0, false, Some(true)).flags.contains(Flags::Z));
        assert!(!sub(1, 0, false, Some(true)).flags.contains(Flags::Z));
    }

    #[test]
    fn negation() {
        let r = neg(0x80);
        assert_eq!(r.val, 0x80);
        assert!(r.flags.contains(Flags::V | Flags::C | Flags::N));

        let r = neg(0);
        assert_eq!(set(&r), Flags::Z);

        let r = neg(1);
        assert_eq!(r.val, 0xFF);
        assert!(r.flags.contains(Flags::C));
        assert!(!r.flags.contains(Flags::V));
    }

    #[test]
    fn increments() {
        let r = inc(0x7F);
        assert_eq!(set(&r), Flags::N | Flags::V);
        assert_eq!(r.mask & Flags::C, Flags::empty());

        let r = inc(0xFF);
        assert_eq!(set(&r), Flags::Z);

        let r = dec(0x80);
        assert_eq!(r.val, 0x7F);
        assert_eq!(set(&r), Flags::V | Flags::S);
    }

    #[test]
    fn shifts() {
        let r = lsr(0x01);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z | Flags::C | Flags::V | Flags::S);

        let r = asr(0x81);
        assert_eq!(r.val, 0xC0);
        assert_eq!(set(&r), Flags::C | Flags::N | Flags::S);

        let r = ror(0x02, true);
        assert_eq!(r.val, 0x81);
        assert_eq!(set(&r), Flags::N | Flags::V);
    }

    #[test]
    fn logic_and_complement() {
        assert_eq!(set(&logic(0)), Flags::Z);
        assert_eq!(set(&logic(0x80)), Flags::N | Flags::S);

        let r = com(0xFF);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z | Flags::C);
    }

    #[test]
    fn word_arithmetic() {
        let r = add_word(0xFFFF, 1);
        assert_eq!(r.val, 0);
        assert_eq!(set(&r), Flags::Z | Flags::C);

        let r = add_word(0x7FFF, 1);
        assert_eq!(set(&r), Flags::N | Flags::V);

        let r = sub_word(0, 1);
        assert_eq!(r.val, 0xFFFF);
        assert_eq!(set(&r), Flags::C | Flags::N | Flags::S);

        let r = sub_word(0x8000, 1);
        assert_eq!(set(&r), Flags::V | Flags::S);
    }

    #[test]
    fn multiplication() {
        let r = mul(200, 200, Signedness::Unsigned);
        assert_eq!(r.val, 40000);
        assert_eq!(set(&r), Flags::C);

        let r = mul(0xFF, 0x02, Signedness::Signed);
        assert_eq!(r.val, 0xFFFE);

        let r = mul(0xFF, 0x02, Signedness::Mixed);
        assert_eq!(r.val, 0xFFFE);

        let r = mul(0x02, 0xFF, Signedness::Mixed);
        assert_eq!(r.val, 0x01FE);

        assert_eq!(set(&mul(0, 9, Signedness::Unsigned)), Flags::Z);

        let r = fmul(0x80, 0x80, Signedness::Unsigned);
        assert_eq!(r.val, 0x8000);
        assert_eq!(set(&r), Flags::empty());

        let r = fmul(0xFF, 0xFF, Signedness::Unsigned);
        assert_eq!(r.val, 0xFC02);
        assert!(r.flags.contains(Flags::C));
    }

    #[test]
    fn apply_respects_mask() {
        let before = Flags::T | Flags::I | Flags::C;
        assert_eq!(inc(0).apply(before), Flags::T | Flags::I | Flags::C);
        assert_eq!(lsr(0).apply(before), Flags::T | Flags::I | Flags::Z);
    }
}

use super::types::RuntimeError;
use crate::spec::types::hw::{word_from_bytes, hi8, lo8, Byte, Word, RAM_SIZE};
use std::fmt::{self, Display};

/// One byte of data memory, remembering which of its bits changed since the last clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    value: Byte,
    changed: Byte,
}

impl Cell {
    pub fn value(&self) -> Byte {
        self.value
    }

    /// Bit mask of the bits which changed.
    pub fn changed_bits(&self) -> Byte {
        self.changed
    }

    pub fn is_changed(&self) -> bool {
        self.changed != 0
    }

    fn set(&mut self, value: Byte) {
        self.changed |= self.value ^ value;
        self.value = value;
    }
}

/// The whole data address space: register file, I/O window and RAM.
pub struct Mem {
    cells: Vec<Cell>,
}

impl Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, regs) in self.cells[..32].chunks(8).enumerate() {
            for (i, cell) in regs.iter().enumerate() {
                write!(f, "R{:<2} {:#04X}  ", row * 8 + i, cell.value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Mem {
    pub fn new(image: &[Byte]) -> Self {
        let mut cells = vec![Cell::default(); RAM_SIZE];
        for (cell, byte) in cells.iter_mut().zip(image.iter()) {
            cell.value = *byte;
        }
        Mem { cells }
    }

    pub fn get(&self, addr: usize) -> Result<Byte, RuntimeError> {
        self.cells
            .get(addr)
            .map(Cell::value)
            .ok_or(RuntimeError::AddressOutOfRange(addr))
    }

    pub fn set(&mut self, addr: usize, val: Byte) -> Result<(), RuntimeError> {
        self.cells
            .get_mut(addr)
            .ok_or(RuntimeError::AddressOutOfRange(addr))?
            .set(val);
        Ok(())
    }

    /// Register file access. Register indices come from decoded instructions, so are in range.
    pub fn reg(&self, r: usize) -> Byte {
        self.cells[r].value
    }

    pub fn set_reg(&mut self, r: usize, val: Byte) {
        self.cells[r].set(val);
    }

    /// The little-endian pair `r+1:r`.
    pub fn reg_pair(&self, r: usize) -> Word {
        word_from_bytes(self.reg(r), self.reg(r + 1))
    }

    pub fn set_reg_pair(&mut self, r: usize, val: Word) {
        self.set_reg(r, lo8(val));
        self.set_reg(r + 1, hi8(val));
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn clear_changes(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.changed = 0;
        }
    }

    /// Reads a NUL-terminated string starting at `addr`, not including the terminator.
    pub fn c_str(&self, addr: usize) -> Result<Vec<Byte>, RuntimeError> {
        let mut out = Vec::new();
        let mut at = addr;
        loop {
            match self.get(at) {
                Ok(0) => return Ok(out),
                Ok(b) => out.push(b),
                Err(_) => return Err(RuntimeError::UnterminatedString(addr)),
            }
            at += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_changed_bits() {
        let mut mem = Mem::new(&[0x0F]);
        mem.set_reg(0, 0x1E);
        assert_eq!(mem.cells()[0].changed_bits(), 0x11);
        assert!(!mem.cells()[1].is_changed());

        mem.set_reg(0, 0x1E);
        assert_eq!(mem.cells()[0].changed_bits(), 0x11);

        mem.clear_changes();
        assert!(!mem.cells()[0].is_changed());
        assert_eq!(mem.reg(0), 0x1E);
    }

    #[test]
    fn bounds() {
        let mut mem = Mem::new(&[]);
        assert_eq!(mem.get(RAM_SIZE - 1), Ok(0));
        assert_eq!(mem.get(RAM_SIZE), Err(RuntimeError::AddressOutOfRange(RAM_SIZE)));
        assert_eq!(
            mem.set(RAM_SIZE, 1),
            Err(RuntimeError::AddressOutOfRange(RAM_SIZE))
        );
    }

    #[test]
    fn register_pairs() {
        let mut mem = Mem::new(&[]);
        mem.set_reg_pair(26, 0x1234);
        assert_eq!(mem.reg(26), 0x34);
        assert_eq!(mem.reg(27), 0x12);
        assert_eq!(mem.reg_pair(26), 0x1234);
    }

    #[test]
    fn strings() {
        let mut image = vec![0; RAM_SIZE];
        image[0x100..0x103].copy_from_slice(b"hi\0");
        let mem = Mem::new(&image);
        assert_eq!(mem.c_str(0x100), Ok(b"hi".to_vec()));

        let mut image = vec![0; RAM_SIZE];
        image[RAM_SIZE - 1] = b'x';
        let mem = Mem::new(&image);
        assert_eq!(
            mem.c_str(RAM_SIZE - 1),
            Err(RuntimeError::UnterminatedString(RAM_SIZE - 1))
        );
    }
}

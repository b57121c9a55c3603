use super::{alu::Flags, instance::State, interface::Console, Instance};
use crate::spec::{
    defs::inst::Mnemonic,
    types::hw::{Byte, Pointer, Word, REGISTER_COUNT},
};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogLevel {
    pub internals: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    StackOverflow(usize),
    StackUnderflow(usize),
    AddressOutOfRange(usize),
    JumpOutOfRange(i64),
    UnterminatedString(usize),
    ContinuationExecuted(usize),
    MalformedOperands(Mnemonic),
    StepLimit(u64),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::StackOverflow(sp) => {
                write!(f, "Stack overflow: SP {:#06X} is below the start of RAM", sp)
            }
            RuntimeError::StackUnderflow(sp) => {
                write!(f, "Stack underflow: SP {:#06X} is at the top of RAM", sp)
            }
            RuntimeError::AddressOutOfRange(addr) => {
                write!(f, "Data address {:#06X} out of range", addr)
            }
            RuntimeError::JumpOutOfRange(target) => {
                write!(f, "Program address {} out of range", target)
            }
            RuntimeError::UnterminatedString(addr) => {
                write!(f, "String at {:#06X} runs off the end of RAM", addr)
            }
            RuntimeError::ContinuationExecuted(pc) => write!(
                f,
                "PC {:#06X} points into the middle of a two-word instruction",
                pc
            ),
            RuntimeError::MalformedOperands(m) => write!(f, "Malformed operands for {}", m),
            RuntimeError::StepLimit(steps) => {
                write!(f, "Step limit of {} reached, the program may not terminate", steps)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub steps: u64,
    /// Approximate: base cycle counts plus taken-branch and skip penalties.
    pub cycles: u64,
    pub branches_seen: u64,
    pub branches_taken: u64,
}

/// Everything a host displays between two steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub pc: usize,
    pub sp: Word,
    pub x: Word,
    pub y: Word,
    pub z: Word,
    pub regs: [Byte; REGISTER_COUNT],
    /// Per register, the bits changed by the last step.
    pub reg_changes: [Byte; REGISTER_COUNT],
    pub sreg: Flags,
    pub sreg_changes: Flags,
    pub stats: Stats,
    pub error: Option<String>,
    /// Source line of the instruction at PC, if any.
    pub line: Option<usize>,
}

impl Snapshot {
    pub fn of<C: Console>(vm: &Instance<C>) -> Self {
        let mem = vm.mem();
        let mut regs = [0; REGISTER_COUNT];
        let mut reg_changes = [0; REGISTER_COUNT];
        for (r, cell) in mem.cells()[..REGISTER_COUNT].iter().enumerate() {
            regs[r] = cell.value();
            reg_changes[r] = cell.changed_bits();
        }

        Snapshot {
            state: vm.state(),
            pc: vm.pc(),
            sp: vm.sp(),
            x: mem.reg_pair(Pointer::X.lo_reg()),
            y: mem.reg_pair(Pointer::Y.lo_reg()),
            z: mem.reg_pair(Pointer::Z.lo_reg()),
            regs,
            reg_changes,
            sreg: vm.sreg(),
            sreg_changes: vm.sreg_changes(),
            stats: vm.stats(),
            error: vm.error().map(ToString::to_string),
            line: vm.current_line(),
        }
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PC: {:#06X} SP: {:#06X} X: {:#06X} Y: {:#06X} Z: {:#06X} SREG: {}",
            self.pc, self.sp, self.x, self.y, self.z, self.sreg
        )?;
        for (row, regs) in self.regs.chunks(8).enumerate() {
            for (i, val) in regs.iter().enumerate() {
                let r = row * 8 + i;
                let mark = if self.reg_changes[r] != 0 { '*' } else { ' ' };
                write!(f, "R{:<2}{}{:#04X} ", r, mark, val)?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "steps: {} cycles: {} branches: {}/{} ({})",
            self.stats.steps,
            self.stats.cycles,
            self.stats.branches_taken,
            self.stats.branches_seen,
            self.state
        )?;
        if let Some(err) = &self.error {
            write!(f, "\nerror: {}", err)?;
        }
        Ok(())
    }
}

use derive_more::Display;
use strum_macros::EnumIter;

/// Call targets which are serviced by the simulator rather than by code in flash.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum PseudoFunc {
    #[display(fmt = "printf")]
    Printf,
}

impl PseudoFunc {
    pub fn lookup(name: &str) -> Option<PseudoFunc> {
        match name {
            "printf" => Some(PseudoFunc::Printf),
            _ => None,
        }
    }
}

/// Registers receiving the number of bytes printed, low byte first.
pub const PRINTF_COUNT_REGS: (usize, usize) = (24, 25);

/// Registers clobbered by the print trap, and the value left in each.
pub const PRINTF_CLOBBERS: [(usize, u8); 4] = [(26, 0xFF), (27, 0xFF), (30, 0xFF), (31, 0xFF)];

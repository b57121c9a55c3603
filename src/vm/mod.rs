mod instance;
mod interface;
mod types;

mod alu;
mod exec;
mod mem;

pub use alu::Flags;
pub use instance::{Instance, State};
pub use interface::{Console, Stdout};
pub use mem::{Cell, Mem};
pub use types::{LogLevel, RuntimeError, Snapshot, Stats};

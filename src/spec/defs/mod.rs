pub mod directive;
pub mod func;
pub mod inst;
pub mod io;

pub mod command;
pub mod suite;

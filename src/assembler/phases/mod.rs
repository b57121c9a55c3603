pub mod types;

pub mod expr;
pub mod generate;
pub mod layout;
pub mod resolve;
pub mod tokenize;

pub use generate::generate;
pub use layout::layout;
pub use resolve::resolve;
pub use tokenize::tokenize;

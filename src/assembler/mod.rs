pub mod disasm;
pub mod model;
pub mod phases;

pub use model::Image;
pub use phases::types::Error;

use log::debug;

/// Assembles a complete program. `breakpoint_line` is a 1-based source line; execution will
/// stop at the first instruction on or after it.
pub fn assemble(source: &str, breakpoint_line: Option<usize>) -> Result<Image, Error> {
    let lines = phases::tokenize(source)?;
    let layout = phases::layout(lines, breakpoint_line)?;
    let layout = phases::resolve(layout)?;
    let image = phases::generate(layout)?;

    debug!(
        "assembled {} words of code, {} bytes of data",
        image.code_len,
        image.data_end - crate::spec::types::hw::RAM_START
    );

    Ok(image)
}

/// Builder-style front end over `assemble`.
#[derive(Debug, Clone)]
pub struct Assembler<'a> {
    source: &'a str,
    breakpoint: Option<usize>,
}

impl<'a> Assembler<'a> {
    pub fn new(source: &'a str) -> Self {
        Assembler {
            source,
            breakpoint: None,
        }
    }

    pub fn breakpoint(self, line: usize) -> Self {
        Assembler {
            breakpoint: Some(line),
            ..self
        }
    }

    pub fn run(&self) -> Result<Image, Error> {
        assemble(self.source, self.breakpoint)
    }
}

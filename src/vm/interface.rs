use crate::spec::types::hw::Byte;
use std::io::Write;

/// Where the print trap sends its output.
pub trait Console {
    fn write(&mut self, bytes: &[Byte]);
}

/// Collects output in memory.
impl Console for String {
    fn write(&mut self, bytes: &[Byte]) {
        self.extend(bytes.iter().map(|b| *b as char));
    }
}

impl Console for Vec<Byte> {
    fn write(&mut self, bytes: &[Byte]) {
        self.extend_from_slice(bytes);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stdout;

impl Console for Stdout {
    fn write(&mut self, bytes: &[Byte]) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        // Console output is best-effort, a closed pipe must not stop the machine.
        let _ = lock.write_all(bytes).and_then(|_| lock.flush());
    }
}

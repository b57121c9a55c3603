use crate::spec::types::hw::{FLASHEND, RAMEND};

/// Register aliases available to every program.
pub const PREDEFINED_DEFS: &[(&str, u8)] = &[
    ("XL", 26),
    ("XH", 27),
    ("YL", 28),
    ("YH", 29),
    ("ZL", 30),
    ("ZH", 31),
];

/// I/O-space addresses (as used by `IN`/`OUT`) and memory-map constants
/// available to every program.
pub const PREDEFINED_EQUS: &[(&str, i64)] = &[
    ("PINB", 0x03),
    ("DDRB", 0x04),
    ("PORTB", 0x05),
    ("PINC", 0x06),
    ("DDRC", 0x07),
    ("PORTC", 0x08),
    ("PIND", 0x09),
    ("DDRD", 0x0A),
    ("PORTD", 0x0B),
    ("TIFR0", 0x15),
    ("EIMSK", 0x1D),
    ("GPIOR0", 0x1E),
    ("EECR", 0x1F),
    ("TCCR0A", 0x24),
    ("TCCR0B", 0x25),
    ("TCNT0", 0x26),
    ("OCR0A", 0x27),
    ("OCR0B", 0x28),
    ("GPIOR1", 0x2A),
    ("GPIOR2", 0x2B),
    ("SPCR", 0x2C),
    ("SPDR", 0x2E),
    ("SMCR", 0x33),
    ("MCUCR", 0x35),
    ("SPMCSR", 0x37),
    ("SPL", 0x3D),
    ("SPH", 0x3E),
    ("SREG", 0x3F),
    ("RAMEND", RAMEND as i64),
    ("FLASHEND", FLASHEND as i64),
];

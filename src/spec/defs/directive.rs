use derive_more::Display;
use strum_macros::{EnumIter, EnumString};

/// The assembler directives, written with a leading `.` in source.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, EnumString, EnumIter)]
#[strum(serialize_all = "shouty_snake_case")]
pub enum Directive {
    #[display(fmt = ".SECTION")]
    Section,
    #[display(fmt = ".END")]
    End,
    #[display(fmt = ".TEXT")]
    Text,
    #[display(fmt = ".DATA")]
    Data,
    #[display(fmt = ".GLOBAL")]
    Global,
    #[display(fmt = ".BYTE")]
    Byte,
    #[display(fmt = ".WORD")]
    Word,
    #[display(fmt = ".STRING")]
    String,
    #[display(fmt = ".ASCII")]
    Ascii,
    #[display(fmt = ".ASCIZ")]
    Asciz,
    #[display(fmt = ".SPACE")]
    Space,
    #[display(fmt = ".EQU")]
    Equ,
    #[display(fmt = ".SET")]
    Set,
    #[display(fmt = ".DEF")]
    Def,
}

impl Directive {
    /// Parses a directive token including its leading `.`, ignoring case.
    pub fn parse(raw: &str) -> Option<Directive> {
        let name = raw.strip_prefix('.')?;
        name.to_ascii_uppercase().parse().ok()
    }
}

/// The escape sequences recognized inside string literals.
pub fn unescape(c: char) -> Option<u8> {
    Some(match c {
        '\\' => b'\\',
        'n' => b'\n',
        't' => b'\t',
        '"' => b'"',
        '\'' => b'\'',
        'r' => b'\r',
        'a' => 0x07,
        'b' => 0x08,
        'f' => 0x0C,
        'v' => 0x0B,
        '0' => 0x00,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_case() {
        assert_eq!(Directive::parse(".section"), Some(Directive::Section));
        assert_eq!(Directive::parse(".AsCiZ"), Some(Directive::Asciz));
        assert_eq!(Directive::parse(".org"), None);
        assert_eq!(Directive::parse("byte"), None);
        assert_eq!(Directive::Global.to_string(), ".GLOBAL");
    }
}

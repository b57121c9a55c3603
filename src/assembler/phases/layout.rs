use super::{
    resolve::{self, Context},
    types::{self, Loc, Located},
};
use crate::assembler::model::{self, Kind, Line, Symbols, Table, Token, Value};
use crate::spec::{
    defs::{directive::{self, Directive}, inst::Mnemonic},
    types::hw::{
        byte_from_i64_wrapping, hi8, lo8, Byte, FLASH_SIZE, PCH_ADDR, PCL_ADDR, RAM_SIZE,
        REGISTER_WINDOW,
    },
};
use log::debug;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    MissingSectionHeader,
    MissingEnd,
    MissingTextSection,
    UnknownSection,
    DuplicateSection(Directive),
    DataAfterText,
    MissingGlobal,
    LateGlobal(String),
    UnresolvedGlobal(String),
    UnknownMnemonic(String),
    Redefinition(String, Table),
    NameConflict(String, Table, Table),
    ExpectedInstruction(String),
    ExpectedDirective(String),
    MisplacedDirective(Directive),
    MalformedArguments(String),
    MissingArguments(Directive),
    TooManyArguments(Directive),
    ExpectedInteger(String),
    ExpectedString(String),
    ExpectedName(String),
    ExpectedRegister(String),
    BadEscape(String),
    NonAsciiChar(char),
    NegativeCount(i64),
    FlashOverflow,
    RamOverflow,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingSectionHeader => write!(
                f,
                "Program must begin with '.section .data' or '.section .text'"
            ),
            Error::MissingEnd => write!(f, "Program must finish with '.end'"),
            Error::MissingTextSection => write!(f, "Missing '.section .text'"),
            Error::UnknownSection => {
                write!(f, "Expected '.section .data' or '.section .text'")
            }
            Error::DuplicateSection(section) => write!(f, "Duplicate '.section {}'", section),
            Error::DataAfterText => write!(f, "The data section must precede the text section"),
            Error::MissingGlobal => {
                write!(f, "The text section must begin with '.global <name>'")
            }
            Error::LateGlobal(name) => write!(
                f,
                "'.global {}' must appear before the first instruction",
                name
            ),
            Error::UnresolvedGlobal(name) => {
                write!(f, "Global '{}' does not name a label", name)
            }
            Error::UnknownMnemonic(name) => write!(f, "Unknown instruction '{}'", name),
            Error::Redefinition(name, table) => {
                write!(f, "Redefinition of {} '{}'", table, name)
            }
            Error::NameConflict(name, existing, attempted) => write!(
                f,
                "Cannot define '{}' as a {}, it is already a {}",
                name, attempted, existing
            ),
            Error::ExpectedInstruction(raw) => {
                write!(f, "Illegal token '{}', expected an instruction", raw)
            }
            Error::ExpectedDirective(raw) => {
                write!(f, "Illegal token '{}', expected a directive", raw)
            }
            Error::MisplacedDirective(dir) => write!(f, "Directive '{}' not allowed here", dir),
            Error::MalformedArguments(raw) => {
                write!(f, "Arguments must be separated by commas, found '{}'", raw)
            }
            Error::MissingArguments(dir) => write!(f, "Directive '{}' requires arguments", dir),
            Error::TooManyArguments(dir) => write!(f, "Too many arguments to '{}'", dir),
            Error::ExpectedInteger(raw) => write!(f, "Expected an integer, found '{}'", raw),
            Error::ExpectedString(raw) => write!(f, "Expected a string, found '{}'", raw),
            Error::ExpectedName(raw) => write!(f, "Expected a name, found '{}'", raw),
            Error::ExpectedRegister(raw) => write!(f, "Expected a register, found '{}'", raw),
            Error::BadEscape(esc) => write!(f, "Unknown escape sequence '\\{}'", esc),
            Error::NonAsciiChar(c) => write!(f, "Character '{}' is not ASCII", c),
            Error::NegativeCount(n) => write!(f, "Negative repeat count {}", n),
            Error::FlashOverflow => write!(f, "Program exceeds flash capacity"),
            Error::RamOverflow => write!(f, "Data exceeds RAM capacity"),
        }
    }
}

fn fail<T>(loc: Loc, err: Error) -> Result<T, types::Error> {
    Err(Located::with_loc(loc, err).into())
}

/// An instruction statement awaiting resolution and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLine {
    pub mnemonic: Mnemonic,
    pub loc: Loc,
    pub args: Vec<Token>,
    pub line: usize,
}

/// Program and data memory as laid out, before instruction operands are resolved.
#[derive(Debug)]
pub struct Layout {
    /// `None` marks the second word of a double-word instruction.
    pub pmem: Vec<Option<ProgramLine>>,
    pub dmem: Vec<Byte>,
    pub symbols: Symbols,
    pub breakpoint: Option<usize>,
}

struct Sections {
    data: Option<usize>,
    text: usize,
}

fn check_sections(lines: &[Line]) -> Result<Sections, types::Error> {
    let (first, last) = match (lines.first(), lines.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(Located::from(Error::MissingSectionHeader).into()),
    };

    if !first.is_section(Directive::Data) && !first.is_section(Directive::Text) {
        return fail(first.first_loc(), Error::MissingSectionHeader);
    }

    if !last.is_lone_dir(Directive::End) {
        return fail(last.first_loc(), Error::MissingEnd);
    }

    let mut data = None;
    let mut text = None;
    for (idx, line) in lines.iter().enumerate() {
        if !line.tokens[0].is_dir(Directive::Section) {
            continue;
        }

        let (slot, section) = if line.is_section(Directive::Data) {
            (&mut data, Directive::Data)
        } else if line.is_section(Directive::Text) {
            (&mut text, Directive::Text)
        } else {
            return fail(line.first_loc(), Error::UnknownSection);
        };

        if slot.is_some() {
            return fail(line.first_loc(), Error::DuplicateSection(section));
        }
        *slot = Some(idx);
    }

    let text = match text {
        Some(text) => text,
        None => return Err(Located::from(Error::MissingTextSection).into()),
    };

    if let Some(data) = data {
        if data > text {
            return fail(lines[data].first_loc(), Error::DataAfterText);
        }
    }

    Ok(Sections { data, text })
}

fn check_mnemonics(lines: &[Line]) -> Result<(), types::Error> {
    for tok in lines.iter().flat_map(|line| line.tokens.iter()) {
        if tok.kind == Kind::Inst && Mnemonic::from_str(tok.text()).is_err() {
            return fail(tok.loc, Error::UnknownMnemonic(tok.raw.clone()));
        }
    }
    Ok(())
}

/// Splits off and binds a leading label, returning the remaining tokens.
fn bind_label<'a>(
    tokens: &'a [Token],
    symbols: &mut Symbols,
    addr: usize,
) -> Result<&'a [Token], types::Error> {
    match tokens.split_first() {
        Some((label, rest)) if label.kind == Kind::Label => {
            symbols
                .define_label(label.text(), addr)
                .map_err(|err| Located::with_loc(label.loc, err))?;
            Ok(rest)
        }
        _ => Ok(tokens),
    }
}

fn global_name(tokens: &[Token]) -> Option<&Token> {
    match tokens {
        [dir, name] if dir.is_dir(Directive::Global) && name.kind == Kind::Ref => Some(name),
        _ => None,
    }
}

struct ProgramBuilder {
    pmem: Vec<Option<ProgramLine>>,
    globals: Vec<Token>,
    breakpoint: Option<usize>,
    breakpoint_line: Option<usize>,
}

impl ProgramBuilder {
    fn statement(&mut self, line: &Line, symbols: &mut Symbols) -> Result<(), types::Error> {
        let tokens = bind_label(&line.tokens, symbols, self.pmem.len())?;

        let (head, args) = match tokens.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        if head.is_dir(Directive::Global) {
            let name = global_name(tokens)
                .ok_or_else(|| Located::with_loc(head.loc, Error::MissingGlobal))?;
            if !self.pmem.is_empty() {
                return fail(head.loc, Error::LateGlobal(name.text().to_owned()));
            }
            self.globals.push(name.clone());
            return Ok(());
        }

        if head.kind != Kind::Inst {
            return fail(head.loc, Error::ExpectedInstruction(head.raw.clone()));
        }

        let mnemonic = Mnemonic::from_str(head.text())
            .map_err(|_| Located::with_loc(head.loc, Error::UnknownMnemonic(head.raw.clone())))?;

        if self.breakpoint.is_none()
            && self
                .breakpoint_line
                .map_or(false, |bp_line| line.number >= bp_line)
        {
            self.breakpoint = Some(self.pmem.len());
        }

        self.pmem.push(Some(ProgramLine {
            mnemonic,
            loc: head.loc,
            args: args.to_vec(),
            line: line.number,
        }));
        if mnemonic.def().is_double_word() {
            self.pmem.push(None);
        }

        if self.pmem.len() > FLASH_SIZE {
            return fail(head.loc, Error::FlashOverflow);
        }

        Ok(())
    }
}

fn layout_program(
    lines: &[Line],
    text: usize,
    symbols: &mut Symbols,
    breakpoint_line: Option<usize>,
) -> Result<ProgramBuilder, types::Error> {
    let header = &lines[text];
    let global = lines
        .get(text + 1)
        .and_then(|line| global_name(&line.tokens))
        .ok_or_else(|| {
            let loc = lines.get(text + 1).unwrap_or(header).first_loc();
            Located::with_loc(loc, Error::MissingGlobal)
        })?;

    let mut builder = ProgramBuilder {
        pmem: Vec::new(),
        globals: vec![global.clone()],
        breakpoint: None,
        breakpoint_line,
    };

    // The final line is the `.end`, already checked.
    for line in &lines[text + 2..lines.len() - 1] {
        builder.statement(line, symbols)?;
    }

    for global in &builder.globals {
        if symbols.label(global.text()).is_none() {
            return fail(global.loc, Error::UnresolvedGlobal(global.text().to_owned()));
        }
    }

    Ok(builder)
}

fn string_bytes(tok: &Token) -> Result<Vec<Byte>, Error> {
    let mut bytes = Vec::new();
    let mut chars = tok.text().chars();

    while let Some(c) = chars.next() {
        let c = if c == '\\' {
            let esc = chars
                .next()
                .ok_or_else(|| Error::BadEscape(String::new()))?;
            directive::unescape(esc).ok_or_else(|| Error::BadEscape(esc.to_string()))?
        } else if c.is_ascii() {
            c as Byte
        } else {
            return Err(Error::NonAsciiChar(c));
        };
        bytes.push(c);
    }

    Ok(bytes)
}

struct DataBuilder {
    dmem: Vec<Byte>,
}

impl DataBuilder {
    fn reserve(&self, loc: Loc, count: usize) -> Result<(), types::Error> {
        if self.dmem.len() + count > RAM_SIZE {
            return fail(loc, Error::RamOverflow);
        }
        Ok(())
    }

    fn push(&mut self, loc: Loc, bytes: &[Byte]) -> Result<(), types::Error> {
        self.reserve(loc, bytes.len())?;
        self.dmem.extend_from_slice(bytes);
        Ok(())
    }

    fn values(
        &self,
        head: &Token,
        args: &[Token],
        symbols: &Symbols,
    ) -> Result<Vec<Token>, types::Error> {
        let resolved = resolve::resolve_args(args.to_vec(), symbols, Context::Data)?;
        let values = model::split_args(resolved)
            .map_err(|tok| Located::with_loc(tok.loc, Error::MalformedArguments(tok.raw)))?;
        if values.is_empty() {
            if let Value::Dir(dir) = head.value {
                return fail(head.loc, Error::MissingArguments(dir));
            }
        }
        Ok(values)
    }

    fn ints(
        &self,
        head: &Token,
        args: &[Token],
        symbols: &Symbols,
    ) -> Result<Vec<(Loc, i64)>, types::Error> {
        self.values(head, args, symbols)?
            .into_iter()
            .map(|tok| match tok.as_int() {
                Some(val) => Ok((tok.loc, val)),
                None => fail(tok.loc, Error::ExpectedInteger(tok.raw)),
            })
            .collect()
    }

    fn constant(
        &self,
        dir: Directive,
        head: &Token,
        args: &[Token],
        symbols: &mut Symbols,
    ) -> Result<(), types::Error> {
        let (name, value) = match args {
            [name, comma, value @ ..] if comma.is(Kind::Comma) && !value.is_empty() => {
                (name, value)
            }
            [tok, ..] => return fail(tok.loc, Error::MalformedArguments(tok.raw.clone())),
            [] => return fail(head.loc, Error::MissingArguments(dir)),
        };

        if name.kind != Kind::Ref {
            return fail(name.loc, Error::ExpectedName(name.raw.clone()));
        }

        let value = resolve::resolve_args(value.to_vec(), symbols, Context::Data)?;
        let val = match value.as_slice() {
            [tok] => tok
                .as_int()
                .ok_or_else(|| Located::with_loc(tok.loc, Error::ExpectedInteger(tok.raw.clone())))?,
            [_, extra, ..] => return fail(extra.loc, Error::MalformedArguments(extra.raw.clone())),
            [] => return fail(head.loc, Error::MissingArguments(dir)),
        };

        symbols
            .define_equ(name.text(), val)
            .map_err(|err| Located::with_loc(name.loc, err))?;
        Ok(())
    }

    fn alias(&self, head: &Token, args: &[Token], symbols: &mut Symbols) -> Result<(), types::Error> {
        let (name, reg) = match args {
            [name, sep, reg] if sep.raw == "=" || sep.is(Kind::Comma) => (name, reg),
            [tok, ..] => return fail(tok.loc, Error::MalformedArguments(tok.raw.clone())),
            [] => return fail(head.loc, Error::MissingArguments(Directive::Def)),
        };

        if name.kind != Kind::Ref {
            return fail(name.loc, Error::ExpectedName(name.raw.clone()));
        }

        let reg = match (&reg.kind, &reg.value) {
            (Kind::Reg, Value::Int(idx)) => *idx as u8,
            (Kind::Ref, _) => match symbols.def(reg.text()) {
                Some(idx) => idx,
                None => return fail(reg.loc, Error::ExpectedRegister(reg.raw.clone())),
            },
            _ => return fail(reg.loc, Error::ExpectedRegister(reg.raw.clone())),
        };

        symbols
            .define_def(name.text(), reg)
            .map_err(|err| Located::with_loc(name.loc, err))?;
        Ok(())
    }

    fn statement(&mut self, line: &Line, symbols: &mut Symbols) -> Result<(), types::Error> {
        let tokens = bind_label(&line.tokens, symbols, self.dmem.len())?;

        let (head, args) = match tokens.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        let dir = match head.value {
            Value::Dir(dir) => dir,
            _ => return fail(head.loc, Error::ExpectedDirective(head.raw.clone())),
        };

        match dir {
            Directive::Byte => {
                for (loc, val) in self.ints(head, args, symbols)? {
                    self.push(loc, &[byte_from_i64_wrapping(val)])?;
                }
            }
            Directive::Word => {
                for (loc, val) in self.ints(head, args, symbols)? {
                    self.push(loc, &[byte_from_i64_wrapping(val), byte_from_i64_wrapping(val >> 8)])?;
                }
            }
            Directive::String | Directive::Ascii | Directive::Asciz => {
                for tok in self.values(head, args, symbols)? {
                    if tok.kind != Kind::Str {
                        return fail(tok.loc, Error::ExpectedString(tok.raw));
                    }
                    let mut bytes =
                        string_bytes(&tok).map_err(|err| Located::with_loc(tok.loc, err))?;
                    if dir != Directive::Ascii {
                        bytes.push(0);
                    }
                    self.push(tok.loc, &bytes)?;
                }
            }
            Directive::Space => {
                let ints = self.ints(head, args, symbols)?;
                let (count, fill) = match ints.as_slice() {
                    [(loc, count)] => ((*loc, *count), 0),
                    [(loc, count), (_, fill)] => ((*loc, *count), byte_from_i64_wrapping(*fill)),
                    [_, _, (loc, _), ..] => return fail(*loc, Error::TooManyArguments(dir)),
                    [] => return fail(head.loc, Error::MissingArguments(dir)),
                };
                if count.1 < 0 {
                    return fail(count.0, Error::NegativeCount(count.1));
                }
                let n = count.1 as usize;
                self.reserve(count.0, n)?;
                self.dmem.resize(self.dmem.len() + n, fill);
            }
            Directive::Equ | Directive::Set => self.constant(dir, head, args, symbols)?,
            Directive::Def => self.alias(head, args, symbols)?,
            _ => return fail(head.loc, Error::MisplacedDirective(dir)),
        }

        Ok(())
    }
}

fn layout_data(lines: &[Line], symbols: &mut Symbols) -> Result<Vec<Byte>, types::Error> {
    let mut builder = DataBuilder {
        dmem: vec![0; REGISTER_WINDOW],
    };

    for line in lines {
        builder.statement(line, symbols)?;
    }

    Ok(builder.dmem)
}

/// Checks the overall structure of the program and lays out both memories.
pub fn layout(lines: Vec<Line>, breakpoint_line: Option<usize>) -> Result<Layout, types::Error> {
    let sections = check_sections(&lines)?;
    check_mnemonics(&lines)?;

    let mut symbols = Symbols::with_predefined();

    let program = layout_program(&lines, sections.text, &mut symbols, breakpoint_line)?;

    let mut dmem = match sections.data {
        Some(data) => layout_data(&lines[data + 1..sections.text], &mut symbols)?,
        None => vec![0; REGISTER_WINDOW],
    };

    // The interpreter starts at the first global, read back from the reserved PC cells.
    let entry = program
        .globals
        .first()
        .and_then(|global| symbols.label(global.text()))
        .unwrap_or(0);
    dmem[PCL_ADDR] = lo8(entry as u16);
    dmem[PCH_ADDR] = hi8(entry as u16);

    debug!(
        "laid out {} program words and {} data bytes",
        program.pmem.len(),
        dmem.len() - REGISTER_WINDOW
    );

    Ok(Layout {
        pmem: program.pmem,
        dmem,
        symbols,
        breakpoint: program.breakpoint,
    })
}

use super::phases::{layout, types::Loc};
use crate::spec::{
    defs::{directive::Directive, func::PseudoFunc, inst::Mnemonic, io},
    types::{
        hw::{Byte, Pointer},
        schema::ArgKind,
    },
};
use derive_more::Display;
use std::collections::HashMap;
use std::fmt;

// This enum models the lexical classes the pattern table can distinguish. Several are
// refined by context later: an `Inst` in argument position is really a `Ref`, and a `Ref`
// may turn out to name a label, a constant, a register alias or a pseudo-function.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Label,
    Lo8,
    Hi8,
    Reg,
    Int,
    Inst,
    Str,
    Dir,
    WordPlusQ,
    WordPlus,
    MinusWord,
    Word,
    Comma,
    Math,
    Symbol,
    Ref,
    Func,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
    Dir(Directive),
    /// A pointer register, with the displacement for the `Y+q`/`Z+q` form (otherwise 0).
    Ptr(Pointer, i64),
    Func(PseudoFunc),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Kind,
    pub value: Value,
    /// The source text the token was matched from.
    pub raw: String,
    pub loc: Loc,
}

impl Token {
    pub fn new(kind: Kind, value: Value, raw: &str, loc: Loc) -> Self {
        Token {
            kind,
            value,
            raw: raw.to_owned(),
            loc,
        }
    }

    pub fn int(val: i64, loc: Loc) -> Self {
        Token::new(Kind::Int, Value::Int(val), &val.to_string(), loc)
    }

    pub fn text(&self) -> &str {
        match &self.value {
            Value::Text(s) => s,
            _ => &self.raw,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match (&self.kind, &self.value) {
            (Kind::Int, Value::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// The numeric value a catalog constraint is checked against.
    pub fn constrained_value(&self) -> Option<i64> {
        match &self.value {
            Value::Int(v) => Some(*v),
            Value::Ptr(_, disp) => Some(*disp),
            _ => None,
        }
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind == kind
    }

    pub fn is_math(&self, op: &str) -> bool {
        self.kind == Kind::Math && self.raw == op
    }

    pub fn is_dir(&self, dir: Directive) -> bool {
        self.value == Value::Dir(dir)
    }

    /// Whether an integer literal was written with an explicit sign.
    pub fn is_signed_literal(&self) -> bool {
        self.kind == Kind::Int && self.raw.starts_with('-')
    }

    pub fn arg_kind(&self) -> Option<ArgKind> {
        Some(match self.kind {
            Kind::Reg => ArgKind::Reg,
            Kind::Int => ArgKind::Int,
            Kind::Word => ArgKind::Word,
            Kind::WordPlus => ArgKind::WordPlus,
            Kind::MinusWord => ArgKind::MinusWord,
            Kind::WordPlusQ => ArgKind::WordPlusQ,
            Kind::Func => ArgKind::Func,
            _ => return None,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.raw)
    }
}

/// The tokens of one non-empty source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub tokens: Vec<Token>,
}

impl Line {
    pub fn first_loc(&self) -> Loc {
        self.tokens
            .first()
            .map(|tok| tok.loc)
            .unwrap_or_else(|| Loc::new(self.number, 1))
    }

    pub fn is_lone_dir(&self, dir: Directive) -> bool {
        self.tokens.len() == 1 && self.tokens[0].is_dir(dir)
    }

    pub fn is_section(&self, section: Directive) -> bool {
        self.tokens.len() == 2
            && self.tokens[0].is_dir(Directive::Section)
            && self.tokens[1].is_dir(section)
    }
}

/// Strips the commas from an argument list, which must alternate between single values and
/// commas. On failure returns the first out-of-place token.
pub fn split_args(tokens: Vec<Token>) -> Result<Vec<Token>, Token> {
    let mut values = Vec::with_capacity(tokens.len() / 2 + 1);
    let mut trailing = None;

    for tok in tokens {
        let expect_value = trailing.is_some() || values.is_empty();
        if tok.is(Kind::Comma) == expect_value {
            return Err(tok);
        }
        if expect_value {
            trailing = None;
            values.push(tok);
        } else {
            trailing = Some(tok);
        }
    }

    match trailing {
        Some(comma) => Err(comma),
        None => Ok(values),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrMode {
    Plain,
    PostInc,
    PreDec,
    Disp(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(u8),
    Imm(i64),
    Ptr(Pointer, PtrMode),
    Func(PseudoFunc),
}

impl Operand {
    pub fn reg(self) -> Option<usize> {
        match self {
            Operand::Reg(r) => Some(r as usize),
            _ => None,
        }
    }

    pub fn imm(self) -> Option<i64> {
        match self {
            Operand::Imm(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "R{}", r),
            Operand::Imm(v) => write!(f, "{}", v),
            Operand::Ptr(p, PtrMode::Plain) => write!(f, "{}", p),
            Operand::Ptr(p, PtrMode::PostInc) => write!(f, "{}+", p),
            Operand::Ptr(p, PtrMode::PreDec) => write!(f, "-{}", p),
            Operand::Ptr(p, PtrMode::Disp(q)) => write!(f, "{}+{}", p, q),
            Operand::Func(func) => write!(f, "{}", func),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    /// The encoded instruction word(s) as a string of binary digits.
    pub opcode: String,
    /// The 1-based source line, or 0 for filler.
    pub line: usize,
}

impl Instruction {
    pub fn nop() -> Self {
        Instruction {
            mnemonic: Mnemonic::NOP,
            operands: Vec::new(),
            opcode: "0".repeat(16),
            line: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.mnemonic.def().width
    }

    /// The opcode as 16-bit words, most significant word first.
    pub fn words(&self) -> Vec<u16> {
        self.opcode
            .as_bytes()
            .chunks(16)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0u16, |acc, b| (acc << 1) | u16::from(*b == b'1'))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Inst(Instruction),
    /// The second word of a double-word instruction.
    Continuation,
}

impl Slot {
    pub fn inst(&self) -> Option<&Instruction> {
        match self {
            Slot::Inst(inst) => Some(inst),
            Slot::Continuation => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Table {
    #[display(fmt = "label")]
    Label,
    #[display(fmt = "constant")]
    Equ,
    #[display(fmt = "register alias")]
    Def,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols {
    labels: HashMap<String, usize>,
    equs: HashMap<String, i64>,
    defs: HashMap<String, u8>,
}

impl Symbols {
    pub fn with_predefined() -> Self {
        let mut symbols = Symbols::default();
        for (name, reg) in io::PREDEFINED_DEFS {
            symbols.defs.insert((*name).to_owned(), *reg);
        }
        for (name, val) in io::PREDEFINED_EQUS {
            symbols.equs.insert((*name).to_owned(), *val);
        }
        symbols
    }

    pub fn table_of(&self, name: &str) -> Option<Table> {
        if self.labels.contains_key(name) {
            Some(Table::Label)
        } else if self.equs.contains_key(name) {
            Some(Table::Equ)
        } else if self.defs.contains_key(name) {
            Some(Table::Def)
        } else {
            None
        }
    }

    fn check_free(&self, name: &str, table: Table) -> Result<(), layout::Error> {
        match self.table_of(name) {
            None => Ok(()),
            Some(Table::Equ) if table == Table::Equ => Ok(()),
            Some(existing) if existing == table => {
                Err(layout::Error::Redefinition(name.to_owned(), table))
            }
            Some(existing) => Err(layout::Error::NameConflict(name.to_owned(), existing, table)),
        }
    }

    pub fn define_label(&mut self, name: &str, idx: usize) -> Result<(), layout::Error> {
        self.check_free(name, Table::Label)?;
        self.labels.insert(name.to_owned(), idx);
        Ok(())
    }

    pub fn define_equ(&mut self, name: &str, val: i64) -> Result<(), layout::Error> {
        self.check_free(name, Table::Equ)?;
        self.equs.insert(name.to_owned(), val);
        Ok(())
    }

    pub fn define_def(&mut self, name: &str, reg: u8) -> Result<(), layout::Error> {
        self.check_free(name, Table::Def)?;
        self.defs.insert(name.to_owned(), reg);
        Ok(())
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn equ(&self, name: &str) -> Option<i64> {
        self.equs.get(name).copied()
    }

    pub fn def(&self, name: &str) -> Option<u8> {
        self.defs.get(name).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, idx)| (name.as_str(), *idx))
    }
}

/// The output of the assembler: memory images ready to hand to an interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Exactly `FLASH_SIZE` slots, `NOP`-filled past the assembled code.
    pub pmem: Vec<Slot>,
    /// Exactly `RAM_SIZE` bytes, zero-filled past the assembled data.
    pub dmem: Vec<Byte>,
    pub breakpoint: Option<usize>,
    pub symbols: Symbols,
    /// Number of program words occupied by assembled code.
    pub code_len: usize,
    /// One past the last data memory address written by data directives.
    pub data_end: usize,
}

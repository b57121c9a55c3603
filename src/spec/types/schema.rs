use derive_more::Display;

/// The operand shapes an instruction slot can be filled with once all symbols are resolved.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Reg,
    Int,
    Word,
    WordPlus,
    MinusWord,
    WordPlusQ,
    Func,
}

/// At most one numeric/textual constraint applies to a slot beyond its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    None,
    Range(i64, i64),
    OneOf(&'static [i64]),
    Exact(&'static str),
}

impl Constraint {
    pub fn admits_value(&self, val: i64) -> bool {
        match self {
            Constraint::None | Constraint::Exact(_) => true,
            Constraint::Range(lo, hi) => *lo <= val && val <= *hi,
            Constraint::OneOf(opts) => opts.contains(&val),
        }
    }

    pub fn admits_text(&self, text: &str) -> bool {
        match self {
            Constraint::Exact(exact) => text.eq_ignore_ascii_case(exact),
            _ => true,
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::None => write!(f, "any value"),
            Constraint::Range(lo, hi) => write!(f, "a value in [{}, {}]", lo, hi),
            Constraint::OneOf(opts) => write!(
                f,
                "one of {{{}}}",
                itertools::join(opts.iter(), ", ")
            ),
            Constraint::Exact(exact) => write!(f, "exactly '{}'", exact),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub kinds: &'static [ArgKind],
    pub constraint: Constraint,
}

impl ArgSpec {
    pub const fn new(kinds: &'static [ArgKind], constraint: Constraint) -> Self {
        ArgSpec { kinds, constraint }
    }

    pub fn admits_kind(&self, kind: ArgKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl std::fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", itertools::join(self.kinds.iter(), "|"), self.constraint)
    }
}

/// How the operands of a control-flow instruction are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Sequential,
    Relative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// A bit pattern of `0`/`1` and placeholder letters. `fields[i]` names the
    /// placeholder filled by operand `i`, or `'_'` when the operand has no field.
    Template {
        fields: &'static [char],
        bits: &'static str,
    },
    Irregular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstDef {
    pub args: &'static [ArgSpec],
    pub encoding: Encoding,
    pub flow: Flow,
    /// Number of program words occupied.
    pub width: usize,
    /// Base cycle count; branches and skips add to this when taken.
    pub cycles: u64,
}

impl InstDef {
    pub const fn template(
        args: &'static [ArgSpec],
        fields: &'static [char],
        bits: &'static str,
    ) -> Self {
        InstDef {
            args,
            encoding: Encoding::Template { fields, bits },
            flow: Flow::Sequential,
            width: bits.len() / 16,
            cycles: 1,
        }
    }

    pub const fn irregular(args: &'static [ArgSpec]) -> Self {
        InstDef {
            args,
            encoding: Encoding::Irregular,
            flow: Flow::Sequential,
            width: 1,
            cycles: 1,
        }
    }

    pub const fn relative(self) -> Self {
        InstDef {
            flow: Flow::Relative,
            ..self
        }
    }

    pub const fn absolute(self) -> Self {
        InstDef {
            flow: Flow::Absolute,
            ..self
        }
    }

    pub const fn cycles(self, cycles: u64) -> Self {
        InstDef { cycles, ..self }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn is_double_word(&self) -> bool {
        self.width == 2
    }
}

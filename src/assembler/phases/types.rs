use super::{expr, generate, layout, resolve, tokenize};
use derive_more::Constructor;
use std::fmt::Display;

/*
    Phases:

        1.  Tokenization: Each source line is matched against an ordered table of token patterns,
            producing one token stream per (non-empty) line. A fix-up pass then reclassifies the
            ambiguous tokens: mnemonic-shaped names in argument position become references, split
            identifiers are glued back together, registers/integers/directives get typed values.

        2.  Layout: The section structure is checked, every mnemonic is checked against the
            catalog, and the predefined symbols are installed. The text section is then laid out
            into program memory (one slot per program word, a placeholder for the second word of
            a double-word instruction) binding code labels, and the data section is executed
            directive by directive into data memory, binding data labels and constants.

        3.  Resolution: Each program memory slot has its symbolic references replaced (labels
            become absolute or PC-relative integers depending on the instruction, constants become
            integers, register aliases become registers), its `hi8()`/`lo8()` forms collapsed, and
            its arithmetic evaluated.

        4.  Generation: Each resolved slot is checked against the catalog (comma placement, arity,
            operand kinds and constraints) and turned into an `Instruction` with its opcode.

    Only the expression evaluator is shared between phases: it runs over data directive
    arguments in (2) and over instruction operands in (3).
*/

#[derive(Debug, PartialEq, Clone, Copy, Eq, Constructor)]
pub struct Loc {
    line: usize,
    col: usize,
}

impl Loc {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Located<T: Sized> {
    loc: Option<Loc>,
    val: T,
}

impl Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(line: {}, col: {})", self.line, self.col)
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.loc {
            None => write!(f, "@<unknown location>: {}", self.val),
            Some(loc) => write!(f, "@{}: {}", loc, self.val),
        }
    }
}

impl<T> Located<T> {
    fn new(loc: Option<Loc>, val: T) -> Self {
        Located { loc, val }
    }

    pub fn with_loc(loc: Loc, val: T) -> Self {
        Located::new(Some(loc), val)
    }

    pub fn loc(&self) -> Option<Loc> {
        self.loc
    }

    pub fn value(self) -> T {
        self.val
    }

    pub fn proximate_to_option_loc(self, loc: Option<Loc>) -> Self {
        match self.loc {
            None => Self { loc, ..self },
            Some(_) => self,
        }
    }

    pub fn proximate_to_loc(self, loc: Loc) -> Self {
        self.proximate_to_option_loc(Some(loc))
    }
}

impl<T> From<T> for Located<T> {
    fn from(val: T) -> Self {
        Located { loc: None, val }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Tokenize(Located<tokenize::Error>),
    Expression(Located<expr::Error>),
    Layout(Located<layout::Error>),
    Resolve(Located<resolve::Error>),
    Generate(Located<generate::Error>),
}

impl Error {
    /// The source location the error points at, if any.
    pub fn loc(&self) -> Option<Loc> {
        match self {
            Error::Tokenize(err) => err.loc(),
            Error::Expression(err) => err.loc(),
            Error::Layout(err) => err.loc(),
            Error::Resolve(err) => err.loc(),
            Error::Generate(err) => err.loc(),
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, Error::Tokenize(_))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, Error::Expression(_))
    }
}

impl From<Located<tokenize::Error>> for Error {
    fn from(err: Located<tokenize::Error>) -> Self {
        Error::Tokenize(err)
    }
}

impl From<Located<expr::Error>> for Error {
    fn from(err: Located<expr::Error>) -> Self {
        Error::Expression(err)
    }
}

impl From<Located<layout::Error>> for Error {
    fn from(err: Located<layout::Error>) -> Self {
        Error::Layout(err)
    }
}

impl From<Located<resolve::Error>> for Error {
    fn from(err: Located<resolve::Error>) -> Self {
        Error::Resolve(err)
    }
}

impl From<Located<generate::Error>> for Error {
    fn from(err: Located<generate::Error>) -> Self {
        Error::Generate(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Tokenize(_) => write!(f, "Lexical Error (in Tokenizer): "),
            Error::Expression(_) => write!(f, "Expression Error (in Evaluator): "),
            Error::Layout(_) => write!(f, "Assembly Error (in Layout): "),
            Error::Resolve(_) => write!(f, "Assembly Error (in Resolver): "),
            Error::Generate(_) => write!(f, "Assembly Error (in Generator): "),
        }?;
        match self {
            Error::Tokenize(msg) => write!(f, "{}", msg),
            Error::Expression(msg) => write!(f, "{}", msg),
            Error::Layout(msg) => write!(f, "{}", msg),
            Error::Resolve(msg) => write!(f, "{}", msg),
            Error::Generate(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

use super::{
    expr,
    layout::{Layout, ProgramLine},
    types::{self, Located},
};
use crate::assembler::model::{Kind, Symbols, Token, Value};
use crate::spec::{
    defs::func::PseudoFunc,
    types::{
        hw::{hi8, lo8},
        schema::Flow,
    },
};
use log::trace;
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    UndefinedSymbol(String),
    MalformedByteSelect(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UndefinedSymbol(name) => write!(f, "Undefined symbol '{}'", name),
            Error::MalformedByteSelect(name) => {
                write!(f, "Expected '{}(<expression>)'", name)
            }
        }
    }
}

/// How a label reference is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// The label's value itself: a program or data memory address.
    Data,
    /// An absolute program memory index.
    Absolute,
    /// An offset from the instruction following the one at this index.
    Relative(usize),
}

impl Context {
    fn of(flow: Flow, idx: usize) -> Self {
        match flow {
            Flow::Sequential => Context::Data,
            Flow::Absolute => Context::Absolute,
            Flow::Relative => Context::Relative(idx),
        }
    }
}

fn resolve_ref(tok: Token, symbols: &Symbols, ctx: Context) -> Result<Token, Located<Error>> {
    let name = tok.text().to_owned();

    let (kind, value) = if let Some(target) = symbols.label(&name) {
        let val = match ctx {
            Context::Data | Context::Absolute => target as i64,
            Context::Relative(idx) => target as i64 - idx as i64 - 1,
        };
        (Kind::Int, Value::Int(val))
    } else if let Some(val) = symbols.equ(&name) {
        (Kind::Int, Value::Int(val))
    } else if let Some(reg) = symbols.def(&name) {
        (Kind::Reg, Value::Int(reg as i64))
    } else if let Some(func) = PseudoFunc::lookup(&name) {
        (Kind::Func, Value::Func(func))
    } else {
        return Err(Located::with_loc(tok.loc, Error::UndefinedSymbol(name)));
    };

    // The source text stays as written, so a resolved name never reads as a signed literal.
    Ok(Token { kind, value, ..tok })
}

/// Replaces every bare reference with the integer, register or pseudo-function it names.
pub fn resolve_refs(
    tokens: Vec<Token>,
    symbols: &Symbols,
    ctx: Context,
) -> Result<Vec<Token>, Located<Error>> {
    tokens
        .into_iter()
        .map(|tok| {
            if tok.kind == Kind::Ref {
                resolve_ref(tok, symbols, ctx)
            } else {
                Ok(tok)
            }
        })
        .collect()
}

/// Collapses each `hi8(...)`/`lo8(...)` into the selected byte of its argument.
pub fn resolve_byte_selects(tokens: Vec<Token>) -> Result<Vec<Token>, types::Error> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut idx = 0;

    while idx < tokens.len() {
        let tok = &tokens[idx];
        if tok.kind != Kind::Hi8 && tok.kind != Kind::Lo8 {
            out.push(tok.clone());
            idx += 1;
            continue;
        }

        let malformed = || Located::with_loc(tok.loc, Error::MalformedByteSelect(tok.raw.clone()));

        match tokens.get(idx + 1) {
            Some(open) if open.is_math("(") => {}
            _ => return Err(malformed().into()),
        }

        let mut depth = 0;
        let mut close = None;
        for (offset, inner) in tokens[idx + 1..].iter().enumerate() {
            if inner.is_math("(") {
                depth += 1;
            } else if inner.is_math(")") {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx + 1 + offset);
                    break;
                }
            }
        }
        let close = close.ok_or_else(malformed)?;

        let inner = &tokens[idx + 2..close];
        if inner.is_empty() {
            return Err(malformed().into());
        }

        let val = expr::evaluate_single(inner)
            .map_err(|err| Located::with_loc(inner[0].loc, err))?;
        let byte = if tok.kind == Kind::Hi8 {
            hi8(val as u16)
        } else {
            lo8(val as u16)
        };

        out.push(Token {
            kind: Kind::Int,
            value: Value::Int(byte as i64),
            ..tok.clone()
        });
        idx = close + 1;
    }

    Ok(out)
}

/// Runs every symbolic and arithmetic resolution step over an argument list.
pub fn resolve_args(
    tokens: Vec<Token>,
    symbols: &Symbols,
    ctx: Context,
) -> Result<Vec<Token>, types::Error> {
    let tokens = resolve_refs(tokens, symbols, ctx)?;
    let tokens = resolve_byte_selects(tokens)?;
    Ok(expr::evaluate(tokens)?)
}

fn resolve_line(
    idx: usize,
    line: ProgramLine,
    symbols: &Symbols,
) -> Result<ProgramLine, types::Error> {
    let ctx = Context::of(line.mnemonic.def().flow, idx);
    let args = resolve_args(line.args, symbols, ctx)?;

    trace!(
        "{:#06X}: {} {}",
        idx,
        line.mnemonic,
        itertools::join(args.iter(), " ")
    );

    Ok(ProgramLine { args, ..line })
}

/// Resolves the arguments of every instruction laid out in program memory.
pub fn resolve(mut layout: Layout) -> Result<Layout, types::Error> {
    let pmem = std::mem::take(&mut layout.pmem);
    let symbols = &layout.symbols;

    let pmem = pmem
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.map(|line| resolve_line(idx, line, symbols)).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Layout { pmem, ..layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::phases::{tokenize::tokenize, types::Loc};

    fn args(src: &str) -> Vec<Token> {
        let mut tokens = tokenize(src).unwrap().remove(0).tokens;
        tokens.remove(0);
        tokens
    }

    fn symbols() -> Symbols {
        let mut symbols = Symbols::with_predefined();
        symbols.define_label("main", 0).unwrap();
        symbols.define_label("loop", 4).unwrap();
        symbols.define_label("msg", 0x100).unwrap();
        symbols.define_equ("N", 10).unwrap();
        symbols
    }

    #[test]
    fn labels_depend_on_context() {
        let symbols = symbols();

        let rel = resolve_args(args("RJMP loop"), &symbols, Context::Relative(7)).unwrap();
        assert_eq!(rel[0].as_int(), Some(-4));

        let abs = resolve_args(args("JMP loop"), &symbols, Context::Absolute).unwrap();
        assert_eq!(abs[0].as_int(), Some(4));
    }

    #[test]
    fn aliases_and_constants() {
        let symbols = symbols();
        let toks = resolve_args(args("LDI ZL, N*2+1"), &symbols, Context::Data).unwrap();
        assert_eq!(toks[0].kind, Kind::Reg);
        assert_eq!(toks[0].value, Value::Int(30));
        assert_eq!(toks[2].as_int(), Some(21));
    }

    #[test]
    fn byte_selects() {
        let symbols = symbols();
        let toks = resolve_args(args("LDI R31, hi8(msg + 2)"), &symbols, Context::Data).unwrap();
        assert_eq!(toks[2].as_int(), Some(0x01));
        let toks = resolve_args(args("LDI R30, lo8(msg + 2)"), &symbols, Context::Data).unwrap();
        assert_eq!(toks[2].as_int(), Some(0x02));
    }

    #[test]
    fn pseudo_function() {
        let symbols = symbols();
        let toks = resolve_args(args("CALL printf"), &symbols, Context::Absolute).unwrap();
        assert_eq!(toks[0].kind, Kind::Func);
        assert_eq!(toks[0].value, Value::Func(PseudoFunc::Printf));
    }

    #[test]
    fn undefined_symbol() {
        let symbols = symbols();
        assert_eq!(
            resolve_args(args("RJMP nowhere"), &symbols, Context::Relative(0)),
            Err(types::Error::Resolve(Located::with_loc(
                Loc::new(1, 6),
                Error::UndefinedSymbol("nowhere".to_owned())
            )))
        );
    }

    #[test]
    fn malformed_byte_select() {
        let symbols = symbols();
        assert_eq!(
            resolve_args(args("LDI R30, lo8 msg"), &symbols, Context::Data),
            Err(types::Error::Resolve(Located::with_loc(
                Loc::new(1, 10),
                Error::MalformedByteSelect("lo8".to_owned())
            )))
        );
    }
}

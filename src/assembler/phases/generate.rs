use super::{
    layout::{Layout, ProgramLine},
    types::{self, Located},
};
use crate::assembler::model::{self, Image, Instruction, Kind, Operand, PtrMode, Slot, Token, Value};
use crate::spec::{
    defs::inst::Mnemonic,
    types::{
        hw::{Pointer, FLASH_SIZE, RAM_SIZE},
        schema::{ArgSpec, Constraint, Encoding},
    },
};
use log::{debug, trace};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    MisplacedComma,
    MissingComma(String),
    ArgCount(Mnemonic, usize, usize),
    ArgKind(Mnemonic, usize, ArgSpec, String),
    ArgValue(Mnemonic, usize, Constraint, String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MisplacedComma => write!(f, "Misplaced comma"),
            Error::MissingComma(raw) => write!(f, "Expected a comma before '{}'", raw),
            Error::ArgCount(m, expected, found) => write!(
                f,
                "{} takes {} argument(s), found {}",
                m, expected, found
            ),
            Error::ArgKind(m, idx, spec, raw) => write!(
                f,
                "Argument {} of {} must be {}, found '{}'",
                idx + 1,
                m,
                spec,
                raw
            ),
            Error::ArgValue(m, idx, constraint, raw) => write!(
                f,
                "Argument {} of {} must be {}, found '{}'",
                idx + 1,
                m,
                constraint,
                raw
            ),
        }
    }
}

fn check_arg(mnemonic: Mnemonic, idx: usize, spec: &ArgSpec, tok: &Token) -> Result<Operand, Error> {
    let kind_err = || Error::ArgKind(mnemonic, idx, *spec, tok.raw.clone());
    let value_err = || Error::ArgValue(mnemonic, idx, spec.constraint, tok.raw.clone());

    let kind = tok.arg_kind().ok_or_else(kind_err)?;
    if !spec.admits_kind(kind) {
        return Err(kind_err());
    }

    let operand = match (&tok.kind, &tok.value) {
        (Kind::Func, Value::Func(func)) => return Ok(Operand::Func(*func)),
        (Kind::Reg, Value::Int(r)) => Operand::Reg(*r as u8),
        (Kind::Int, Value::Int(v)) => Operand::Imm(*v),
        (Kind::Word, Value::Ptr(p, _)) => Operand::Ptr(*p, PtrMode::Plain),
        (Kind::WordPlus, Value::Ptr(p, _)) => Operand::Ptr(*p, PtrMode::PostInc),
        (Kind::MinusWord, Value::Ptr(p, _)) => Operand::Ptr(*p, PtrMode::PreDec),
        (Kind::WordPlusQ, Value::Ptr(p, q)) => {
            if !spec.constraint.admits_value(*q) {
                return Err(value_err());
            }
            Operand::Ptr(*p, PtrMode::Disp(*q as u8))
        }
        _ => return Err(kind_err()),
    };

    let admitted = spec.constraint.admits_text(&tok.raw)
        && tok
            .constrained_value()
            .map_or(true, |val| spec.constraint.admits_value(val));
    if !admitted {
        return Err(value_err());
    }

    Ok(operand)
}

fn check_args(mnemonic: Mnemonic, args: Vec<Token>) -> Result<Vec<Operand>, Located<Error>> {
    let args = model::split_args(args).map_err(|tok| {
        let err = if tok.is(Kind::Comma) {
            Error::MisplacedComma
        } else {
            Error::MissingComma(tok.raw.clone())
        };
        Located::with_loc(tok.loc, err)
    })?;

    let def = mnemonic.def();
    if args.len() != def.arity() {
        let err = Error::ArgCount(mnemonic, def.arity(), args.len());
        return Err(match args.get(def.arity()) {
            Some(extra) => Located::with_loc(extra.loc, err),
            None => Located::from(err),
        });
    }

    def.args
        .iter()
        .zip(args.iter())
        .enumerate()
        .map(|(idx, (spec, tok))| {
            check_arg(mnemonic, idx, spec, tok).map_err(|err| Located::with_loc(tok.loc, err))
        })
        .collect()
}

/// Substitutes field values into a bit template. Each field takes the low bits of its value,
/// so negative values come out in two's complement.
fn fill(bits: &str, values: &[(char, i64)]) -> String {
    let mut out: Vec<char> = bits.chars().collect();

    for (field, val) in values {
        let width = bits.chars().filter(|c| c == field).count();
        let mut shift = width;
        for slot in out.iter_mut().filter(|c| **c == *field) {
            shift -= 1;
            *slot = if (*val as u64 >> shift) & 1 == 1 { '1' } else { '0' };
        }
    }

    out.into_iter().collect()
}

fn field_value(op: Operand) -> Option<i64> {
    match op {
        Operand::Reg(r) => Some(r as i64),
        Operand::Imm(v) => Some(v),
        Operand::Ptr(_, PtrMode::Disp(q)) => Some(q as i64),
        Operand::Ptr(..) => None,
        // Resolved at execution time, so the field is a sentinel.
        Operand::Func(_) => Some(-1),
    }
}

fn pointer_bits(store: bool, ptr: Pointer, mode: PtrMode) -> &'static str {
    match (store, ptr, mode) {
        (false, Pointer::X, PtrMode::Plain) => "1001000ddddd1100",
        (false, Pointer::X, PtrMode::PostInc) => "1001000ddddd1101",
        (false, Pointer::X, PtrMode::PreDec) => "1001000ddddd1110",
        (false, Pointer::Y, PtrMode::Plain) => "1000000ddddd1000",
        (false, Pointer::Y, PtrMode::PostInc) => "1001000ddddd1001",
        (false, Pointer::Y, PtrMode::PreDec) => "1001000ddddd1010",
        (false, Pointer::Z, PtrMode::Plain) => "1000000ddddd0000",
        (false, Pointer::Z, PtrMode::PostInc) => "1001000ddddd0001",
        (false, Pointer::Z, PtrMode::PreDec) => "1001000ddddd0010",
        (true, Pointer::X, PtrMode::Plain) => "1001001ddddd1100",
        (true, Pointer::X, PtrMode::PostInc) => "1001001ddddd1101",
        (true, Pointer::X, PtrMode::PreDec) => "1001001ddddd1110",
        (true, Pointer::Y, PtrMode::Plain) => "1000001ddddd1000",
        (true, Pointer::Y, PtrMode::PostInc) => "1001001ddddd1001",
        (true, Pointer::Y, PtrMode::PreDec) => "1001001ddddd1010",
        (true, Pointer::Z, PtrMode::Plain) => "1000001ddddd0000",
        (true, Pointer::Z, PtrMode::PostInc) => "1001001ddddd0001",
        (true, Pointer::Z, PtrMode::PreDec) => "1001001ddddd0010",
        (false, Pointer::Y, PtrMode::Disp(_)) => "10q0qq0ddddd1qqq",
        (false, _, PtrMode::Disp(_)) => "10q0qq0ddddd0qqq",
        (true, Pointer::Y, PtrMode::Disp(_)) => "10q0qq1ddddd1qqq",
        (true, _, PtrMode::Disp(_)) => "10q0qq1ddddd0qqq",
    }
}

fn encode_pointer(store: bool, ptr: Operand, reg: Operand) -> Option<String> {
    let (p, mode) = match ptr {
        Operand::Ptr(p, mode) => (p, mode),
        _ => return None,
    };
    let d = reg.reg()? as i64;
    let q = match mode {
        PtrMode::Disp(q) => q as i64,
        _ => 0,
    };
    Some(fill(pointer_bits(store, p, mode), &[('d', d), ('q', q)]))
}

fn encode_irregular(mnemonic: Mnemonic, ops: &[Operand]) -> Option<String> {
    let reg = |idx: usize| ops.get(idx).and_then(|op| op.reg()).map(|r| r as i64);
    let imm = |idx: usize| ops.get(idx).and_then(|op| op.imm());

    Some(match mnemonic {
        Mnemonic::ADIW => fill("10010110KKddKKKK", &[('d', (reg(0)? - 24) / 2), ('K', imm(1)?)]),
        Mnemonic::SBIW => fill("10010111KKddKKKK", &[('d', (reg(0)? - 24) / 2), ('K', imm(1)?)]),
        Mnemonic::CBR => fill("0111KKKKddddKKKK", &[('d', reg(0)?), ('K', !imm(1)? & 0xFF)]),
        Mnemonic::CLR => fill("001001rdddddrrrr", &[('d', reg(0)?), ('r', reg(0)?)]),
        Mnemonic::LSL => fill("000011rdddddrrrr", &[('d', reg(0)?), ('r', reg(0)?)]),
        Mnemonic::ROL => fill("000111rdddddrrrr", &[('d', reg(0)?), ('r', reg(0)?)]),
        Mnemonic::TST => fill("001000rdddddrrrr", &[('d', reg(0)?), ('r', reg(0)?)]),
        Mnemonic::MOVW => fill("00000001ddddrrrr", &[('d', reg(0)? / 2), ('r', reg(1)? / 2)]),
        Mnemonic::LD | Mnemonic::LDD => encode_pointer(false, *ops.get(1)?, *ops.get(0)?)?,
        Mnemonic::ST | Mnemonic::STD => encode_pointer(true, *ops.get(0)?, *ops.get(1)?)?,
        _ => return None,
    })
}

fn encode(mnemonic: Mnemonic, ops: &[Operand]) -> Option<String> {
    match mnemonic.def().encoding {
        Encoding::Template { fields, bits } => {
            let values: Vec<_> = fields
                .iter()
                .zip(ops.iter())
                .filter(|(field, _)| **field != '_')
                .map(|(field, op)| field_value(*op).map(|val| (*field, val)))
                .collect::<Option<_>>()?;
            Some(fill(bits, &values))
        }
        Encoding::Irregular => encode_irregular(mnemonic, ops),
    }
}

fn generate_line(line: ProgramLine) -> Result<Instruction, types::Error> {
    let ProgramLine {
        mnemonic,
        loc,
        args,
        line,
    } = line;

    let operands = check_args(mnemonic, args).map_err(|err| err.proximate_to_loc(loc))?;

    // Operands have passed their catalog checks, so every shape is encodable.
    let opcode = encode(mnemonic, &operands).ok_or_else(|| {
        Located::with_loc(
            loc,
            Error::ArgCount(mnemonic, mnemonic.def().arity(), operands.len()),
        )
    })?;

    trace!("{} {} => {}", mnemonic, itertools::join(operands.iter(), ", "), opcode);

    Ok(Instruction {
        mnemonic,
        operands,
        opcode,
        line,
    })
}

/// Checks and encodes every laid out instruction, producing full-size memory images.
pub fn generate(layout: Layout) -> Result<Image, types::Error> {
    let mut pmem = Vec::with_capacity(FLASH_SIZE);
    for slot in layout.pmem {
        pmem.push(match slot {
            Some(line) => Slot::Inst(generate_line(line)?),
            None => Slot::Continuation,
        });
    }

    let code_len = pmem.len();
    pmem.resize(FLASH_SIZE, Slot::Inst(Instruction::nop()));

    let data_end = layout.dmem.len();
    let mut dmem = layout.dmem;
    dmem.resize(RAM_SIZE, 0);

    debug!("generated {} program words", code_len);

    Ok(Image {
        pmem,
        dmem,
        breakpoint: layout.breakpoint,
        symbols: layout.symbols,
        code_len,
        data_end,
    })
}

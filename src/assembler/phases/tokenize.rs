use super::types::{Loc, Located};
use crate::assembler::model::{Kind, Line, Token, Value};
use crate::spec::{
    defs::directive::Directive,
    types::hw::{Pointer, REGISTER_COUNT},
};
use itertools::Itertools;
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Unmatched(String),
    UnknownDirective(String),
    RegisterOutOfRange(String),
    MalformedInteger(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unmatched(raw) => write!(f, "Unrecognized input '{}'", raw),
            Error::UnknownDirective(raw) => write!(f, "Unknown directive '{}'", raw),
            Error::RegisterOutOfRange(raw) => {
                write!(f, "Register '{}' out of range, expected R0 to R31", raw)
            }
            Error::MalformedInteger(raw) => write!(f, "Malformed integer literal '{}'", raw),
        }
    }
}

// Order encodes precedence: the first pattern matching at the current position wins.
// `None` marks matches which are consumed without producing a token.
#[rustfmt::skip]
const PATTERN_SOURCES: [(&str, Option<Kind>); 20] = [
    (r"^;.*",                                                          None),
    (r"^\s+",                                                          None),
    (r"^[A-Za-z_][\w.]*:",                                             Some(Kind::Label)),
    (r"^(?:lo8|LO8)\b",                                                Some(Kind::Lo8)),
    (r"^(?:hi8|HI8)\b",                                                Some(Kind::Hi8)),
    (r"^[rR]\d+\b",                                                    Some(Kind::Reg)),
    (r"^-?(?:0[xX][0-9A-Fa-f]+|\$[0-9A-Fa-f]+|0[oO][0-7]+|0[bB][01]+)\b", Some(Kind::Int)),
    (r"^-?\d+\b",                                                      Some(Kind::Int)),
    (r"^[A-Za-z]{2,6}\b",                                              Some(Kind::Inst)),
    (r#"^"(?:[^"\\]|\\.)*""#,                                          Some(Kind::Str)),
    (r"^'(?:[^'\\]|\\.)*'",                                            Some(Kind::Str)),
    (r"^\.[^.\s,]+",                                                   Some(Kind::Dir)),
    (r"^[YZ]\+\d{1,2}\b",                                              Some(Kind::WordPlusQ)),
    (r"^[XYZ]\+",                                                      Some(Kind::WordPlus)),
    (r"^-[XYZ]\b",                                                     Some(Kind::MinusWord)),
    (r"^[XYZ]\b",                                                      Some(Kind::Word)),
    (r"^,",                                                            Some(Kind::Comma)),
    (r"^(?:<<|>>|==|!=|<=|>=|&&|\|\||[-+*/&|^~<>!()])",                Some(Kind::Math)),
    (r"^[^\w\s]",                                                      Some(Kind::Symbol)),
    (r"^[^\s\d]\w*",                                                   Some(Kind::Ref)),
];

static PATTERNS: Lazy<Vec<(Regex, Option<Kind>)>> = Lazy::new(|| {
    PATTERN_SOURCES
        .iter()
        .map(|(src, kind)| (Regex::new(src).expect("malformed token pattern"), *kind))
        .collect()
});

#[derive(Debug, PartialEq, Eq)]
struct RawToken<'a> {
    kind: Kind,
    text: &'a str,
    col: usize,
}

fn scan_line(number: usize, line: &str) -> Result<Vec<RawToken<'_>>, Located<Error>> {
    let mut toks = Vec::new();
    let mut pos = 0;

    while pos < line.len() {
        let rest = &line[pos..];
        let (len, kind) = PATTERNS
            .iter()
            .find_map(|(re, kind)| re.find(rest).map(|m| (m.end(), *kind)))
            .ok_or_else(|| {
                let bad = rest.split_whitespace().next().unwrap_or(rest);
                Located::with_loc(Loc::new(number, pos + 1), Error::Unmatched(bad.to_owned()))
            })?;

        if let Some(kind) = kind {
            toks.push(RawToken {
                kind,
                text: &rest[..len],
                col: pos + 1,
            });
        }

        pos += len;
    }

    Ok(toks)
}

fn parse_int(raw: &str) -> Result<i64, Error> {
    let malformed = || Error::MalformedInteger(raw.to_owned());

    let (negative, body) = match raw.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, raw),
    };

    let (radix, digits) = if let Some(d) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = body.strip_prefix('$') {
        (16, d)
    } else if let Some(d) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        (8, d)
    } else if let Some(d) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        (2, d)
    } else {
        (10, body)
    };

    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| malformed())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_reg(raw: &str) -> Result<i64, Error> {
    let idx: i64 = raw[1..]
        .parse()
        .map_err(|_| Error::RegisterOutOfRange(raw.to_owned()))?;
    if idx >= REGISTER_COUNT as i64 {
        return Err(Error::RegisterOutOfRange(raw.to_owned()));
    }
    Ok(idx)
}

fn parse_ptr(kind: Kind, raw: &str) -> Result<Value, Error> {
    let letter = raw
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .and_then(Pointer::from_letter)
        .ok_or_else(|| Error::Unmatched(raw.to_owned()))?;

    let disp = match kind {
        Kind::WordPlusQ => parse_int(&raw[2..])?,
        _ => 0,
    };

    Ok(Value::Ptr(letter, disp))
}

impl<'a> RawToken<'a> {
    /// Identifier fragments which glue onto a directly preceding reference.
    fn continues_ref(&self, kind: Kind) -> bool {
        match kind {
            Kind::Ref | Kind::Dir => true,
            Kind::Int => !self.text.starts_with('-'),
            _ => false,
        }
    }

    fn into_token(self, kind: Kind, number: usize) -> Result<Token, Located<Error>> {
        let raw = self.text;
        let loc = Loc::new(number, self.col);

        let value = match kind {
            Kind::Reg => parse_reg(raw).map(Value::Int),
            Kind::Int => parse_int(raw).map(Value::Int),
            Kind::Label => Ok(Value::Text(raw.trim_end_matches(':').to_owned())),
            Kind::Inst => Ok(Value::Text(raw.to_ascii_uppercase())),
            Kind::Dir => Directive::parse(raw)
                .map(Value::Dir)
                .ok_or_else(|| Error::UnknownDirective(raw.to_owned())),
            Kind::Str => Ok(Value::Text(raw[1..raw.len() - 1].to_owned())),
            Kind::Word | Kind::WordPlus | Kind::MinusWord | Kind::WordPlusQ => {
                parse_ptr(kind, raw)
            }
            _ => Ok(Value::Text(raw.to_owned())),
        }
        .map_err(|err| Located::with_loc(loc, err))?;

        Ok(Token::new(kind, value, raw, loc))
    }
}

fn fixup(number: usize, raws: Vec<RawToken<'_>>) -> Result<Vec<Token>, Located<Error>> {
    let leading_label = raws.first().map_or(false, |tok| tok.kind == Kind::Label);
    let mut toks: Vec<Token> = Vec::with_capacity(raws.len());

    for (idx, raw) in raws.into_iter().enumerate() {
        let mut kind = raw.kind;

        // Only the first token of a statement can be a mnemonic.
        if kind == Kind::Inst && idx > 0 && !(idx == 1 && leading_label) {
            kind = Kind::Ref;
        }

        if let Some(prev) = toks.last_mut() {
            let adjacent = prev.loc.col() + prev.raw.len() == raw.col;
            if prev.kind == Kind::Ref && adjacent && raw.continues_ref(kind) {
                prev.raw.push_str(raw.text);
                prev.value = Value::Text(prev.raw.clone());
                continue;
            }
        }

        toks.push(raw.into_token(kind, number)?);
    }

    Ok(toks)
}

/// Splits `source` into per-line token streams. Lines producing no tokens are dropped.
pub fn tokenize(source: &str) -> Result<Vec<Line>, Located<Error>> {
    let mut lines = Vec::new();

    for (idx, text) in source.lines().enumerate() {
        let number = idx + 1;
        let tokens = fixup(number, scan_line(number, text)?)?;

        if tokens.is_empty() {
            continue;
        }

        trace!("line {}: {}", number, tokens.iter().join(" "));
        lines.push(Line { number, tokens });
    }

    Ok(lines)
}

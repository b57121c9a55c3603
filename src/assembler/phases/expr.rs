use super::types::Located;
use crate::assembler::model::{Kind, Token};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    MissingOperator,
    MissingOperand,
    UnbalancedParens,
    DivisionByZero,
    ShiftOutOfRange(i64),
    Overflow,
    UnexpectedToken(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingOperator => write!(f, "Missing operator between two integers"),
            Error::MissingOperand => write!(f, "Operator is missing an operand"),
            Error::UnbalancedParens => write!(f, "Unbalanced parentheses"),
            Error::DivisionByZero => write!(f, "Division by zero"),
            Error::ShiftOutOfRange(by) => write!(f, "Shift amount {} out of range", by),
            Error::Overflow => write!(f, "Arithmetic overflow"),
            Error::UnexpectedToken(raw) => write!(f, "Unexpected '{}' in expression", raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinOp {
    fn parse(raw: &str) -> Option<BinOp> {
        Some(match raw {
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "&" => BinOp::BitAnd,
            "^" => BinOp::BitXor,
            "|" => BinOp::BitOr,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }

    // Higher binds tighter. Unary operators sit above all of these.
    fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div => 10,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 7,
            BinOp::Eq | BinOp::Ne => 6,
            BinOp::BitAnd => 5,
            BinOp::BitXor => 4,
            BinOp::BitOr => 3,
            BinOp::And => 2,
            BinOp::Or => 1,
        }
    }

    fn apply(self, a: i64, b: i64) -> Result<i64, Error> {
        let truth = |b: bool| b as i64;

        match self {
            BinOp::Mul => a.checked_mul(b).ok_or(Error::Overflow),
            BinOp::Div => floor_div(a, b),
            BinOp::Add => a.checked_add(b).ok_or(Error::Overflow),
            BinOp::Sub => a.checked_sub(b).ok_or(Error::Overflow),
            BinOp::Shl | BinOp::Shr => {
                if !(0..64).contains(&b) {
                    return Err(Error::ShiftOutOfRange(b));
                }
                if self == BinOp::Shr {
                    return Ok(a >> b);
                }
                let shifted = a << b;
                if shifted >> b != a {
                    return Err(Error::Overflow);
                }
                Ok(shifted)
            }
            BinOp::Lt => Ok(truth(a < b)),
            BinOp::Gt => Ok(truth(a > b)),
            BinOp::Le => Ok(truth(a <= b)),
            BinOp::Ge => Ok(truth(a >= b)),
            BinOp::Eq => Ok(truth(a == b)),
            BinOp::Ne => Ok(truth(a != b)),
            BinOp::BitAnd => Ok(a & b),
            BinOp::BitXor => Ok(a ^ b),
            BinOp::BitOr => Ok(a | b),
            BinOp::And => Ok(truth(a != 0 && b != 0)),
            BinOp::Or => Ok(truth(a != 0 || b != 0)),
        }
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, Error> {
    if b == 0 {
        return Err(Error::DivisionByZero);
    }

    let q = a.checked_div(b).ok_or(Error::Overflow)?;
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    })
}

struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.toks.get(self.pos);
        self.pos += 1;
        tok
    }

    fn parse_unary(&mut self) -> Result<i64, Error> {
        let tok = self.next().ok_or(Error::MissingOperand)?;

        if let Some(val) = tok.as_int() {
            return Ok(val);
        }

        match tok.raw.as_str() {
            "(" => {
                let val = self.parse_binary(1)?;
                match self.next() {
                    Some(tok) if tok.is_math(")") => Ok(val),
                    _ => Err(Error::UnbalancedParens),
                }
            }
            "!" => Ok((self.parse_unary()? == 0) as i64),
            "~" => Ok(!self.parse_unary()?),
            "-" => self.parse_unary()?.checked_neg().ok_or(Error::Overflow),
            "+" => self.parse_unary(),
            ")" => Err(Error::UnbalancedParens),
            _ => Err(Error::MissingOperand),
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<i64, Error> {
        let mut lhs = self.parse_unary()?;

        loop {
            let tok = match self.peek() {
                None => break,
                Some(tok) => tok,
            };

            // The lexer reads `5-3` as the literals `5` and `-3`: a signed literal in
            // operator position continues the sum, an unsigned one is a missing operator.
            let (op, implicit) = if tok.kind == Kind::Int {
                if !tok.is_signed_literal() {
                    return Err(Error::MissingOperator);
                }
                (BinOp::Add, true)
            } else if tok.is_math(")") {
                break;
            } else {
                match BinOp::parse(&tok.raw) {
                    Some(op) => (op, false),
                    None => return Err(Error::UnexpectedToken(tok.raw.clone())),
                }
            };

            if op.precedence() < min_prec {
                break;
            }

            if !implicit {
                self.pos += 1;
            }

            let rhs = self.parse_binary(op.precedence() + 1)?;
            lhs = op.apply(lhs, rhs)?;
        }

        Ok(lhs)
    }
}

fn evaluate_run(run: &[Token]) -> Result<i64, Error> {
    let mut parser = Parser { toks: run, pos: 0 };
    let val = parser.parse_binary(1)?;

    match parser.peek() {
        None => Ok(val),
        Some(tok) if tok.is_math(")") => Err(Error::UnbalancedParens),
        Some(tok) => Err(Error::UnexpectedToken(tok.raw.clone())),
    }
}

fn in_alphabet(tok: &Token) -> bool {
    tok.kind == Kind::Int || tok.kind == Kind::Math
}

fn flush(run: &mut Vec<Token>, out: &mut Vec<Token>) -> Result<(), Located<Error>> {
    if run.is_empty() {
        return Ok(());
    }

    if run.len() == 1 && run[0].kind == Kind::Int {
        out.append(run);
        return Ok(());
    }

    let loc = run[0].loc;
    let val = evaluate_run(run).map_err(|err| Located::with_loc(loc, err))?;
    out.push(Token::int(val, loc));
    run.clear();

    Ok(())
}

/// Replaces every maximal run of integer and operator tokens with the single integer it
/// evaluates to, located at the start of the run.
pub fn evaluate(tokens: Vec<Token>) -> Result<Vec<Token>, Located<Error>> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut run = Vec::new();

    for tok in tokens {
        if in_alphabet(&tok) {
            run.push(tok);
        } else {
            flush(&mut run, &mut out)?;
            out.push(tok);
        }
    }
    flush(&mut run, &mut out)?;

    Ok(out)
}

/// Evaluates a run of tokens which must collapse to exactly one integer.
pub fn evaluate_single(tokens: &[Token]) -> Result<i64, Error> {
    evaluate_run(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::phases::{tokenize::tokenize, types::Loc};

    fn eval(src: &str) -> Result<i64, Located<Error>> {
        let line = tokenize(&format!(".byte {}", src)).unwrap().remove(0);
        let out = evaluate(line.tokens)?;
        assert_eq!(out.len(), 2, "{:?}", out);
        Ok(out[1].as_int().unwrap())
    }

    fn eval_err(src: &str) -> Error {
        eval(src).unwrap_err().value()
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9));
        assert_eq!(eval("1 << 2 + 1"), Ok(8));
        assert_eq!(eval("6 & 3 | 8"), Ok(10));
        assert_eq!(eval("1 | 6 ^ 3 & 5"), Ok(1 | (6 ^ (3 & 5))));
        assert_eq!(eval("2 < 3 == 1"), Ok(1));
        assert_eq!(eval("0 || 2 && 3"), Ok(1));
        assert_eq!(eval("10 - 4 - 3"), Ok(3));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("!0"), Ok(1));
        assert_eq!(eval("!5"), Ok(0));
        assert_eq!(eval("~0 & 0xFF"), Ok(0xFF));
        assert_eq!(eval("-(2 + 3)"), Ok(-5));
    }

    #[test]
    fn division_floors() {
        assert_eq!(eval("7 / 2"), Ok(3));
        assert_eq!(eval("-7 / 2"), Ok(-4));
        assert_eq!(eval("7 / -2"), Ok(-4));
        assert_eq!(eval("-8 / 2"), Ok(-4));
    }

    #[test]
    fn signed_literal_continues_sum() {
        assert_eq!(eval("5-3"), Ok(2));
        assert_eq!(eval("5 -3*2"), Ok(-1));
        assert_eq!(eval("0x10-1"), Ok(15));
    }

    #[test]
    fn adjacent_integers_are_an_error() {
        assert_eq!(
            eval("5 3"),
            Err(Located::with_loc(Loc::new(1, 7), Error::MissingOperator))
        );
    }

    #[test]
    fn malformed_expressions() {
        assert_eq!(eval_err("(1 + 2"), Error::UnbalancedParens);
        assert_eq!(eval_err("1 + 2)"), Error::UnbalancedParens);
        assert_eq!(eval_err("4 / 0"), Error::DivisionByZero);
        assert_eq!(eval_err("1 +"), Error::MissingOperand);
        assert_eq!(eval_err("1 << 64"), Error::ShiftOutOfRange(64));
    }

    #[test]
    fn left_shifts_overflow() {
        assert_eq!(eval("1 << 62"), Ok(1 << 62));
        assert_eq!(eval_err("3 << 62"), Error::Overflow);
        assert_eq!(eval_err("1 << 63"), Error::Overflow);
    }

    #[test]
    fn runs_are_split_by_other_tokens() {
        let line = tokenize(".byte 1+1, 2*3, 4").unwrap().remove(0);
        let ints: Vec<_> = evaluate(line.tokens)
            .unwrap()
            .iter()
            .filter_map(Token::as_int)
            .collect();
        assert_eq!(ints, vec![2, 6, 4]);
    }
}

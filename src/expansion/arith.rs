//! Arithmetic expansion: `$(( expr ))`.
//!
//! Signed 64-bit integers with wrapping overflow. The expression is parsed
//! into a small tree with a Pratt parser, then evaluated so that `&&`, `||`
//! and `?:` only evaluate the operand they select.

use crate::error::{ShellError, ShellResult};

use super::ExpansionContext;

// Variables holding expressions are evaluated recursively up to this depth.
const MAX_RECURSION: usize = 16;
// Parenthesised and prefix sub-expressions nest up to this depth.
const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(i64),
    Var(String),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Assign(&'static str, String, Box<Expr>),
    /// `++x` / `--x`: (name, delta)
    PreStep(String, i64),
    /// `x++` / `x--`
    PostStep(String, i64),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&",
    "|", "^", "?", ":", ",",
];

fn syntax(message: impl Into<String>, expr: &str) -> ShellError {
    ShellError::expansion(format!("{}: {}", expr.trim(), message.into()))
}

fn tokenize(src: &str) -> ShellResult<Vec<Tok>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        if ch.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '#' || chars[i] == '_') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = parse_number(&literal)
                .ok_or_else(|| syntax(format!("invalid number `{}'", literal), src))?;
            tokens.push(Tok::Num(value));
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        match ch {
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
                continue;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
                continue;
            }
            _ => {}
        }
        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(syntax(format!("syntax error: invalid character `{}'", ch), src));
        };
        tokens.push(Tok::Op(op));
        i += op.chars().count();
    }
    Ok(tokens)
}

/// Decimal, `0x` hex, leading-zero octal and `base#digits` literals.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() {
        return None;
    }
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some((base, rest)) = digits.split_once('#') {
        let base: u32 = base.parse().ok()?;
        if !(2..=36).contains(&base) {
            return None;
        }
        i64::from_str_radix(rest, base).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { value.wrapping_neg() } else { value })
}

struct ExprParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    nesting: usize,
    src: &'a str,
}

fn infix_power(op: &str) -> Option<(u8, u8)> {
    let power = match op {
        "," => (1, 2),
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "<<=" | ">>=" | "&=" | "|=" | "^=" => (3, 3),
        "?" => (5, 5),
        "||" => (7, 8),
        "&&" => (9, 10),
        "|" => (11, 12),
        "^" => (13, 14),
        "&" => (15, 16),
        "==" | "!=" => (17, 18),
        "<" | "<=" | ">" | ">=" => (19, 20),
        "<<" | ">>" => (21, 22),
        "+" | "-" => (23, 24),
        "*" | "/" | "%" => (25, 26),
        "**" => (28, 27),
        _ => return None,
    };
    Some(power)
}

const PREFIX_POWER: u8 = 29;

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect_op(&mut self, op: &str) -> ShellResult<()> {
        match self.next() {
            Some(Tok::Op(found)) if found == op => Ok(()),
            _ => Err(syntax(format!("expected `{}'", op), self.src)),
        }
    }

    fn expr(&mut self, min_power: u8) -> ShellResult<Expr> {
        if self.nesting >= MAX_NESTING {
            return Err(syntax("expression nesting level exceeded", self.src));
        }
        self.nesting += 1;
        let result = self.binary(min_power);
        self.nesting -= 1;
        result
    }

    fn binary(&mut self, min_power: u8) -> ShellResult<Expr> {
        let mut lhs = self.prefix()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(op)) => *op,
                _ => break,
            };
            let Some((left, right)) = infix_power(op) else {
                break;
            };
            if left < min_power {
                break;
            }
            self.next();
            lhs = match op {
                "?" => {
                    let then = self.expr(0)?;
                    self.expect_op(":")?;
                    let otherwise = self.expr(right)?;
                    Expr::Ternary(Box::new(lhs), Box::new(then), Box::new(otherwise))
                }
                op if op.ends_with('=') && !matches!(op, "==" | "!=" | "<=" | ">=") => {
                    let Expr::Var(name) = lhs else {
                        return Err(syntax("attempted assignment to non-variable", self.src));
                    };
                    Expr::Assign(op, name, Box::new(self.expr(right)?))
                }
                op => Expr::Binary(op, Box::new(lhs), Box::new(self.expr(right)?)),
            };
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> ShellResult<Expr> {
        match self.next() {
            Some(Tok::Num(value)) => Ok(Expr::Num(value)),
            Some(Tok::Ident(name)) => match self.peek() {
                Some(Tok::Op("++")) => {
                    self.next();
                    Ok(Expr::PostStep(name, 1))
                }
                Some(Tok::Op("--")) => {
                    self.next();
                    Ok(Expr::PostStep(name, -1))
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(Tok::LParen) => {
                let inner = self.expr(0)?;
                match self.next() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(syntax("missing `)'", self.src)),
                }
            }
            Some(Tok::Op(op @ ("++" | "--"))) => match self.next() {
                Some(Tok::Ident(name)) => Ok(Expr::PreStep(name, if op == "++" { 1 } else { -1 })),
                _ => Err(syntax(format!("`{}' needs a variable", op), self.src)),
            },
            Some(Tok::Op(op @ ("+" | "-" | "!" | "~"))) => {
                Ok(Expr::Unary(op, Box::new(self.expr(PREFIX_POWER)?)))
            }
            Some(tok) => Err(syntax(format!("syntax error: operand expected (error token is {:?})", tok), self.src)),
            None => Err(syntax("syntax error: operand expected", self.src)),
        }
    }
}

struct Evaluator<'c, C: ExpansionContext + ?Sized> {
    ctx: &'c mut C,
    depth: usize,
    src: String,
}

impl<'c, C: ExpansionContext + ?Sized> Evaluator<'c, C> {
    fn var(&mut self, name: &str) -> ShellResult<i64> {
        let Some(text) = self.ctx.lookup_var(name) else {
            if self.ctx.nounset() {
                return Err(ShellError::expansion(format!("{}: unbound variable", name)).fatal());
            }
            return Ok(0);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(0);
        }
        if let Some(value) = parse_number(text) {
            return Ok(value);
        }
        if self.depth >= MAX_RECURSION {
            return Err(syntax("expression recursion level exceeded", &self.src));
        }
        let text = text.to_string();
        evaluate_at(&text, self.ctx, self.depth + 1)
    }

    fn store(&mut self, name: &str, value: i64) -> ShellResult<i64> {
        self.ctx.assign_var(name, &value.to_string())?;
        Ok(value)
    }

    fn eval(&mut self, expr: &Expr) -> ShellResult<i64> {
        match expr {
            Expr::Num(value) => Ok(*value),
            Expr::Var(name) => self.var(name),
            Expr::Unary(op, inner) => {
                let value = self.eval(inner)?;
                Ok(match *op {
                    "-" => value.wrapping_neg(),
                    "!" => i64::from(value == 0),
                    "~" => !value,
                    _ => value,
                })
            }
            Expr::PreStep(name, delta) => {
                let value = self.var(name)?.wrapping_add(*delta);
                self.store(name, value)
            }
            Expr::PostStep(name, delta) => {
                let value = self.var(name)?;
                self.store(name, value.wrapping_add(*delta))?;
                Ok(value)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if self.eval(condition)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign(op, name, rhs) => {
                let rhs = self.eval(rhs)?;
                let value = if *op == "=" {
                    rhs
                } else {
                    let current = self.var(name)?;
                    self.apply(&op[..op.len() - 1], current, rhs)?
                };
                self.store(name, value)
            }
            Expr::Binary("&&", lhs, rhs) => {
                Ok(i64::from(self.eval(lhs)? != 0 && self.eval(rhs)? != 0))
            }
            Expr::Binary("||", lhs, rhs) => {
                Ok(i64::from(self.eval(lhs)? != 0 || self.eval(rhs)? != 0))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.apply(op, lhs, rhs)
            }
        }
    }

    fn apply(&self, op: &str, lhs: i64, rhs: i64) -> ShellResult<i64> {
        let value = match op {
            "+" => lhs.wrapping_add(rhs),
            "-" => lhs.wrapping_sub(rhs),
            "*" => lhs.wrapping_mul(rhs),
            "/" | "%" if rhs == 0 => {
                return Err(syntax("division by 0", &self.src));
            }
            "/" => lhs.wrapping_div(rhs),
            "%" => lhs.wrapping_rem(rhs),
            "**" => {
                if rhs < 0 {
                    return Err(syntax("exponent less than 0", &self.src));
                }
                wrapping_power(lhs, rhs as u64)
            }
            "<<" => lhs.wrapping_shl((rhs & 63) as u32),
            ">>" => lhs.wrapping_shr((rhs & 63) as u32),
            "<" => i64::from(lhs < rhs),
            "<=" => i64::from(lhs <= rhs),
            ">" => i64::from(lhs > rhs),
            ">=" => i64::from(lhs >= rhs),
            "==" => i64::from(lhs == rhs),
            "!=" => i64::from(lhs != rhs),
            "&" => lhs & rhs,
            "|" => lhs | rhs,
            "^" => lhs ^ rhs,
            "," => rhs,
            _ => return Err(syntax(format!("unknown operator `{}'", op), &self.src)),
        };
        Ok(value)
    }
}

/// `base ** exp` by squaring, wrapping on overflow.
fn wrapping_power(mut base: i64, mut exp: u64) -> i64 {
    let mut result: i64 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    result
}

/// Evaluate an arithmetic expression whose `$` expansions are already done.
pub fn evaluate<C: ExpansionContext + ?Sized>(src: &str, ctx: &mut C) -> ShellResult<i64> {
    evaluate_at(src, ctx, 0)
}

fn evaluate_at<C: ExpansionContext + ?Sized>(
    src: &str,
    ctx: &mut C,
    depth: usize,
) -> ShellResult<i64> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Ok(0);
    }
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        nesting: 0,
        src,
    };
    let expr = parser.expr(0)?;
    if let Some(tok) = parser.peek() {
        return Err(syntax(
            format!("syntax error in expression (error token is {:?})", tok),
            src,
        ));
    }
    let mut evaluator = Evaluator {
        ctx,
        depth,
        src: src.to_string(),
    };
    evaluator.eval(&expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::tests::MapContext;

    fn eval(src: &str) -> i64 {
        let mut ctx = MapContext::default();
        evaluate(src, &mut ctx).unwrap()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7);
        assert_eq!(eval("(1 + 2) * 3"), 9);
        assert_eq!(eval("2 ** 3 ** 2"), 512);
        assert_eq!(eval("10 - 4 - 3"), 3);
        assert_eq!(eval("-2 ** 2"), 4);
        assert_eq!(eval("1 << 4 | 1"), 17);
        assert_eq!(eval("3 > 2 && 2 > 3 || 5 == 5"), 1);
        assert_eq!(eval("!0 + ~0"), 0);
        assert_eq!(eval("7 % 3 ? 10 : 20"), 10);
        assert_eq!(eval(""), 0);
    }

    #[test]
    fn literals() {
        assert_eq!(eval("0x1F"), 31);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("2#101"), 5);
        assert_eq!(parse_number("-12"), Some(-12));
        assert_eq!(parse_number("09"), None);
    }

    #[test]
    fn variables_and_assignment() {
        let mut ctx = MapContext::default();
        ctx.vars.insert("x".into(), "5".into());
        ctx.vars.insert("expr".into(), "x * 2".into());
        assert_eq!(evaluate("x += 3", &mut ctx).unwrap(), 8);
        assert_eq!(ctx.vars["x"], "8");
        assert_eq!(evaluate("x++", &mut ctx).unwrap(), 8);
        assert_eq!(evaluate("--x", &mut ctx).unwrap(), 8);
        assert_eq!(evaluate("expr + 1", &mut ctx).unwrap(), 17);
        assert_eq!(evaluate("unset_var + 1", &mut ctx).unwrap(), 1);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let mut ctx = MapContext::default();
        evaluate("0 && (y = 1)", &mut ctx).unwrap();
        evaluate("1 || (y = 1)", &mut ctx).unwrap();
        evaluate("1 ? 2 : (y = 1)", &mut ctx).unwrap();
        assert!(!ctx.vars.contains_key("y"));
    }

    #[test]
    fn errors() {
        let mut ctx = MapContext::default();
        let err = evaluate("1 / 0", &mut ctx).unwrap_err();
        assert!(err.message.contains("division by 0"));
        assert!(evaluate("5 % 0", &mut ctx).is_err());
        assert!(evaluate("1 +", &mut ctx).is_err());
        assert!(evaluate("(1", &mut ctx).is_err());
        assert!(evaluate("3 = 4", &mut ctx).is_err());
        assert!(evaluate("2 ** -1", &mut ctx).is_err());
    }

    #[test]
    fn powers_wrap_instead_of_overflowing() {
        assert_eq!(eval("2 ** 62"), 1 << 62);
        assert_eq!(eval("2 ** 64"), 0);
        assert_eq!(eval("(-1) ** 9223372036854775807"), -1);
        assert_eq!(eval("(-9223372036854775807 - 1) ** 1"), i64::MIN);
        assert_eq!(eval("(-9223372036854775807 - 1) ** 3"), 0);
        assert_eq!(eval("3 ** 5"), 243);
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let mut ctx = MapContext::default();
        let depth = 100_000;
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = evaluate(&src, &mut ctx).unwrap_err();
        assert!(err.message.contains("nesting level exceeded"), "{}", err.message);
        let negations = format!("{}1", "- ".repeat(depth));
        assert!(evaluate(&negations, &mut ctx).is_err());
        let modest = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&modest, &mut ctx).unwrap(), 1);
    }
}

//! A minimal expression grammar for `compute` transform fields.
//!
//! Open Question decision: rather than embed a scripting engine, the grammar
//! is a small hand-rolled recursive-descent parser over arithmetic, string
//! concatenation (`+` on strings), comparisons, and field references
//! (`$field_name`) plus literals. This mirrors the teacher's own appetite for
//! hand-rolled parsers over pulling in a dependency for something this
//! narrow.

use crate::error::{ConvertError, Result};
use crate::record::{Record, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    FieldRef(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parse a compute expression once, at config-validation time, so a bad
/// expression fails fast instead of on the first record.
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(ConvertError::config(format!(
            "unexpected trailing input in expression: {src}"
        )));
    }
    Ok(expr)
}

pub fn eval(expr: &Expr, record: &Record) -> Result<Value> {
    match expr {
        Expr::FieldRef(name) => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Number(n) => Ok(Value::Float(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Neg(inner) => {
            let v = eval(inner, record)?;
            Ok(Value::Float(-as_f64(&v)?))
        }
        Expr::BinOp(lhs, op, rhs) => {
            let l = eval(lhs, record)?;
            let r = eval(rhs, record)?;
            eval_binop(&l, *op, &r)
        }
    }
}

fn eval_binop(l: &Value, op: BinOp, r: &Value) -> Result<Value> {
    use BinOp::*;
    if matches!(op, Add) && matches!((l, r), (Value::String(_), _) | (_, Value::String(_))) {
        return Ok(Value::String(format!(
            "{}{}",
            l.to_display_string(),
            r.to_display_string()
        )));
    }
    match op {
        Eq => return Ok(Value::Bool(values_equal(l, r))),
        Ne => return Ok(Value::Bool(!values_equal(l, r))),
        _ => {}
    }
    let lf = as_f64(l)?;
    let rf = as_f64(r)?;
    Ok(match op {
        Add => Value::Float(lf + rf),
        Sub => Value::Float(lf - rf),
        Mul => Value::Float(lf * rf),
        Div => Value::Float(lf / rf),
        Lt => Value::Bool(lf < rf),
        Le => Value::Bool(lf <= rf),
        Gt => Value::Bool(lf > rf),
        Ge => Value::Bool(lf >= rf),
        Eq | Ne => unreachable!("handled above"),
    })
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => as_f64(l).ok().zip(as_f64(r).ok()).is_some_and(|(a, b)| a == b),
    }
}

fn as_f64(v: &Value) -> Result<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::RawNumber(s) => s
            .parse()
            .map_err(|_| ConvertError::config(format!("cannot coerce '{s}' to a number"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| ConvertError::config(format!("cannot coerce '{s}' to a number"))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::Array(_) | Value::Map(_) => {
            Err(ConvertError::config("cannot coerce a composite value to a number"))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut chars = src.char_indices().peekable();
    let mut tokens = Vec::new();
    while let Some(&(_, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '$' => {
                chars.next();
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(ConvertError::config("expected a field name after '$'"));
                }
                tokens.push(Token::Field(name));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err(ConvertError::config("unterminated string literal"));
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut s = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| ConvertError::config(format!("invalid number literal: {s}")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                let op: &'static str = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    _ => "/",
                };
                tokens.push(Token::Op(op));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let mut op = c.to_string();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    op.push('=');
                }
                let op: &'static str = match op.as_str() {
                    "==" => "==",
                    "!=" => "!=",
                    "<" => "<",
                    "<=" => "<=",
                    ">" => ">",
                    ">=" => ">=",
                    other => {
                        return Err(ConvertError::config(format!("unknown operator: {other}")))
                    }
                };
                tokens.push(Token::Op(op));
            }
            other => {
                return Err(ConvertError::config(format!(
                    "unexpected character '{other}' in expression"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        if let Some(Token::Op(op @ ("==" | "!=" | "<" | "<=" | ">" | ">="))) = self.peek() {
            let op = binop_from_str(op)?;
            self.next();
            let rhs = self.parse_additive()?;
            return Ok(Expr::BinOp(Box::new(lhs), op, Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Op(op @ ("+" | "-"))) => {
                    let op = binop_from_str(op)?;
                    self.next();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Op(op @ ("*" | "/"))) => {
                    let op = binop_from_str(op)?;
                    self.next();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Op("-")) = self.peek() {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Field(name)) => Ok(Expr::FieldRef(name)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                other => Err(ConvertError::config(format!("unknown identifier: {other}"))),
            },
            Some(Token::LParen) => {
                let inner = self.parse_comparison()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ConvertError::config("expected closing parenthesis")),
                }
            }
            other => Err(ConvertError::config(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }
}

fn binop_from_str(op: &str) -> Result<BinOp> {
    Ok(match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        other => return Err(ConvertError::config(format!("unknown operator: {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(pairs: &[(&str, Value)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.push(*k, v.clone());
        }
        r
    }

    #[test]
    fn evaluates_arithmetic_with_field_refs() {
        let expr = parse("$price * $qty").unwrap();
        let record = record_with(&[("price", Value::Float(2.5)), ("qty", Value::Int(4))]);
        assert_eq!(eval(&expr, &record).unwrap(), Value::Float(10.0));
    }

    #[test]
    fn string_concatenation_via_plus() {
        let expr = parse("$first + ' ' + $last").unwrap();
        let record = record_with(&[
            ("first", Value::String("Ada".into())),
            ("last", Value::String("Lovelace".into())),
        ]);
        assert_eq!(
            eval(&expr, &record).unwrap(),
            Value::String("Ada Lovelace".into())
        );
    }

    #[test]
    fn comparison_operators_produce_bool() {
        let expr = parse("$age >= 18").unwrap();
        let record = record_with(&[("age", Value::Int(21))]);
        assert_eq!(eval(&expr, &record).unwrap(), Value::Bool(true));
    }

    #[test]
    fn operator_precedence_multiplies_before_adding() {
        let expr = parse("1 + 2 * 3").unwrap();
        let record = Record::new();
        assert_eq!(eval(&expr, &record).unwrap(), Value::Float(7.0));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse("$a + 'oops").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("$a )").is_err());
    }
}

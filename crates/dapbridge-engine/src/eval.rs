//! Expression evaluation against a stopped frame.
//!
//! The grammar is deliberately small: literals, names, parentheses, unary
//! minus, arithmetic and comparisons. Names resolve through
//! [`Frame::lookup`] and their display strings are parsed back into values,
//! so anything that does not look like a literal stays opaque.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use crate::frame::Frame;

/// Nesting allowed for parentheses and unary minus combined.
const MAX_NESTING: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,
}

/// Evaluate `expr` in `frame` and render the result.
pub fn evaluate(expr: &str, frame: &Frame) -> Result<String, EvalError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        frame,
    };
    let value = parser.comparison()?;
    if let Some(tok) = parser.peek() {
        return Err(EvalError::Syntax(format!("unexpected {tok}")));
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Opaque(String),
}

impl Value {
    /// Re-read a binding's display string.
    fn from_display(raw: &str) -> Value {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::Int(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if trimmed.contains(['.', 'e', 'E']) {
                return Value::Float(f);
            }
        }
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            if let Ok(tokens) = tokenize(trimmed) {
                if let [Token::Str(s)] = tokens.as_slice() {
                    return Value::Str(s.clone());
                }
            }
        }
        Value::Opaque(raw.to_string())
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Opaque(_) => "opaque",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Opaque(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "'{n}'"),
            Token::Float(x) => write!(f, "'{x}'"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Op(op) => write!(f, "'{op}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

const OPERATORS: [&str; 11] = ["==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%"];

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            if text.contains('.') {
                let f = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::Syntax(format!("invalid number '{text}'")))?;
                tokens.push(Token::Float(f));
            } else {
                let n = text
                    .parse::<i64>()
                    .map_err(|_| EvalError::Syntax(format!("invalid number '{text}'")))?;
                tokens.push(Token::Int(n));
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '"' {
            let (s, next) = read_string(&chars, i + 1)?;
            tokens.push(Token::Str(s));
            i = next;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| EvalError::Syntax(format!("unexpected character '{c}'")))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(tokens)
}

fn read_string(chars: &[char], mut i: usize) -> Result<(String, usize), EvalError> {
    let mut out = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| EvalError::Syntax("unterminated string".into()))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(EvalError::Syntax("unterminated string".into()))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    frame: &'a Frame,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::Syntax("expression nested too deeply".into()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn comparison(&mut self) -> Result<Value, EvalError> {
        let left = self.additive()?;
        match self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            Some(op) => {
                let right = self.additive()?;
                compare(op, &left, &right)
            }
            None => Ok(left),
        }
    }

    fn additive(&mut self) -> Result<Value, EvalError> {
        let mut value = self.multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.multiplicative()?;
            value = arithmetic(op, value, right)?;
        }
        Ok(value)
    }

    fn multiplicative(&mut self) -> Result<Value, EvalError> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let right = self.unary()?;
            value = arithmetic(op, value, right)?;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Value, EvalError> {
        if self.eat_op(&["-"]).is_some() {
            return match self.nested(Self::unary)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Type("integer overflow".into())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::Type(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, EvalError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| EvalError::Syntax("unexpected end of expression".into()))?;
        self.pos += 1;
        match tok {
            Token::Int(n) => Ok(Value::Int(n)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => self
                    .frame
                    .lookup(&name)
                    .map(Value::from_display)
                    .ok_or(EvalError::UnknownName(name)),
            },
            Token::LParen => {
                let value = self.nested(Self::comparison)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(EvalError::Syntax("expected ')'".into())),
                }
            }
            other => Err(EvalError::Syntax(format!("unexpected {other}"))),
        }
    }
}

fn arithmetic(op: &str, left: Value, right: Value) -> Result<Value, EvalError> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                "+" => a.checked_add(b),
                "-" => a.checked_sub(b),
                "*" => a.checked_mul(b),
                "/" | "%" if b == 0 => return Err(EvalError::DivisionByZero),
                "/" => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| EvalError::Type("integer overflow".into()))
        }
        (Value::Str(a), Value::Str(b)) if op == "+" => Ok(Value::Str(format!("{a}{b}"))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => {
                if matches!(op, "/" | "%") && b == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Float(match op {
                    "+" => a + b,
                    "-" => a - b,
                    "*" => a * b,
                    "/" => a / b,
                    _ => a % b,
                }))
            }
            _ => Err(EvalError::Type(format!(
                "unsupported operand types for {op}: '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Opaque(a), Value::Opaque(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    let result = match (op, ordering) {
        ("==", ord) => ord == Some(Ordering::Equal),
        ("!=", ord) => ord != Some(Ordering::Equal),
        (_, None) => {
            return Err(EvalError::Type(format!(
                "'{op}' not supported between '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )))
        }
        ("<", Some(ord)) => ord == Ordering::Less,
        ("<=", Some(ord)) => ord != Ordering::Greater,
        (">", Some(ord)) => ord == Ordering::Greater,
        (_, Some(ord)) => ord != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

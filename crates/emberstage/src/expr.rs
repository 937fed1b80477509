//! Selection-expression evaluation.
//!
//! Conditions are small C-preprocessor-style boolean expressions over macro
//! names (`USE_CLOCK_CUSTOM > 2`, `USE_CLOCK_NIXIE == NIXIE_NOHOLES && ...`).
//! An identifier missing from the store evaluates as its own name treated as
//! a string, which makes it unequal to every numeric literal and every other
//! name. Callers degrade any `Err` to a false condition.

use crate::defines::{MacroStore, MacroValue};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Cmp(CmpOp),
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Ident(String),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    // A presence-only macro; equal only to another one, unordered, falsy.
    Null,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Null => "none",
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
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
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(Error::msg("expected '&&'"));
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(Error::msg("expected '||'"));
                }
                tokens.push(Token::Or);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(Error::msg("expected '==' (assignment is not supported)"));
                }
                tokens.push(Token::Cmp(CmpOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(Error::msg("expected '!='"));
                }
                tokens.push(Token::Cmp(CmpOp::Ne));
            }
            '<' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    CmpOp::Le
                } else {
                    CmpOp::Lt
                };
                tokens.push(Token::Cmp(op));
            }
            '>' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    CmpOp::Ge
                } else {
                    CmpOp::Gt
                };
                tokens.push(Token::Cmp(op));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(Error::msg("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() || c == '-' => {
                tokens.push(lex_number(&mut chars)?);
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            _ => return Err(Error::msg(format!("unexpected character '{c}'"))),
        }
    }
    Ok(tokens)
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token> {
    let mut text = String::new();
    if chars.peek() == Some(&'-') {
        text.push('-');
        chars.next();
    }
    let mut saw_dot = false;
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_digit() || (ch == '.' && !saw_dot) {
            saw_dot |= ch == '.';
            text.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Token::Int(i));
    }
    text.parse::<f64>()
        .map(Token::Float)
        .map_err(|_| Error::msg(format!("invalid number '{text}'")))
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
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        if self.peek().is_some() {
            return Err(Error::msg("trailing input after expression"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_cmp()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_primary()?;
        while let Some(&Token::Cmp(op)) = self.peek() {
            self.next();
            let rhs = self.parse_primary()?;
            lhs = Expr::Cmp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(Error::msg("expected ')'")),
                }
            }
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::Int(i)) => Ok(Expr::Lit(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(t) => Err(Error::msg(format!("unexpected token {t:?}"))),
            None => Err(Error::msg("unexpected end of expression")),
        }
    }
}

fn lookup(name: &str, store: &MacroStore) -> Value {
    match store.get(name) {
        Some(MacroValue::Int(i)) => Value::Int(*i),
        Some(MacroValue::Float(f)) => Value::Float(*f),
        Some(MacroValue::Str(s)) => Value::Str(s.clone()),
        Some(MacroValue::Defined) => Value::Null,
        // Undefined names degrade to their own spelling as a string.
        None => Value::Str(name.to_string()),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        // Mismatched types are unequal, never an error.
        _ => false,
    }
}

fn values_ordering(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let ord = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(Error::msg(format!(
                "cannot order {} against {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    };
    // NaN orders as false on every side, like the host language the original
    // scripts evaluated under.
    let Some(ord) = ord else { return Ok(false) };
    Ok(match op {
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("equality handled separately"),
    })
}

fn eval(expr: &Expr, store: &MacroStore) -> Result<Value> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Ident(name) => Ok(lookup(name, store)),
        Expr::Cmp { op, lhs, rhs } => {
            let l = eval(lhs, store)?;
            let r = eval(rhs, store)?;
            let result = match op {
                CmpOp::Eq => values_equal(&l, &r),
                CmpOp::Ne => !values_equal(&l, &r),
                _ => values_ordering(*op, &l, &r)?,
            };
            Ok(Value::Bool(result))
        }
        Expr::And(lhs, rhs) => {
            if !eval(lhs, store)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, store)?.truthy()))
        }
        Expr::Or(lhs, rhs) => {
            if eval(lhs, store)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, store)?.truthy()))
        }
    }
}

/// Evaluates a selection expression against the store. Lexing, parsing and
/// type errors all surface as `Err`; the planner treats those as a false
/// condition and keeps going.
pub fn evaluate(expression: &str, store: &MacroStore) -> Result<bool> {
    let tokens = lex(expression)?;
    let parser = Parser { tokens, pos: 0 };
    let expr = parser.parse()?;
    Ok(eval(&expr, store)?.truthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defines::MacroValue;

    fn store() -> MacroStore {
        MacroStore::from([
            ("USE_CLOCK_CUSTOM", MacroValue::Int(3)),
            ("SCALE", MacroValue::Float(1.5)),
            ("BOARD", MacroValue::Str("esp32s3".into())),
            ("FEATURE_FLAG", MacroValue::Defined),
        ])
    }

    #[test]
    fn numeric_comparisons() {
        let s = store();
        assert!(evaluate("USE_CLOCK_CUSTOM > 2", &s).unwrap());
        assert!(!evaluate("USE_CLOCK_CUSTOM > 3", &s).unwrap());
        assert!(evaluate("USE_CLOCK_CUSTOM >= 3", &s).unwrap());
        assert!(evaluate("SCALE < 2", &s).unwrap());
        assert!(evaluate("USE_CLOCK_CUSTOM == 3.0", &s).unwrap());
    }

    #[test]
    fn undefined_identifier_degrades_to_its_own_name() {
        let s = store();
        assert!(!evaluate("UNKNOWN_FLAG == 1", &s).unwrap());
        assert!(evaluate("UNKNOWN_FLAG != 1", &s).unwrap());
        assert!(evaluate("UNKNOWN_FLAG == 'UNKNOWN_FLAG'", &s).unwrap());
        // Two distinct undefined names are unequal strings.
        assert!(!evaluate("NIXIE_HOLES == NIXIE_NOHOLES", &s).unwrap());
        // Ordering a name string against a number is a (caught) failure.
        assert!(evaluate("UNKNOWN_FLAG > 0", &s).is_err());
    }

    #[test]
    fn string_values_compare_as_strings() {
        let s = store();
        assert!(evaluate("BOARD == 'esp32s3'", &s).unwrap());
        assert!(evaluate("BOARD != \"esp32\"", &s).unwrap());
        assert!(evaluate("BOARD > 'esp32'", &s).unwrap());
    }

    #[test]
    fn presence_only_macros_are_null_like() {
        let s = store();
        assert!(!evaluate("FEATURE_FLAG == 1", &s).unwrap());
        assert!(!evaluate("FEATURE_FLAG", &s).unwrap());
        assert!(evaluate("FEATURE_FLAG < 1", &s).is_err());
    }

    #[test]
    fn boolean_operators_and_truthiness() {
        let s = store();
        assert!(evaluate("USE_CLOCK_CUSTOM > 0 && BOARD == 'esp32s3'", &s).unwrap());
        assert!(evaluate("USE_CLOCK_CUSTOM > 9 || SCALE > 1", &s).unwrap());
        assert!(evaluate("(USE_CLOCK_CUSTOM > 9 || SCALE > 1) && BOARD", &s).unwrap());
        // Truthiness of a bare defined value.
        assert!(evaluate("USE_CLOCK_CUSTOM", &s).unwrap());
        // An undefined name degrades to a non-empty string, which is truthy.
        assert!(evaluate("UNDEFINED && USE_CLOCK_CUSTOM > 0", &s).unwrap());
    }

    #[test]
    fn malformed_expressions_error_instead_of_panicking() {
        let s = store();
        assert!(evaluate("((", &s).is_err());
        assert!(evaluate("USE_CLOCK_CUSTOM >", &s).is_err());
        assert!(evaluate("USE_CLOCK_CUSTOM = 3", &s).is_err());
        assert!(evaluate("A & B", &s).is_err());
        assert!(evaluate("'unterminated", &s).is_err());
        assert!(evaluate("1 2", &s).is_err());
    }
}

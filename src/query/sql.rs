//! Parser for the restricted query text the stores accept:
//!
//! ```text
//! SELECT * FROM <source> [<alias>] [WHERE <path> = <operand> (AND <path> = <operand>)*]
//! ```
//!
//! `<path>` is `alias.field` with further `.field` or `["field"]` steps;
//! `<operand>` is a quoted string, a number, `true`, `false`, `null` or a
//! `@parameter`. Keywords are case-insensitive.

use serde_json::{Number, Value};

use super::{Predicate, QuerySpec};
use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Param(String),
    Star,
    Dot,
    Eq,
    LBracket,
    RBracket,
}

/// A query accepted by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub source: String,
    pub filter: Option<Predicate>,
}

impl ParsedQuery {
    pub fn matches(&self, document: &Value) -> bool {
        self.filter
            .as_ref()
            .map(|p| p.matches(document))
            .unwrap_or(true)
    }
}

/// Whether `s` can be written as a bare `.field` step.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn parse(spec: &QuerySpec) -> Result<ParsedQuery, StoreError> {
    let tokens = tokenize(&spec.query)?;
    Parser {
        tokens,
        pos: 0,
        spec,
    }
    .parse()
}

fn bad(message: impl Into<String>) -> StoreError {
    StoreError::BadRequest(message.into())
}

fn tokenize(text: &str) -> Result<Vec<Token>, StoreError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(bad("Unterminated string literal")),
                        Some('\\') => {
                            let escaped = *chars
                                .get(i + 1)
                                .ok_or_else(|| bad("Unterminated string literal"))?;
                            i += 2;
                            match escaped {
                                'n' => value.push('\n'),
                                't' => value.push('\t'),
                                'r' => value.push('\r'),
                                'b' => value.push('\u{8}'),
                                'f' => value.push('\u{c}'),
                                'u' => {
                                    let (ch, used) = unicode_escape(&chars, i)?;
                                    value.push(ch);
                                    i += used;
                                }
                                other => value.push(other),
                            }
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '@' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i == start + 1 {
                    return Err(bad("Empty parameter name"));
                }
                tokens.push(Token::Param(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-'))
                {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<Number>()
                    .map_err(|_| bad(format!("Invalid number literal '{}'", literal)))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(bad(format!("Unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// Decode the `XXXX` of a `\uXXXX` escape starting at `at`, joining a UTF-16
/// surrogate pair when one follows. Returns the char and the chars consumed.
fn unicode_escape(chars: &[char], at: usize) -> Result<(char, usize), StoreError> {
    let high = hex_unit(chars, at)?;
    if !(0xD800..0xDC00).contains(&high) {
        let ch = char::from_u32(high).ok_or_else(|| bad("Invalid unicode escape"))?;
        return Ok((ch, 4));
    }

    if chars.get(at + 4) != Some(&'\\') || chars.get(at + 5) != Some(&'u') {
        return Err(bad("Unpaired surrogate in unicode escape"));
    }
    let low = hex_unit(chars, at + 6)?;
    if !(0xDC00..0xE000).contains(&low) {
        return Err(bad("Unpaired surrogate in unicode escape"));
    }
    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
    let ch = char::from_u32(code).ok_or_else(|| bad("Invalid unicode escape"))?;
    Ok((ch, 10))
}

fn hex_unit(chars: &[char], at: usize) -> Result<u32, StoreError> {
    let digits = chars
        .get(at..at + 4)
        .filter(|d| d.iter().all(char::is_ascii_hexdigit))
        .ok_or_else(|| bad("Invalid unicode escape"))?;
    let digits: String = digits.iter().collect();
    u32::from_str_radix(&digits, 16).map_err(|_| bad("Invalid unicode escape"))
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    spec: &'a QuerySpec,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<ParsedQuery, StoreError> {
        self.keyword("SELECT")?;
        self.expect(&Token::Star, "'*'")?;
        self.keyword("FROM")?;
        let source = self.ident("collection name")?;

        let alias = match self.peek() {
            Some(Token::Ident(word)) if !word.eq_ignore_ascii_case("WHERE") => {
                let alias = word.clone();
                self.pos += 1;
                alias
            }
            _ => source.clone(),
        };

        let mut filter = None;
        if self.peek().is_some() {
            self.keyword("WHERE")?;
            let mut conditions = vec![self.condition(&alias)?];
            while self.peek().is_some() {
                self.keyword("AND")?;
                conditions.push(self.condition(&alias)?);
            }
            filter = Some(if conditions.len() == 1 {
                conditions.remove(0)
            } else {
                Predicate::And(conditions)
            });
        }

        Ok(ParsedQuery { source, filter })
    }

    fn condition(&mut self, alias: &str) -> Result<Predicate, StoreError> {
        let root = self.ident("field reference")?;
        if root != alias {
            return Err(bad(format!(
                "Identifier '{}' does not refer to '{}'",
                root, alias
            )));
        }

        let mut path = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    path.push(self.ident("field name")?);
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Str(name)) => path.push(name),
                        _ => return Err(bad("Expected quoted field name inside []")),
                    }
                    self.expect(&Token::RBracket, "']'")?;
                }
                _ => break,
            }
        }
        if path.is_empty() {
            return Err(bad("Filter must compare a field, not the whole document"));
        }

        self.expect(&Token::Eq, "'='")?;
        let value = self.operand()?;
        Ok(Predicate::Eq { path, value })
    }

    fn operand(&mut self) -> Result<Value, StoreError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(Value::Number(n)),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" => Ok(Value::Null),
                _ => Err(bad(format!("Unexpected identifier '{}' as operand", word))),
            },
            Some(Token::Param(name)) => self
                .spec
                .parameters
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.value.clone())
                .ok_or_else(|| bad(format!("Parameter '{}' is not bound", name))),
            _ => Err(bad("Expected a literal or parameter")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), StoreError> {
        match self.next() {
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => Ok(()),
            _ => Err(bad(format!("Expected {}", keyword))),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Ident(word)) => Ok(word),
            _ => Err(bad(format!("Expected {}", what))),
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), StoreError> {
        match self.next() {
            Some(ref t) if t == token => Ok(()),
            _ => Err(bad(format!("Expected {}", what))),
        }
    }
}

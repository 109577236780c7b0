//! Reader for mapping literals in the style `{'email': 'a@b.com', 'phone': None}`.
//!
//! Accepts single- or double-quoted strings, integers and floats, `None`,
//! `True`, `False`, nested mappings, lists and tuples (read as lists), and
//! trailing commas. The result is a `serde_json::Value` so it flows through
//! the same flattening as JSON payloads.

use serde_json::{Map, Number, Value};
use std::iter::Peekable;
use std::str::CharIndices;

pub fn parse_literal(text: &str) -> Result<Value, String> {
    let mut parser = LiteralParser {
        chars: text.char_indices().peekable(),
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    match parser.chars.peek() {
        None => Ok(value),
        Some(&(pos, ch)) => Err(format!("unexpected '{}' at position {}", ch, pos)),
    }
}

struct LiteralParser<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl LiteralParser<'_> {
    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        self.skip_whitespace();
        if self.eat(expected) {
            return Ok(());
        }
        match self.chars.peek() {
            Some(&(pos, ch)) => Err(format!("expected '{}' at position {}, found '{}'", expected, pos, ch)),
            None => Err(format!("expected '{}' before end of input", expected)),
        }
    }

    fn value(&mut self) -> Result<Value, String> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            None => Err("unexpected end of input".to_string()),
            Some((_, '{')) => self.mapping(),
            Some((_, '[')) => self.sequence(']'),
            Some((_, '(')) => self.sequence(')'),
            Some((_, '\'' | '"')) => self.string().map(Value::String),
            Some((_, c)) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some((pos, c)) if c.is_alphabetic() || c == '_' => self.name(pos),
            Some((pos, c)) => Err(format!("unexpected '{}' at position {}", c, pos)),
        }
    }

    fn mapping(&mut self) -> Result<Value, String> {
        self.chars.next();
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => return Err(format!("unsupported mapping key {}", other)),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            if !self.eat(',') {
                self.expect('}')?;
                return Ok(Value::Object(map));
            }
        }
    }

    fn sequence(&mut self, close: char) -> Result<Value, String> {
        self.chars.next();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat(close) {
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);

            self.skip_whitespace();
            if !self.eat(',') {
                self.expect(close)?;
                return Ok(Value::Array(items));
            }
        }
    }

    fn string(&mut self) -> Result<String, String> {
        let (start, quote) = match self.chars.next() {
            Some(next) => next,
            None => return Err("unexpected end of input".to_string()),
        };
        let mut value = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                c if c == quote => return Ok(value),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                    // Unknown escapes are kept verbatim
                    Some((_, c)) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => break,
                },
                c => value.push(c),
            }
        }
        Err(format!("unterminated string starting at position {}", start))
    }

    fn number(&mut self) -> Result<Value, String> {
        let mut text = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                if c != '_' {
                    text.push(c);
                }
                self.chars.next();
            } else {
                break;
            }
        }
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{}' is not a finite number", text))
    }

    fn name(&mut self, pos: usize) -> Result<Value, String> {
        let mut ident = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match ident.as_str() {
            "None" => Ok(Value::Null),
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            _ => Err(format!("unknown name '{}' at position {}", ident, pos)),
        }
    }
}

//! Best-effort parser for JSON documents that are still arriving.
//!
//! Streaming tool arguments are a growing prefix of a JSON object. The strict
//! parser rejects every intermediate state, so this one completes the prefix
//! instead: open strings are closed, open containers are closed, a dangling
//! key or separator is dropped, a partial literal (`t`, `fal`, `nu`) completes
//! to its literal and a partial number is trimmed to its longest valid prefix.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::{Map, Value};

/// Accumulated argument text of one streaming tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialDocument {
    text: String,
}

impl PartialDocument {
    /// Empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next fragment.
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Raw accumulated text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether no text has arrived yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Value of the longest parsable prefix, or `None` when nothing usable
    /// has arrived or the text is not JSON.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        complete(&self.text)
    }

    /// Completed value if it is an object.
    #[must_use]
    pub fn object(&self) -> Option<Map<String, Value>> {
        match self.value() {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Complete a JSON prefix.
#[must_use]
pub fn complete(text: &str) -> Option<Value> {
    let mut parser = Parser {
        chars: text.chars().peekable(),
        eof: false,
    };
    parser.skip_ws();
    parser.parse_value().ok().flatten()
}

struct Invalid;

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    /// Set once input ran out mid-value; every open container closes.
    eof: bool,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_ascii_whitespace()).is_some() {}
    }

    fn peek(&mut self) -> Option<char> {
        let next = self.chars.peek().copied();
        if next.is_none() {
            self.eof = true;
        }
        next
    }

    fn parse_value(&mut self) -> Result<Option<Value>, Invalid> {
        match self.peek() {
            None => Ok(None),
            Some('{') => self.parse_object().map(Some),
            Some('[') => self.parse_array().map(Some),
            Some('"') => self.parse_string().map(|s| Some(Value::String(s))),
            Some('t') => self.parse_literal("true", Value::Bool(true)),
            Some('f') => self.parse_literal("false", Value::Bool(false)),
            Some('n') => self.parse_literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(self.parse_number()),
            Some(_) => Err(Invalid),
        }
    }

    fn parse_object(&mut self) -> Result<Value, Invalid> {
        self.chars.next();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some('}') => {
                    self.chars.next();
                    return Ok(Value::Object(map));
                }
                Some('"') => {}
                Some(_) => return Err(Invalid),
            }

            let key = self.parse_string()?;
            if self.eof {
                return Ok(Value::Object(map));
            }
            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some(':') => {
                    self.chars.next();
                }
                Some(_) => return Err(Invalid),
            }
            self.skip_ws();
            if let Some(value) = self.parse_value()? {
                map.insert(key, value);
            }
            if self.eof {
                return Ok(Value::Object(map));
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Object(map)),
                Some(',') => {
                    self.chars.next();
                }
                Some('}') => {
                    self.chars.next();
                    return Ok(Value::Object(map));
                }
                Some(_) => return Err(Invalid),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, Invalid> {
        self.chars.next();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Array(items)),
                Some(']') => {
                    self.chars.next();
                    return Ok(Value::Array(items));
                }
                Some(_) => {}
            }

            if let Some(value) = self.parse_value()? {
                items.push(value);
            }
            if self.eof {
                return Ok(Value::Array(items));
            }

            self.skip_ws();
            match self.peek() {
                None => return Ok(Value::Array(items)),
                Some(',') => {
                    self.chars.next();
                }
                Some(']') => {
                    self.chars.next();
                    return Ok(Value::Array(items));
                }
                Some(_) => return Err(Invalid),
            }
        }
    }

    /// Parse a string starting at its opening quote. An unterminated string
    /// (or a truncated escape) yields what was read so far and sets `eof`.
    fn parse_string(&mut self) -> Result<String, Invalid> {
        self.chars.next();
        let mut out = String::new();
        loop {
            let Some(c) = self.chars.next() else {
                self.eof = true;
                return Ok(out);
            };
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let Some(escape) = self.chars.next() else {
                        self.eof = true;
                        return Ok(out);
                    };
                    match escape {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => match self.parse_unicode_escape()? {
                            Some(decoded) => out.push(decoded),
                            None => {
                                self.eof = true;
                                return Ok(out);
                            }
                        },
                        _ => return Err(Invalid),
                    }
                }
                other => out.push(other),
            }
        }
    }

    /// Decode the digits after `\u`, joining surrogate pairs. `None` means
    /// the escape was cut off.
    fn parse_unicode_escape(&mut self) -> Result<Option<char>, Invalid> {
        let Some(high) = self.read_hex4()? else {
            return Ok(None);
        };
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high).map(Some).ok_or(Invalid);
        }

        match (self.chars.next(), self.chars.next()) {
            (Some('\\'), Some('u')) => {}
            (None, _) | (Some('\\'), None) => return Ok(None),
            _ => return Err(Invalid),
        }
        let Some(low) = self.read_hex4()? else {
            return Ok(None);
        };
        if !(0xDC00..0xE000).contains(&low) {
            return Err(Invalid);
        }
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(combined).map(Some).ok_or(Invalid)
    }

    fn read_hex4(&mut self) -> Result<Option<u32>, Invalid> {
        let mut code = 0u32;
        for _ in 0..4 {
            let Some(c) = self.chars.next() else {
                return Ok(None);
            };
            let digit = c.to_digit(16).ok_or(Invalid)?;
            code = code * 16 + digit;
        }
        Ok(Some(code))
    }

    fn parse_literal(&mut self, literal: &str, value: Value) -> Result<Option<Value>, Invalid> {
        for expected in literal.chars() {
            match self.chars.next() {
                Some(c) if c == expected => {}
                Some(_) => return Err(Invalid),
                None => {
                    self.eof = true;
                    return Ok(Some(value));
                }
            }
        }
        Ok(Some(value))
    }

    fn parse_number(&mut self) -> Option<Value> {
        let mut raw = String::new();
        while let Some(c) = self
            .chars
            .next_if(|c| c.is_ascii_digit() || matches!(*c, '-' | '+' | '.' | 'e' | 'E'))
        {
            raw.push(c);
        }
        if self.chars.peek().is_none() {
            self.eof = true;
        }

        while !raw.is_empty() {
            if let Ok(value @ Value::Number(_)) = serde_json::from_str::<Value>(&raw) {
                return Some(value);
            }
            raw.pop();
        }
        None
    }
}

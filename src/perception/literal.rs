//! Reader for literal-syntax mapping dumps (Python `repr` style) as emitted by
//! older vision-service builds.
//!
//! Accepts dicts, lists, tuples, single/double quoted strings with escapes,
//! integers, floats, `True`, `False` and `None`. The result is a
//! `serde_json::Value`; dict keys that are numbers become their decimal text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::errors::{ParasightError, ParasightResult};

fn numeric_wrapper_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:np|numpy)\.(?:float|int|uint)(?:16|32|64)?\(\s*([^()]*?)\s*\)")
            .expect("numeric wrapper regex must compile")
    })
}

/// Removes numeric-type markers such as `np.float32(10.0)` → `10.0`.
pub fn strip_numeric_wrappers(text: &str) -> String {
    numeric_wrapper_re().replace_all(text, "$1").into_owned()
}

/// Strips numeric wrappers, then evaluates `text` as a single literal.
pub fn parse_literal(text: &str) -> ParasightResult<Value> {
    let cleaned = strip_numeric_wrappers(text);
    let mut reader = LiteralReader::new(&cleaned);
    reader.skip_ws();
    let value = reader.value()?;
    reader.skip_ws();
    if reader.pos < reader.chars.len() {
        return Err(reader.error("trailing characters after literal"));
    }
    Ok(value)
}

struct LiteralReader {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralReader {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, msg: &str) -> ParasightError {
        ParasightError::Format(format!("literal parse error at {}: {msg}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> ParasightResult<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(&format!("expected '{want}', found end of input"))),
        }
    }

    fn value(&mut self) -> ParasightResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> ParasightResult<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => if b { "True".into() } else { "False".into() },
                _ => return Err(self.error("unsupported dict key")),
            };
            self.skip_ws();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}' in dict")),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> ParasightResult<Value> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn string(&mut self) -> ParasightResult<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let esc = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '\'' => out.push('\''),
                        '"' => out.push('"'),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> ParasightResult<char> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated hex escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid hex escape"))
    }

    fn number(&mut self) -> ParasightResult<Value> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_')
        ) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        let is_float = raw.contains(['.', 'e', 'E']);
        if !is_float {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(Value::Number(i.into()));
            }
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(&format!("invalid number '{raw}'")))
    }

    fn keyword(&mut self) -> ParasightResult<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            other => Err(self.error(&format!("unsupported name '{other}'"))),
        }
    }
}

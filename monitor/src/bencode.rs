/// Bencode-style dictionary codec used by the LuaSTGPlus remote-debugger wire
/// protocol: `i<digits>e` integers, `<len>:<bytes>` byte strings, `l…e` lists
/// and `d…e` dictionaries with UTF-8 string keys.
///
/// Every datagram arrives from an unauthenticated local sender, so the decoder
/// must never panic: all lengths are bounds-checked, integers are parsed with
/// overflow detection and nesting depth is capped.
use std::collections::BTreeMap;

use thiserror::Error;

/// Maximum nesting of lists/dictionaries accepted by the decoder.
/// Real telemetry datagrams nest exactly twice (top dict + args dict).
const MAX_DEPTH: usize = 32;

/// Longest accepted integer literal: i64::MIN is 20 characters.
const MAX_INT_DIGITS: usize = 20;

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    /// Byte strings are not guaranteed to be UTF-8 (only dictionary keys are).
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input ended mid-value")]
    Truncated,
    #[error("invalid length prefix")]
    BadLength,
    #[error("invalid integer literal")]
    BadInt,
    #[error("unknown type marker 0x{0:02x}")]
    BadMarker(u8),
    #[error("dictionary key is not valid UTF-8")]
    NonUtf8Key,
    #[error("value nesting exceeds {MAX_DEPTH} levels")]
    TooDeep,
    #[error("top-level value is not a dictionary")]
    NotADictionary,
    #[error("trailing bytes after the top-level value")]
    TrailingData,
}

/// Decodes `data` as a single bencode value.
/// Fails on trailing bytes — a datagram carries exactly one value.
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.parse_value(0)?;
    if parser.pos != data.len() {
        return Err(DecodeError::TrailingData);
    }
    Ok(value)
}

/// Decodes `data` and requires the top-level value to be a dictionary,
/// the only shape the wire protocol produces.
pub fn decode_dictionary(data: &[u8]) -> Result<BTreeMap<String, Value>, DecodeError> {
    match decode(data)? {
        Value::Dict(map) => Ok(map),
        _ => Err(DecodeError::NotADictionary),
    }
}

/// Encodes `value` into its bencode byte form. Dictionary keys are emitted in
/// sorted order (`BTreeMap` iteration order), as bencode requires.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(n) => {
            out.push(b'i');
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(bytes) => {
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(bytes);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(map) => {
            out.push(b'd');
            for (key, val) in map {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key.as_bytes());
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<u8, DecodeError> {
        self.data.get(self.pos).copied().ok_or(DecodeError::Truncated)
    }

    fn bump(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        match self.peek()? {
            b'i' => self.parse_int(),
            b'0'..=b'9' => Ok(Value::Bytes(self.parse_bytes()?)),
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.parse_value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.pos += 1;
                let mut map = BTreeMap::new();
                while self.peek()? != b'e' {
                    // Keys are always byte strings on the wire.
                    if !self.peek()?.is_ascii_digit() {
                        return Err(DecodeError::BadMarker(self.peek()?));
                    }
                    let raw_key = self.parse_bytes()?;
                    let key =
                        String::from_utf8(raw_key).map_err(|_| DecodeError::NonUtf8Key)?;
                    let val = self.parse_value(depth + 1)?;
                    map.insert(key, val);
                }
                self.pos += 1;
                Ok(Value::Dict(map))
            }
            other => Err(DecodeError::BadMarker(other)),
        }
    }

    fn parse_int(&mut self) -> Result<Value, DecodeError> {
        self.pos += 1; // consume 'i'
        let negative = if self.peek()? == b'-' {
            self.pos += 1;
            true
        } else {
            false
        };

        let mut digits = 0usize;
        let mut first_digit = 0u8;
        let mut value: i64 = 0;
        loop {
            match self.bump()? {
                b'e' => break,
                d @ b'0'..=b'9' => {
                    if digits == 0 {
                        first_digit = d;
                    }
                    digits += 1;
                    if digits > MAX_INT_DIGITS {
                        return Err(DecodeError::BadInt);
                    }
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_sub(i64::from(d - b'0')))
                        .ok_or(DecodeError::BadInt)?;
                }
                _ => return Err(DecodeError::BadInt),
            }
        }
        if digits == 0 {
            return Err(DecodeError::BadInt);
        }
        // Canonical form only: no leading zeros, and zero is never signed.
        if digits > 1 && first_digit == b'0' {
            return Err(DecodeError::BadInt);
        }
        if negative && value == 0 {
            return Err(DecodeError::BadInt);
        }
        // Accumulated negated so that i64::MIN parses without overflow.
        if negative {
            Ok(Value::Int(value))
        } else {
            value.checked_neg().map(Value::Int).ok_or(DecodeError::BadInt)
        }
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut len: usize = 0;
        let mut digits = 0usize;
        loop {
            match self.bump()? {
                b':' => break,
                d @ b'0'..=b'9' => {
                    digits += 1;
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(d - b'0')))
                        .ok_or(DecodeError::BadLength)?;
                }
                _ => return Err(DecodeError::BadLength),
            }
        }
        if digits == 0 {
            return Err(DecodeError::BadLength);
        }
        // Reject length prefixes that claim more bytes than the datagram holds
        // before allocating anything.
        let end = self.pos.checked_add(len).ok_or(DecodeError::BadLength)?;
        if end > self.data.len() {
            return Err(DecodeError::Truncated);
        }
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }
}

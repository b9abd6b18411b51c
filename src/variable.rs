// Typed variables living at fixed addresses inside a memory region.
//
// A variable converts between a logical `Value` and the byte sequence stored
// in memory. The byte order of that sequence is an explicit argument to every
// codec call; `Endian::Little` is what `MemoryRegion::write_object` expects.
// Unset bytes travel as `None`: serializing a null value yields all-`None`
// (leave memory untouched), and any `None` in the input to `deserialize`
// means the variable is not present.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::{Address, Endian};

/// Widest supported integer, in bytes.
pub const MAX_INTEGER_SIZE: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Bool,
    Char,
    /// Integer tag such as `u16` or `i8`. `bits` is the width named by the
    /// tag; the stored width is always the variable's `size`.
    Integer { bits: u16, signed: bool },
}

impl FromStr for VarType {
    type Err = Error;

    /// Parse a type tag: `bool`, `char`, or an integer tag `[uhisc]<bits>`
    /// where `i` and `s` are signed.
    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "bool" => return Ok(Self::Bool),
            "char" => return Ok(Self::Char),
            _ => {}
        }

        let mut chars = tag.chars();
        let signed = match chars.next() {
            Some('i' | 's') => Some(true),
            Some('u' | 'h' | 'c') => Some(false),
            _ => None,
        };
        let digits = chars.as_str();
        let bits = if (1..=3).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<u16>().ok().filter(|b| (1..=128).contains(b))
        } else {
            None
        };

        match (signed, bits) {
            (Some(signed), Some(bits)) => Ok(Self::Integer { bits, signed }),
            _ => Err(Error::Type(format!("unsupported variable type '{s}'"))),
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Char => f.write_str("char"),
            Self::Integer { bits, signed: true } => write!(f, "i{bits}"),
            Self::Integer { bits, signed: false } => write!(f, "u{bits}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A logical variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i128),
    Char(char),
    Text(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Char(c) => write!(f, "{c}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Parse an integer literal: decimal, `0x` hex or `0b` binary, optionally
/// negative.
pub fn parse_integer(text: &str) -> Option<i128> {
    let text = text.trim().replace('_', "");
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let lower = digits.to_ascii_lowercase();
    let magnitude = if let Some(hex) = lower.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i128::from_str_radix(bin, 2).ok()?
    } else {
        lower.parse::<i128>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

// ---------------------------------------------------------------------------
// Variable
// ---------------------------------------------------------------------------

/// A named, typed view onto a fixed address range of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    size: usize,
    var_type: VarType,
    address: Address,
    default_value: Option<Value>,
    region: String,
    array_depth: Option<usize>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        var_type: VarType,
        address: Address,
        region: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if size < 1 {
            return Err(Error::Config(format!(
                "size cannot be less than 1 for variable '{name}'"
            )));
        }
        match var_type {
            VarType::Bool | VarType::Char if size != 1 => {
                return Err(Error::Config(format!(
                    "variable '{name}' of type '{var_type}' must have size 1, got {size}"
                )));
            }
            VarType::Integer { bits, .. } => {
                if size > MAX_INTEGER_SIZE {
                    return Err(Error::Config(format!(
                        "variable '{name}' is {size} bytes wide, integers are limited to {MAX_INTEGER_SIZE}"
                    )));
                }
                if usize::from(bits) != size * 8 {
                    warn!("variable '{name}': type '{var_type}' declared with size {size}");
                }
            }
            _ => {}
        }
        Ok(Self {
            name,
            size,
            var_type,
            address,
            default_value: None,
            region: region.into(),
            array_depth: None,
        })
    }

    pub fn with_default(mut self, value: Option<Value>) -> Self {
        self.default_value = value;
        self
    }

    /// Turn this variable into an array of `depth` elements.
    pub fn with_array_depth(mut self, depth: usize) -> Result<Self> {
        if depth < 1 {
            return Err(Error::Config(format!(
                "array_depth cannot be less than 1 for variable '{}'",
                self.name
            )));
        }
        self.array_depth = Some(depth);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes per scalar element.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn var_type(&self) -> VarType {
        self.var_type
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Name of the owning region, resolved through the map on every access.
    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_array(&self) -> bool {
        self.array_depth.is_some()
    }

    pub fn array_depth(&self) -> usize {
        self.array_depth.unwrap_or(1)
    }

    /// Total number of logical bytes the variable occupies.
    pub fn byte_len(&self) -> usize {
        self.size * self.array_depth()
    }

    fn is_char_array(&self) -> bool {
        self.is_array() && self.var_type == VarType::Char
    }

    // -----------------------------------------------------------------------
    // Serialize
    // -----------------------------------------------------------------------

    /// Convert `value` to `byte_len()` bytes in `order`.
    ///
    /// A null value yields all-`None`; otherwise every byte is defined.
    pub fn serialize(&self, value: Option<&Value>, order: Endian) -> Result<Vec<Option<u8>>> {
        let Some(value) = value else {
            return Ok(vec![None; self.byte_len()]);
        };

        let bytes = match (self.array_depth, value) {
            (Some(depth), Value::Text(text)) if self.var_type == VarType::Char => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                if bytes.len() > depth {
                    return Err(Error::Type(format!(
                        "string of {} bytes (with terminator) exceeds array_depth {depth} of variable '{}'",
                        bytes.len(),
                        self.name
                    )));
                }
                bytes.resize(depth, 0);
                bytes
            }
            (Some(depth), Value::List(items)) => {
                if items.len() != depth {
                    return Err(Error::Type(format!(
                        "variable '{}' expects {depth} elements, got {}",
                        self.name,
                        items.len()
                    )));
                }
                let mut bytes = Vec::with_capacity(self.byte_len());
                for (i, item) in items.iter().enumerate() {
                    let element = self.serialize_scalar(item, order).map_err(|e| {
                        e.context(format!("element {i} of variable '{}'", self.name))
                    })?;
                    bytes.extend(element);
                }
                bytes
            }
            (Some(depth), scalar) => {
                let element = self.serialize_scalar(scalar, order)?;
                element.repeat(depth)
            }
            (None, scalar) => self.serialize_scalar(scalar, order)?,
        };

        Ok(bytes.into_iter().map(Some).collect())
    }

    fn serialize_scalar(&self, value: &Value, order: Endian) -> Result<Vec<u8>> {
        let invalid = || {
            Error::Type(format!(
                "invalid value '{value}' for variable '{}' of type '{}'",
                self.name, self.var_type
            ))
        };

        let mut bytes = match (self.var_type, value) {
            (VarType::Bool, Value::Bool(b)) => vec![u8::from(*b)],
            (VarType::Bool, Value::Text(t)) if t.eq_ignore_ascii_case("true") => vec![1],
            (VarType::Bool, Value::Text(t)) if t.eq_ignore_ascii_case("false") => vec![0],
            // A single char cell holds one ASCII byte; raw bytes go through integers.
            (VarType::Char, Value::Char(c)) if c.is_ascii() => vec![*c as u8],
            (VarType::Char, Value::Text(t)) => match t.chars().next() {
                Some(c) if c.is_ascii() => vec![c as u8],
                _ => return Err(invalid()),
            },
            (VarType::Char, Value::Integer(n)) => vec![u8::try_from(*n).map_err(|_| invalid())?],
            (VarType::Integer { signed, .. }, Value::Integer(n)) => {
                if !fits(*n, self.size, signed) {
                    warn!(
                        "value {n} truncated to {} bytes for variable '{}'",
                        self.size, self.name
                    );
                }
                (0..self.size).map(|i| (*n >> (8 * i)) as u8).collect()
            }
            _ => return Err(invalid()),
        };

        if order == Endian::Big {
            bytes.reverse();
        }
        Ok(bytes)
    }

    // -----------------------------------------------------------------------
    // Deserialize
    // -----------------------------------------------------------------------

    /// Decode bytes in `order` back into a value.
    ///
    /// Returns `None` when a scalar's input is empty or contains an unset
    /// byte. Arrays must have exactly `byte_len()` bytes; any unset byte
    /// among them makes the whole array `None`.
    pub fn deserialize(&self, raw: &[Option<u8>], order: Endian) -> Result<Option<Value>> {
        let absent = raw.is_empty() || raw.iter().any(Option::is_none);
        if absent && !self.is_array() {
            return Ok(None);
        }
        if raw.len() != self.byte_len() {
            return Err(Error::Type(format!(
                "byte-array length ({}) does not match expected length ({}) for variable '{}'",
                raw.len(),
                self.byte_len(),
                self.name
            )));
        }
        if absent {
            return Ok(None);
        }
        let bytes: Vec<u8> = raw.iter().flatten().copied().collect();

        if !self.is_array() {
            return Ok(Some(self.decode_scalar(&bytes, order)));
        }

        if self.is_char_array() {
            let text: Vec<u8> = bytes.iter().copied().take_while(|&b| b != 0).collect();
            let text = String::from_utf8(text)
                .unwrap_or_else(|e| e.into_bytes().into_iter().map(char::from).collect());
            return Ok(Some(Value::Text(text)));
        }

        let items = bytes
            .chunks(self.size)
            .map(|chunk| self.decode_scalar(chunk, order))
            .collect();
        Ok(Some(Value::List(items)))
    }

    /// `chunk` is exactly `size` bytes.
    fn decode_scalar(&self, chunk: &[u8], order: Endian) -> Value {
        match self.var_type {
            VarType::Bool => Value::Bool(chunk[0] == 1),
            VarType::Char => Value::Char(char::from(chunk[0])),
            VarType::Integer { signed, .. } => {
                let combine = |acc: u128, &b: &u8| (acc << 8) | u128::from(b);
                let raw = match order {
                    Endian::Little => chunk.iter().rev().fold(0, combine),
                    Endian::Big => chunk.iter().fold(0, combine),
                };
                let shift = 128 - 8 * self.size as u32;
                let value = if signed && shift > 0 {
                    ((raw << shift) as i128) >> shift
                } else {
                    raw as i128
                };
                Value::Integer(value)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Text input
    // -----------------------------------------------------------------------

    /// Parse user-supplied text into a value for this variable.
    ///
    /// `null` means "leave untouched". Char arrays take the text as-is; other
    /// arrays take a comma separated list or a single value to broadcast.
    pub fn parse_value(&self, text: &str) -> Result<Option<Value>> {
        if text.trim() == "null" {
            return Ok(None);
        }
        if self.is_char_array() {
            return Ok(Some(Value::Text(text.to_string())));
        }
        if self.is_array() && text.contains(',') {
            let items = text
                .split(',')
                .map(|item| self.parse_scalar(item))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some(Value::List(items)));
        }
        self.parse_scalar(text).map(Some)
    }

    fn parse_scalar(&self, text: &str) -> Result<Value> {
        let invalid = || {
            Error::Type(format!(
                "cannot parse '{text}' as '{}' for variable '{}'",
                self.var_type, self.name
            ))
        };
        let trimmed = text.trim();
        match self.var_type {
            VarType::Bool if trimmed.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            VarType::Bool if trimmed.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            VarType::Bool => Err(invalid()),
            VarType::Char => text.chars().next().map(Value::Char).ok_or_else(invalid),
            VarType::Integer { .. } => parse_integer(trimmed).map(Value::Integer).ok_or_else(invalid),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, size {}, {}@{:#X}",
            self.name, self.var_type, self.size, self.region, self.address
        )?;
        if let Some(depth) = self.array_depth {
            write!(f, ", array of {depth}")?;
        }
        f.write_str(")")
    }
}

fn fits(n: i128, size: usize, signed: bool) -> bool {
    if size >= MAX_INTEGER_SIZE {
        return true;
    }
    let bits = 8 * size as u32;
    if signed {
        let half = 1i128 << (bits - 1);
        (-half..half).contains(&n)
    } else {
        (0..1i128 << bits).contains(&n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Typed control values and number parsing

use std::fmt;

use crate::error::ValueError;

/// A value flowing between the dispatcher and a driver
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Integer view of the value.
    ///
    /// Floats with no fractional part and numeric strings are accepted.
    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            Value::Str(s) => parse_int(s).ok_or_else(|| wrong("integer", self)),
            _ => Err(wrong("integer", self)),
        }
    }

    /// Non-negative integer view, for raw register and bit-field values
    pub fn as_u64(&self) -> Result<u64, ValueError> {
        let v = self.as_int()?;
        u64::try_from(v).map_err(|_| ValueError::OutOfRange {
            value: v,
            min: 0,
            max: i64::MAX,
        })
    }

    /// Floating-point view of the value
    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(f) => Ok(*f),
            Value::Str(s) => s.trim().parse().map_err(|_| wrong("number", self)),
        }
    }
}

fn wrong(expected: &'static str, value: &Value) -> ValueError {
    ValueError::WrongType {
        expected,
        value: value.to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl TryFrom<u64> for Value {
    type Error = ValueError;

    fn try_from(v: u64) -> Result<Self, ValueError> {
        i64::try_from(v).map(Value::Int).map_err(|_| ValueError::TooLarge(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Parse an integer with an optional radix prefix
///
/// Accepts decimal, `0x` hex, `0o` octal and `0b` binary, with an optional
/// leading sign.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };

    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = i64::from_str_radix(body, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse a decimal or prefixed number as a float, integers first
pub fn parse_number(s: &str) -> Option<Value> {
    if let Some(v) = parse_int(s) {
        return Some(Value::Int(v));
    }
    s.trim().parse::<f64>().ok().map(Value::Float)
}

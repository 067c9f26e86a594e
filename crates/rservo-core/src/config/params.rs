//! Control parameter sets
//!
//! Every control carries a string key/value bag per direction. Drivers pull
//! typed values out of it at construction time through the helpers here, so
//! a malformed parameter surfaces as a [`DriverError`] naming the key.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::DriverError;
use crate::value::parse_int;

/// Keys every parameter set must carry
pub const REQUIRED_KEYS: [&str; 2] = ["interface", "drv"];

/// Unordered string key/value parameters of one control direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet {
    values: BTreeMap<String, String>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a parameter set from key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay every key of `other` onto this set
    pub fn merge(&mut self, other: &ParamSet) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Value of a mandatory parameter
    pub fn require(&self, key: &'static str) -> Result<&str, DriverError> {
        self.get(key).ok_or(DriverError::MissingParam(key))
    }

    /// Optional integer parameter (decimal or radix-prefixed)
    pub fn int_param(&self, key: &'static str) -> Result<Option<i64>, DriverError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_int(raw).map(Some).ok_or_else(|| invalid(key, raw)),
        }
    }

    /// Optional integer parameter that must fit in `u32`
    pub fn u32_param(&self, key: &'static str) -> Result<Option<u32>, DriverError> {
        match self.int_param(key)? {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| invalid(key, &v.to_string())),
        }
    }

    /// Mandatory integer parameter
    pub fn require_int(&self, key: &'static str) -> Result<i64, DriverError> {
        self.int_param(key)?.ok_or(DriverError::MissingParam(key))
    }

    /// Optional floating-point parameter
    pub fn float_param(&self, key: &'static str) -> Result<Option<f64>, DriverError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(key, raw)),
        }
    }

    /// Optional boolean parameter (`1`/`0`, `true`/`false`, `yes`/`no`)
    pub fn bool_param(&self, key: &'static str) -> Result<Option<bool>, DriverError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(invalid(key, raw)),
            },
        }
    }
}

fn invalid(key: &'static str, value: &str) -> DriverError {
    DriverError::InvalidParam {
        key,
        value: value.to_string(),
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}

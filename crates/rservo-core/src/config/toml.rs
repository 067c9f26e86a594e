//! TOML control document parsing
//!
//! Parses control documents in TOML format:
//!
//! ```toml
//! include = ["servo_base.toml"]
//!
//! [[map]]
//! name = "onoff_i"
//! doc = "assertive low map for on/off"
//! params = { on = 0, off = 1 }
//!
//! [[control]]
//! name = "warm_reset"
//! doc = "Reset the device warmly"
//! params = { interface = 1, drv = "gpio", offset = 5, map = "onoff_i", init = "off" }
//!
//! [[control]]
//! name = "ppvar_vbat_mv"
//! get = { interface = 2, drv = "ina219", slv = 0x40, subtype = "millivolts" }
//! set = { interface = 2, drv = "ina219", slv = 0x40, subtype = "writereg", reg = "cal" }
//! ```
//!
//! Parameter values may be written as strings, integers, floats or booleans;
//! they are all stored as strings.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::ParamSet;
use crate::error::ConfigError;
use crate::value::parse_int;

/// Top-level document structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlDocument {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub map: Vec<TomlMap>,
    #[serde(default)]
    pub control: Vec<TomlControl>,
}

/// Value map definition
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlMap {
    pub name: Option<String>,
    pub doc: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, TomlParam>,
}

/// Control definition
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlControl {
    pub name: Option<String>,
    pub doc: Option<String>,
    #[serde(default)]
    pub alias: Vec<String>,
    pub params: Option<BTreeMap<String, TomlParam>>,
    pub get: Option<BTreeMap<String, TomlParam>>,
    pub set: Option<BTreeMap<String, TomlParam>>,
}

/// A parameter value: anything scalar
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TomlParam {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl TomlParam {
    fn into_string(self) -> String {
        match self {
            TomlParam::Int(v) => v.to_string(),
            TomlParam::Float(v) => v.to_string(),
            TomlParam::Bool(v) => v.to_string(),
            TomlParam::Str(v) => v,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            TomlParam::Int(v) => Some(*v),
            TomlParam::Str(s) => parse_int(s),
            _ => None,
        }
    }
}

/// Parse a document's text
pub(crate) fn parse_document(origin: &str, content: &str) -> Result<TomlDocument, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

/// Convert a TOML param table into a [`ParamSet`]
pub(crate) fn to_param_set(table: BTreeMap<String, TomlParam>) -> ParamSet {
    ParamSet::from_pairs(table.into_iter().map(|(k, v)| (k, v.into_string())))
}

/// Convert a map's param table into symbolic name -> integer entries
///
/// `clobber_ok` is a loader directive, not an entry.
pub(crate) fn to_map_entries(
    map: &str,
    table: BTreeMap<String, TomlParam>,
) -> Result<BTreeMap<String, i64>, ConfigError> {
    let mut entries = BTreeMap::new();
    for (key, value) in table {
        if key == super::CLOBBER_KEY {
            continue;
        }
        let v = value.as_int().ok_or_else(|| ConfigError::BadMapValue {
            map: map.to_string(),
            key: key.clone(),
            value: value.clone().into_string(),
        })?;
        entries.insert(key, v);
    }
    Ok(entries)
}

/// Collapse runs of whitespace in a doc string
pub(crate) fn normalize_doc(doc: Option<String>) -> Option<String> {
    doc.map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
}

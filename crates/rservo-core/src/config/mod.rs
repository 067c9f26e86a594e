//! Control catalog loaded from declarative documents
//!
//! A [`SystemConfig`] is built up from one or more documents, typically a
//! debug-board base file, then a DUT family file, then board or rework
//! specific overrides. Later documents may redefine a control or map only
//! when the new definition carries `clobber_ok`, in which case its keys are
//! merged into the earlier definition.
//!
//! Once loaded, parameter sets are handed out as `Arc<ParamSet>`; repeated
//! lookups of the same control return the same allocation.

mod params;
mod toml;

pub use params::{ParamSet, REQUIRED_KEYS};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, ValueError};
use crate::value::{parse_number, Value};

use self::toml::{normalize_doc, parse_document, to_map_entries, to_param_set, TomlControl, TomlMap};

/// Names controls may not use
pub const RESERVED_NAMES: [&str; 1] = ["sleep"];

/// Param key allowing a definition to override an earlier one
pub const CLOBBER_KEY: &str = "clobber_ok";

/// Param key retargeting another control name at this definition
pub const REMAP_KEY: &str = "remap";

const UNDOCUMENTED: &str = "undocumented";

/// Direction of a control operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Get,
    Set,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Get => f.write_str("get"),
            Direction::Set => f.write_str("set"),
        }
    }
}

/// One named control
#[derive(Debug, Clone)]
pub struct ControlDef {
    pub name: String,
    pub doc: String,
    pub get: Arc<ParamSet>,
    pub set: Arc<ParamSet>,
}

impl ControlDef {
    pub fn params(&self, direction: Direction) -> &Arc<ParamSet> {
        match direction {
            Direction::Get => &self.get,
            Direction::Set => &self.set,
        }
    }
}

/// Symbolic name <-> integer table
#[derive(Debug, Clone)]
pub struct ValueMap {
    pub name: String,
    pub doc: String,
    entries: BTreeMap<String, i64>,
}

impl ValueMap {
    /// Integer for a symbolic name
    pub fn value(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Symbolic name for an integer
    pub fn key_for(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| **v == value)
            .map(|(k, _)| k.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Which part of the catalog [`SystemConfig::display`] renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Map,
    Control,
}

/// Catalog of controls and value maps
#[derive(Debug, Default)]
pub struct SystemConfig {
    search_paths: Vec<PathBuf>,
    loaded: HashSet<String>,
    controls: Vec<ControlDef>,
    names: BTreeMap<String, usize>,
    maps: BTreeMap<String, ValueMap>,
}

impl SystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory searched for documents and includes
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) {
        self.search_paths.push(dir.into());
    }

    /// Load a document from disk.
    ///
    /// Relative paths that don't exist as given are looked up in the search
    /// paths. Loading a document that is already loaded is a no-op.
    pub fn add_source(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let resolved = self.find_document(path, None).ok_or_else(|| ConfigError::NotFound {
            name: path.display().to_string(),
            origin: "command line".to_string(),
        })?;
        self.load_file(&resolved)
    }

    /// Load a document from a string.
    ///
    /// `origin` identifies the document for the reload rule; includes
    /// resolve relative to `base_dir` first, then the search paths.
    pub fn add_str(
        &mut self,
        origin: &str,
        content: &str,
        base_dir: Option<&Path>,
    ) -> Result<(), ConfigError> {
        if !self.loaded.insert(origin.to_string()) {
            log::debug!("Config '{}' already loaded", origin);
            return Ok(());
        }
        self.load_document(origin, content, base_dir)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let origin = canonical.display().to_string();
        if !self.loaded.insert(origin.clone()) {
            log::debug!("Config '{}' already loaded", origin);
            return Ok(());
        }

        let content = fs::read_to_string(&canonical).map_err(|source| ConfigError::Io {
            path: canonical.clone(),
            source,
        })?;
        log::info!("Loading config {}", origin);
        self.load_document(&origin, &content, canonical.parent())
    }

    fn load_document(
        &mut self,
        origin: &str,
        content: &str,
        base_dir: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let doc = parse_document(origin, content)?;

        for include in &doc.include {
            let path = self
                .find_document(Path::new(include), base_dir)
                .ok_or_else(|| ConfigError::NotFound {
                    name: include.clone(),
                    origin: origin.to_string(),
                })?;
            log::debug!("{} includes {}", origin, path.display());
            self.load_file(&path)?;
        }

        for map in doc.map {
            self.add_map(origin, map)?;
        }
        for control in doc.control {
            self.add_control(origin, control)?;
        }
        Ok(())
    }

    fn find_document(&self, name: &Path, base_dir: Option<&Path>) -> Option<PathBuf> {
        if name.is_absolute() || (base_dir.is_none() && name.is_file()) {
            return name.is_file().then(|| name.to_path_buf());
        }
        base_dir
            .into_iter()
            .chain(self.search_paths.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn add_map(&mut self, origin: &str, map: TomlMap) -> Result<(), ConfigError> {
        let name = map.name.ok_or_else(|| ConfigError::MissingName {
            kind: "map",
            origin: origin.to_string(),
        })?;
        let clobber = map.params.contains_key(CLOBBER_KEY);
        let doc = normalize_doc(map.doc);
        let entries = to_map_entries(&name, map.params)?;

        if let Some(existing) = self.maps.get_mut(&name) {
            if !clobber {
                return Err(ConfigError::Duplicate {
                    kind: "map",
                    name,
                    origin: origin.to_string(),
                });
            }
            log::debug!("Map '{}' clobbered by {}", name, origin);
            existing.entries.extend(entries);
            if let Some(doc) = doc {
                existing.doc = doc;
            }
            return Ok(());
        }

        self.maps.insert(
            name.clone(),
            ValueMap {
                name,
                doc: doc.unwrap_or_else(|| UNDOCUMENTED.to_string()),
                entries,
            },
        );
        Ok(())
    }

    fn add_control(&mut self, origin: &str, control: TomlControl) -> Result<(), ConfigError> {
        let name = control.name.ok_or_else(|| ConfigError::MissingName {
            kind: "control",
            origin: origin.to_string(),
        })?;
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::ReservedName(name));
        }

        let (get, set) = match (control.params, control.get, control.set) {
            (Some(params), None, None) => {
                let shared = Arc::new(to_param_set(params));
                (shared.clone(), shared)
            }
            (None, Some(get), Some(set)) => (Arc::new(to_param_set(get)), Arc::new(to_param_set(set))),
            _ => return Err(ConfigError::IllegalParams { name }),
        };
        let doc = normalize_doc(control.doc);

        let idx = match self.names.get(&name) {
            Some(&idx) => {
                if !(get.contains(CLOBBER_KEY) && set.contains(CLOBBER_KEY)) {
                    return Err(ConfigError::Duplicate {
                        kind: "control",
                        name,
                        origin: origin.to_string(),
                    });
                }
                log::debug!("Control '{}' clobbered by {}", name, origin);
                let def = &mut self.controls[idx];
                if Arc::ptr_eq(&def.get, &def.set) && Arc::ptr_eq(&get, &set) {
                    let mut merged = (*def.get).clone();
                    merged.merge(&get);
                    def.get = Arc::new(merged);
                    def.set = def.get.clone();
                } else {
                    Arc::make_mut(&mut def.get).merge(&get);
                    Arc::make_mut(&mut def.set).merge(&set);
                }
                if let Some(doc) = doc {
                    def.doc = doc;
                }
                idx
            }
            None => {
                let idx = self.controls.len();
                self.controls.push(ControlDef {
                    name: name.clone(),
                    doc: doc.unwrap_or_else(|| UNDOCUMENTED.to_string()),
                    get,
                    set,
                });
                self.names.insert(name.clone(), idx);
                idx
            }
        };

        for alias in control.alias {
            match self.names.get(&alias) {
                Some(&other) if other != idx => {
                    return Err(ConfigError::AliasCollision { alias, name });
                }
                _ => {
                    self.names.insert(alias, idx);
                }
            }
        }

        let def = &self.controls[idx];
        let remaps: Vec<String> = [&def.get, &def.set]
            .iter()
            .filter_map(|p| p.get(REMAP_KEY).map(str::to_string))
            .collect();
        for target in remaps {
            log::debug!("Control '{}' remapped onto '{}'", target, name);
            self.names.insert(target, idx);
        }
        Ok(())
    }

    /// Parameter set of a control for one direction
    pub fn lookup(&self, name: &str, direction: Direction) -> Result<Arc<ParamSet>, ConfigError> {
        Ok(self.control(name)?.params(direction).clone())
    }

    /// Full definition of a control (aliases and remaps resolved)
    pub fn control(&self, name: &str) -> Result<&ControlDef, ConfigError> {
        self.names
            .get(name)
            .map(|&idx| &self.controls[idx])
            .ok_or_else(|| ConfigError::UnknownControl {
                name: name.to_string(),
                valid: self.names.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn is_control(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Doc string of a control
    pub fn doc(&self, name: &str) -> Result<&str, ConfigError> {
        Ok(&self.control(name)?.doc)
    }

    /// Every name a control can be reached by, sorted
    pub fn control_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// Control definitions in load order
    pub fn controls(&self) -> impl Iterator<Item = &ControlDef> {
        self.controls.iter()
    }

    pub fn map(&self, name: &str) -> Option<&ValueMap> {
        self.maps.get(name)
    }

    pub fn maps(&self) -> impl Iterator<Item = &ValueMap> {
        self.maps.values()
    }

    /// Controls with an `init` value, in load order
    pub fn init_sequence(&self) -> Vec<(String, String)> {
        self.controls
            .iter()
            .filter_map(|def| {
                def.set
                    .get("init")
                    .map(|init| (def.name.clone(), init.to_string()))
            })
            .collect()
    }

    /// Convert user text into a value for a control.
    ///
    /// `input_type = "str"` passes text through verbatim. Otherwise integers
    /// (with radix prefixes) and floats are tried before the control's map.
    pub fn resolve_value(&self, params: &ParamSet, text: &str) -> Result<Value, ValueError> {
        if params.get("input_type") == Some("str") {
            return Ok(Value::Str(text.to_string()));
        }
        if let Some(v) = parse_number(text) {
            return Ok(v);
        }

        let map_name = params
            .get("map")
            .ok_or_else(|| ValueError::NoMap(text.to_string()))?;
        let map = self
            .maps
            .get(map_name)
            .ok_or_else(|| ValueError::UndefinedMap(map_name.to_string()))?;
        map.value(text.trim())
            .map(Value::Int)
            .ok_or_else(|| ValueError::UnknownKey {
                map: map_name.to_string(),
                key: text.to_string(),
                valid: map.keys().collect::<Vec<_>>().join(", "),
            })
    }

    /// Render a driver's raw value for display.
    ///
    /// A control with a map shows the matching symbolic name; one with `fmt`
    /// applies that formatter; anything else is shown as is.
    pub fn format_value(&self, params: &ParamSet, raw: &Value) -> Result<String, ValueError> {
        if let Some(map_name) = params.get("map") {
            let key = match (self.maps.get(map_name), raw.as_int()) {
                (Some(map), Ok(v)) => map.key_for(v),
                _ => None,
            };
            return Ok(key.map_or_else(|| raw.to_string(), str::to_string));
        }

        match params.get("fmt") {
            None => Ok(raw.to_string()),
            Some("hex") => {
                let v = raw.as_int()?;
                Ok(if v < 0 {
                    format!("-{:#x}", v.unsigned_abs())
                } else {
                    format!("{:#x}", v)
                })
            }
            Some(other) => Err(ValueError::UnknownFormat(other.to_string())),
        }
    }

    /// Human-readable dump of maps and/or controls
    pub fn display(&self, section: Option<Section>) -> String {
        let mut out = Vec::new();
        let sections = match section {
            Some(s) => vec![s],
            None => vec![Section::Map, Section::Control],
        };

        for section in sections {
            out.push("*************".to_string());
            out.push(format!(
                "* {}",
                match section {
                    Section::Map => "MAP",
                    Section::Control => "CONTROL",
                }
            ));
            out.push("*************".to_string());

            match section {
                Section::Map => {
                    let width = self.maps.keys().map(String::len).max().unwrap_or(0);
                    let dashes = "-".repeat(width);
                    for map in self.maps.values() {
                        out.push(format!("{:<width$} DOC: {}", map.name, map.doc));
                        let entries: Vec<String> =
                            map.entries.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                        out.push(format!("{} MAP: {{{}}}", dashes, entries.join(", ")));
                    }
                }
                Section::Control => {
                    let mut defs: Vec<&ControlDef> = self.controls.iter().collect();
                    defs.sort_by(|a, b| a.name.cmp(&b.name));
                    let width = defs.iter().map(|d| d.name.len()).max().unwrap_or(0);
                    let dashes = "-".repeat(width);
                    for def in defs {
                        out.push(format!("{:<width$} DOC: {}", def.name, def.doc));
                        out.push(format!("{} GET: {}", dashes, def.get));
                        out.push(format!("{} SET: {}", dashes, def.set));
                    }
                }
            }
        }
        out.join("\n")
    }
}

//! Driver trait, construction context and the driver registry
//!
//! A driver turns a control's value into bus operations for one kind of
//! device. The dispatcher constructs one driver per (control, direction) on
//! first use, using the factory registered under the control's `drv` key.

pub mod gpio;
pub mod ina2xx;
pub mod m24c02;
pub mod misc;
pub mod tca6416;
pub mod uart;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{Direction, ParamSet};
use crate::device::DeviceCache;
use crate::error::DriverError;
use crate::host::ControlHost;
use crate::interface::{GpioBank, I2cBus, Interface, Uart};
use crate::value::Value;

/// A constructed driver bound to one control
pub trait Driver: Send + Sync {
    /// Read the control's raw value
    fn get(&self, host: &dyn ControlHost) -> Result<Value, DriverError>;

    /// Apply a resolved value to the hardware
    fn set(&self, host: &dyn ControlHost, value: &Value) -> Result<(), DriverError>;
}

/// Everything a factory needs to build a driver
pub struct DriverContext<'a> {
    /// Control name (for logging)
    pub name: &'a str,
    pub params: Arc<ParamSet>,
    /// 1-based pool index, `None` for drivers bound to the dispatcher
    pub interface_index: Option<usize>,
    pub interface: Option<Interface>,
    pub devices: &'a DeviceCache,
}

impl DriverContext<'_> {
    /// `subtype` param of a multi-behavior driver
    pub fn subtype(&self) -> Result<&str, DriverError> {
        self.params.get("subtype").ok_or(DriverError::MissingSubtype)
    }

    /// Pool index, required by drivers that share devices
    pub fn index(&self) -> Result<usize, DriverError> {
        self.interface_index.ok_or(DriverError::WrongInterface {
            index: 0,
            expected: "numbered",
        })
    }

    pub fn gpio(&self) -> Result<Arc<dyn GpioBank>, DriverError> {
        match &self.interface {
            Some(Interface::Gpio(g)) => Ok(g.clone()),
            _ => Err(self.wrong("gpio")),
        }
    }

    pub fn i2c(&self) -> Result<Arc<dyn I2cBus>, DriverError> {
        match &self.interface {
            Some(Interface::I2c(i)) => Ok(i.clone()),
            _ => Err(self.wrong("i2c")),
        }
    }

    pub fn uart(&self) -> Result<Arc<dyn Uart>, DriverError> {
        match &self.interface {
            Some(Interface::Uart(u)) => Ok(u.clone()),
            _ => Err(self.wrong("uart")),
        }
    }

    fn wrong(&self, expected: &'static str) -> DriverError {
        DriverError::WrongInterface {
            index: self.interface_index.unwrap_or(0),
            expected,
        }
    }
}

/// Error for an operation a driver or subtype doesn't offer
pub fn unsupported(op: Direction, what: impl Into<String>) -> DriverError {
    DriverError::Unsupported { op, what: what.into() }
}

/// Constructor registered for a `drv` name
pub type DriverFactory = fn(&DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError>;

/// Registry entry
#[derive(Clone, Copy)]
pub struct DriverEntry {
    pub factory: DriverFactory,
    /// The driver takes its set value as verbatim text (state names)
    pub text_input: bool,
}

/// Map from `drv` name to constructor, fixed before the dispatcher starts
#[derive(Clone, Default)]
pub struct DriverRegistry {
    entries: BTreeMap<String, DriverEntry>,
}

impl DriverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in driver
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("gpio", gpio::build);
        registry.register("tca6416", tca6416::build);
        registry.register("ina219", ina2xx::build_ina219);
        registry.register("ina231", ina2xx::build_ina231);
        registry.register("m24c02", m24c02::build);
        registry.register("uart", uart::build);
        registry.register("na", misc::build_na);
        registry.register("sleep", misc::build_sleep);
        for (name, factory) in crate::power::factories() {
            registry.register_text(name, factory);
        }
        registry.register_text("fw_wp_servoflex", crate::wp::build_servoflex);
        registry.register_text("fw_wp_ccd", crate::wp::build_ccd);
        registry
    }

    /// Register a driver taking resolved values
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) {
        self.insert(name.into(), factory, false);
    }

    /// Register a driver taking verbatim text
    pub fn register_text(&mut self, name: impl Into<String>, factory: DriverFactory) {
        self.insert(name.into(), factory, true);
    }

    fn insert(&mut self, name: String, factory: DriverFactory, text_input: bool) {
        if self
            .entries
            .insert(name.clone(), DriverEntry { factory, text_input })
            .is_some()
        {
            log::warn!("Driver '{}' registered twice, keeping the later one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&DriverEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

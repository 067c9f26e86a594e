//! Shared device cache
//!
//! Several controls usually address the same physical chip: an INA219 has
//! separate millivolt, milliamp and milliwatt controls, a TCA6416 expander
//! carries a dozen GPIO controls. Each control gets its own driver instance,
//! but protocol state that the chip itself keeps (the register pointer,
//! a calibration value, an EEPROM cursor, console response patterns) must be
//! tracked once per chip.
//!
//! The [`DeviceCache`] hands out one object per [`DeviceKey`], creating it on
//! first request. Check-and-insert happens under a single lock, so two
//! drivers racing to create the same device always end up sharing one.

mod console;
mod eeprom;
mod i2c_reg;

pub use console::{Captures, Console, DEFAULT_TIMEOUT};
pub use eeprom::EepromCursor;
pub use i2c_reg::{check_address, I2cRegDevice, RegSession, RegisterLayout, MAX_ADDR, MIN_ADDR};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::DriverError;

/// Protocol a shared device speaks, part of its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceShape {
    /// Register-indexed I2C device
    Register,
    /// Byte-addressed EEPROM cursor
    Eeprom,
    /// UART console command state
    Console,
}

/// Identity of one physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    /// 1-based interface pool index
    pub interface: usize,
    /// Bus address on that interface
    pub address: u16,
    pub shape: DeviceShape,
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interface {} address 0x{:02x} ({:?})",
            self.interface, self.address, self.shape
        )
    }
}

type SharedDevice = Arc<dyn Any + Send + Sync>;

/// Registry of live shared devices, owned by the dispatcher
#[derive(Default)]
pub struct DeviceCache {
    devices: Mutex<HashMap<DeviceKey, SharedDevice>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the device for `key`, creating it with `init` if absent
    pub fn get_or_create<T, F>(&self, key: DeviceKey, init: F) -> Result<Arc<T>, DriverError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, DriverError>,
    {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = devices.get(&key) {
            log::trace!("Reusing shared device {}", key);
            return existing
                .clone()
                .downcast::<T>()
                .map_err(|_| DriverError::Device(format!("{} already in use as another device type", key)));
        }

        let device = Arc::new(init()?);
        log::debug!("Created shared device {}", key);
        devices.insert(key, device.clone());
        Ok(device)
    }

    /// Number of live devices
    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCache").field("devices", &self.len()).finish()
    }
}

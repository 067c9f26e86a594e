//! Register-indexed I2C devices
//!
//! Most I2C peripherals expose a bank of registers selected by a one-byte
//! index written at the start of each transaction. Many of them also keep
//! the last index internally, so when the next access targets the same
//! register the index byte can be left out.
//!
//! [`I2cRegDevice`] tracks that index per chip. Any failed transaction
//! forgets it, so the following access always re-addresses explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use super::{DeviceCache, DeviceKey, DeviceShape};
use crate::error::{DriverError, ValueError};
use crate::interface::I2cBus;

/// Lowest valid 7-bit device address
pub const MIN_ADDR: u8 = 0x08;
/// Highest valid 7-bit device address
pub const MAX_ADDR: u8 = 0x77;

/// Validate a 7-bit I2C device address
pub fn check_address(addr: i64) -> Result<u8, DriverError> {
    match u8::try_from(addr) {
        Ok(a) if (MIN_ADDR..=MAX_ADDR).contains(&a) => Ok(a),
        _ => Err(DriverError::InvalidParam {
            key: "slv",
            value: format!("0x{:x} (must be within 0x{:02x}..=0x{:02x})", addr, MIN_ADDR, MAX_ADDR),
        }),
    }
}

/// Register geometry and access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterLayout {
    /// Register width in bytes (1..=8)
    pub reg_len: usize,
    /// Most significant byte travels first
    pub msb_first: bool,
    /// Skip reading the register back after a write
    pub no_read: bool,
    /// Omit the index byte when the device already points at the register
    pub use_reg_cache: bool,
}

impl RegisterLayout {
    pub fn new(reg_len: usize) -> Self {
        Self {
            reg_len: reg_len.clamp(1, 8),
            msb_first: true,
            no_read: false,
            use_reg_cache: false,
        }
    }

    pub fn with_msb_first(mut self, msb_first: bool) -> Self {
        self.msb_first = msb_first;
        self
    }

    pub fn with_no_read(mut self, no_read: bool) -> Self {
        self.no_read = no_read;
        self
    }

    pub fn with_reg_cache(mut self, use_reg_cache: bool) -> Self {
        self.use_reg_cache = use_reg_cache;
        self
    }

    /// Split `value` into register bytes in wire order
    pub fn pack(&self, value: u64) -> Result<Vec<u8>, ValueError> {
        if self.reg_len < 8 && value >> (self.reg_len * 8) != 0 {
            return Err(ValueError::RegisterOverflow {
                value,
                bytes: self.reg_len,
            });
        }
        let mut bytes: Vec<u8> = (0..self.reg_len).map(|i| (value >> (i * 8)) as u8).collect();
        if self.msb_first {
            bytes.reverse();
        }
        Ok(bytes)
    }

    /// Join wire-order bytes into a value
    pub fn unpack(&self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        if self.msb_first {
            bytes.iter().fold(0, fold)
        } else {
            bytes.iter().rev().fold(0, fold)
        }
    }
}

#[derive(Debug, Default)]
struct RegState {
    last_reg: Option<u8>,
    calibration: Option<u64>,
}

/// One register-indexed chip on an I2C bus
pub struct I2cRegDevice {
    bus: Arc<dyn I2cBus>,
    addr: u8,
    layout: RegisterLayout,
    state: Mutex<RegState>,
}

impl I2cRegDevice {
    pub fn new(bus: Arc<dyn I2cBus>, addr: u8, layout: RegisterLayout) -> Self {
        Self {
            bus,
            addr,
            layout,
            state: Mutex::new(RegState::default()),
        }
    }

    /// Shared instance for `(interface, addr)` from the cache
    ///
    /// The register pointer belongs to the chip, so every control of one
    /// address must agree on the layout.
    pub fn open(
        cache: &DeviceCache,
        interface: usize,
        bus: Arc<dyn I2cBus>,
        addr: u8,
        layout: RegisterLayout,
    ) -> Result<Arc<Self>, DriverError> {
        let key = DeviceKey {
            interface,
            address: u16::from(addr),
            shape: DeviceShape::Register,
        };
        let dev = cache.get_or_create(key, || Ok(Self::new(bus, addr, layout)))?;
        if dev.layout != layout {
            return Err(DriverError::Device(format!(
                "{} already in use with layout {:?}, not {:?}",
                key, dev.layout, layout
            )));
        }
        Ok(dev)
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    /// Register the device believes it points at, if known
    pub fn last_register(&self) -> Option<u8> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_reg
    }

    /// Run several accesses under the device lock
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut RegSession<'_>) -> Result<R, DriverError>,
    ) -> Result<R, DriverError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = RegSession {
            dev: self,
            state: &mut state,
        };
        f(&mut session)
    }

    pub fn read_register(&self, idx: u8) -> Result<u64, DriverError> {
        self.transaction(|s| s.read(idx))
    }

    /// Write a register, returning the read-back value unless `no_read`
    pub fn write_register(&self, idx: u8, value: u64) -> Result<Option<u64>, DriverError> {
        self.transaction(|s| s.write(idx, value))
    }
}

/// Exclusive access to one device for the duration of a transaction
pub struct RegSession<'a> {
    dev: &'a I2cRegDevice,
    state: &'a mut RegState,
}

impl RegSession<'_> {
    pub fn read(&mut self, idx: u8) -> Result<u64, DriverError> {
        let layout = self.dev.layout;
        let bytes = self.wr_rd(idx, &[], layout.reg_len)?;
        let value = layout.unpack(&bytes);
        log::trace!("i2c 0x{:02x} reg {} -> 0x{:x}", self.dev.addr, idx, value);
        Ok(value)
    }

    pub fn write(&mut self, idx: u8, value: u64) -> Result<Option<u64>, DriverError> {
        let layout = self.dev.layout;
        let data = layout.pack(value)?;
        let read_len = if layout.no_read { 0 } else { layout.reg_len };
        log::trace!("i2c 0x{:02x} reg {} <- 0x{:x}", self.dev.addr, idx, value);
        let bytes = self.wr_rd(idx, &data, read_len)?;
        Ok((!layout.no_read).then(|| layout.unpack(&bytes)))
    }

    /// Calibration value shared by every control of the chip
    pub fn calibration(&self) -> Option<u64> {
        self.state.calibration
    }

    pub fn set_calibration(&mut self, value: Option<u64>) {
        self.state.calibration = value;
    }

    fn wr_rd(&mut self, idx: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>, DriverError> {
        let mut wbuf = Vec::with_capacity(data.len() + 1);
        if self.dev.layout.use_reg_cache && self.state.last_reg == Some(idx) {
            log::trace!("i2c 0x{:02x} reg {} index cached", self.dev.addr, idx);
        } else {
            wbuf.push(idx);
        }
        wbuf.extend_from_slice(data);

        match self.dev.bus.wr_rd(self.dev.addr, &wbuf, read_len) {
            Ok(bytes) => {
                self.state.last_reg = Some(idx);
                Ok(bytes)
            }
            Err(e) => {
                self.state.last_reg = None;
                Err(e.into())
            }
        }
    }
}

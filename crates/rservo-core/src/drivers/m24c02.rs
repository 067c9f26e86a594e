//! `drv = "m24c02"`: ST M24C02 2 Kbit EEPROM
//!
//! Two controls cooperate per EEPROM. `rom_params` takes `"offset;count"` and
//! moves the shared window, `data` reads the window or writes text starting
//! at its offset.

use std::sync::Arc;

use super::{unsupported, Driver, DriverContext};
use crate::config::Direction;
use crate::device::{check_address, DeviceKey, DeviceShape, EepromCursor};
use crate::error::DriverError;
use crate::host::ControlHost;
use crate::interface::I2cBus;
use crate::value::Value;

/// Device size in bytes
pub const EEPROM_SIZE: usize = 256;
/// Addresses selectable with the E0..E2 pins
pub const SUPPORTED_ADDRESSES: std::ops::RangeInclusive<u8> = 0x50..=0x57;

const USAGE: &str = "set rom_params to \"offset;count\" first, then read or write data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtype {
    RomParams,
    Data,
}

pub struct M24c02 {
    bus: Arc<dyn I2cBus>,
    addr: u8,
    cursor: Arc<EepromCursor>,
    subtype: Subtype,
}

pub(crate) fn build(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let addr = check_address(ctx.params.require_int("slv")?)?;
    if !SUPPORTED_ADDRESSES.contains(&addr) {
        return Err(DriverError::InvalidParam {
            key: "slv",
            value: format!("0x{:02x} (M24C02 answers at 0x50..=0x57)", addr),
        });
    }
    let subtype = match ctx.subtype()? {
        "rom_params" => Subtype::RomParams,
        "data" => Subtype::Data,
        other => {
            return Err(DriverError::UnknownSubtype {
                driver: "m24c02",
                subtype: other.to_string(),
            })
        }
    };

    let key = DeviceKey {
        interface: ctx.index()?,
        address: u16::from(addr),
        shape: DeviceShape::Eeprom,
    };
    let cursor = ctx.devices.get_or_create(key, || Ok(EepromCursor::new(EEPROM_SIZE)))?;

    Ok(Box::new(M24c02 {
        bus: ctx.i2c()?,
        addr,
        cursor,
        subtype,
    }))
}

impl M24c02 {
    fn read_window(&self) -> Result<Vec<u8>, DriverError> {
        self.cursor.with_window(|offset, count| {
            (offset..offset + count)
                .map(|a| -> Result<u8, DriverError> {
                    let byte = self.bus.wr_rd(self.addr, &[a as u8], 1)?;
                    Ok(byte.first().copied().unwrap_or(0))
                })
                .collect()
        })
    }

    fn write_text(&self, text: &str) -> Result<(), DriverError> {
        let bytes = text.as_bytes();
        self.cursor.with_window(|offset, _| {
            let end = offset.saturating_add(bytes.len());
            if end > self.cursor.size() {
                return Err(DriverError::Device(format!("Boundary({}) error: {}", end, USAGE)));
            }
            for (i, b) in bytes.iter().enumerate() {
                self.bus.wr_rd(self.addr, &[(offset + i) as u8, *b], 0)?;
            }
            log::debug!("0x{:02x}: wrote {} bytes at {}", self.addr, bytes.len(), offset);
            Ok(())
        })
    }
}

fn parse_window(text: &str) -> Result<(usize, usize), DriverError> {
    let bad = || DriverError::Device(format!("Bad window '{}': {}", text, USAGE));
    let (offset, count) = text.split_once(';').ok_or_else(bad)?;
    let offset = offset.trim().parse().map_err(|_| bad())?;
    let count = count.trim().parse().map_err(|_| bad())?;
    Ok((offset, count))
}

impl Driver for M24c02 {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        match self.subtype {
            Subtype::RomParams => {
                let (offset, count) = self.cursor.window();
                Ok(Value::Str(format!("0x{:02x};{};{}", self.addr, offset, count)))
            }
            Subtype::Data => {
                let bytes = self.read_window()?;
                let hex: Vec<String> = bytes.iter().map(|b| format!("0x{:02x}", b)).collect();
                Ok(Value::Str(hex.join(" ")))
            }
        }
    }

    fn set(&self, _host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let Value::Str(text) = value else {
            return Err(unsupported(Direction::Set, "m24c02 with a numeric value (use input_type = \"str\")"));
        };
        match self.subtype {
            Subtype::RomParams => {
                let (offset, count) = parse_window(text)?;
                self.cursor.set_window(offset, count)
            }
            Subtype::Data => self.write_text(text),
        }
    }
}

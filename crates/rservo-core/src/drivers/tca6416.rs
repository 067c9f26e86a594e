//! `drv = "tca6416"`: 16-bit I2C GPIO expander
//!
//! Two 8-bit ports, each with input, output, polarity and direction
//! registers. A direction bit of 0 makes the line an output.
//!
//! With `io_type = "PU"` the line is emulated as open drain: driving it high
//! turns it into an input and lets the external pull-up do the work.

use std::sync::Arc;

use super::{Driver, DriverContext};
use crate::codec::BitField;
use crate::device::{check_address, I2cRegDevice, RegisterLayout};
use crate::error::DriverError;
use crate::host::ControlHost;
use crate::value::Value;

pub const REG_INP: u8 = 0;
pub const REG_OUT: u8 = 2;
pub const REG_POL: u8 = 4;
pub const REG_DIR: u8 = 6;

pub struct Tca6416 {
    dev: Arc<I2cRegDevice>,
    port: u8,
    field: BitField,
    pull_up: bool,
}

pub(crate) fn build(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let params = &ctx.params;
    let addr = check_address(params.require_int("slv")?)?;
    let port = params.require_int("port")?;
    if port & 1 != port {
        return Err(DriverError::InvalidParam {
            key: "port",
            value: format!("{} (must be 0 or 1)", port),
        });
    }
    let field = BitField::from_params(params)?.ok_or(DriverError::MissingParam("offset"))?;
    if field.offset() + field.width() > 8 {
        return Err(DriverError::InvalidParam {
            key: "offset",
            value: format!("{} (field must fit an 8-bit port)", field.offset()),
        });
    }
    let pull_up = match params.get("io_type") {
        None => false,
        Some("PU") => true,
        Some(other) => {
            return Err(DriverError::InvalidParam {
                key: "io_type",
                value: other.to_string(),
            })
        }
    };
    if pull_up && field.width() != 1 {
        return Err(DriverError::Device(
            "Open drain emulation needs a 1-bit field".to_string(),
        ));
    }

    let dev = I2cRegDevice::open(ctx.devices, ctx.index()?, ctx.i2c()?, addr, RegisterLayout::new(1))?;
    Ok(Box::new(Tca6416 {
        dev,
        port: port as u8,
        field,
        pull_up,
    }))
}

impl Driver for Tca6416 {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        let inp = self.dev.read_register(REG_INP + self.port)?;
        Ok(Value::try_from(self.field.decode(inp))?)
    }

    fn set(&self, _host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let logical = value.as_u64()?;
        let mask = self.field.mask();
        let to_input = self.pull_up && logical == 1;

        self.dev.transaction(|s| {
            if to_input {
                log::debug!("0x{:02x}: line set as input for pull-up", self.dev.addr());
            } else {
                let out = s.read(REG_OUT + self.port)?;
                let new_out = self.field.merge(out, logical)?;
                if new_out != out {
                    s.write(REG_OUT + self.port, new_out)?;
                }
            }

            let dir = s.read(REG_DIR + self.port)?;
            let new_dir = if to_input { dir | mask } else { dir & !mask };
            if new_dir != dir {
                s.write(REG_DIR + self.port, new_dir)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamSet;
    use crate::device::DeviceCache;
    use crate::interface::Interface;
    use crate::testing::{FakeI2c, RecordingHost};

    const ADDR: u8 = 0x20;

    fn driver(bus: &Arc<FakeI2c>, cache: &DeviceCache, extra: &[(&str, &str)]) -> Box<dyn Driver> {
        let mut params = ParamSet::from_pairs([("slv", "0x20"), ("port", "1"), ("offset", "3")]);
        for (k, v) in extra {
            params.insert(*k, *v);
        }
        let ctx = DriverContext {
            name: "expander_line",
            params: Arc::new(params),
            interface_index: Some(2),
            interface: Some(Interface::I2c(bus.clone())),
            devices: cache,
        };
        build(&ctx).unwrap()
    }

    #[test]
    fn test_set_drives_output() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_OUT + 1, 1, 0x01);
        bus.set_register(ADDR, REG_DIR + 1, 1, 0xff);
        let cache = DeviceCache::new();
        let line = driver(&bus, &cache, &[]);

        line.set(&RecordingHost::new(), &Value::Int(1)).unwrap();
        assert_eq!(bus.register(ADDR, REG_OUT + 1), 0x09);
        assert_eq!(bus.register(ADDR, REG_DIR + 1), 0xf7);
    }

    #[test]
    fn test_pull_up_high_becomes_input() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_OUT + 1, 1, 0x00);
        bus.set_register(ADDR, REG_DIR + 1, 1, 0x00);
        let cache = DeviceCache::new();
        let line = driver(&bus, &cache, &[("io_type", "PU")]);

        line.set(&RecordingHost::new(), &Value::Int(1)).unwrap();
        assert_eq!(bus.register(ADDR, REG_OUT + 1), 0x00);
        assert_eq!(bus.register(ADDR, REG_DIR + 1), 0x08);

        line.set(&RecordingHost::new(), &Value::Int(0)).unwrap();
        assert_eq!(bus.register(ADDR, REG_DIR + 1), 0x00);
    }

    #[test]
    fn test_get_reads_input_register() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_INP + 1, 1, 0x08);
        let cache = DeviceCache::new();
        let line = driver(&bus, &cache, &[]);
        assert_eq!(line.get(&RecordingHost::new()).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_lines_share_one_device() {
        let bus = Arc::new(FakeI2c::new());
        let cache = DeviceCache::new();
        let _a = driver(&bus, &cache, &[]);
        let _b = driver(&bus, &cache, &[("offset", "4")]);
        assert_eq!(cache.len(), 1);
    }
}

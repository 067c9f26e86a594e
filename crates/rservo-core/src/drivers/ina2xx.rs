//! `drv = "ina219"` / `"ina231"`: TI current/power monitor ADCs
//!
//! Every control of one ADC (bus millivolts, milliamps, milliwatts, raw
//! registers) shares one [`I2cRegDevice`], so the calibration register value
//! found by one control is what the others scale by.
//!
//! Current and power readings are only meaningful once the calibration
//! register is set and the math hasn't overflowed. Reading them runs the
//! calibration loop first: start at the finest resolution and halve the
//! calibration value until the OVF flag stays clear.

use std::sync::Arc;

use super::{unsupported, Driver, DriverContext};
use crate::config::Direction;
use crate::device::{check_address, I2cRegDevice, RegSession, RegisterLayout};
use crate::error::DriverError;
use crate::host::ControlHost;
use crate::value::{parse_int, Value};

pub const REG_CFG: u8 = 0;
pub const REG_SHV: u8 = 1;
pub const REG_BUSV: u8 = 2;
pub const REG_PWR: u8 = 3;
pub const REG_CUR: u8 = 4;
pub const REG_CAL: u8 = 5;

/// Highest calibration value (bit 0 is unused)
pub const MAX_CALIB: u64 = 0xfffe;
/// Coarsest calibration tried before giving up
pub const MIN_CALIB: u64 = 0x0002;
/// Polls of the conversion-ready flag
pub const BUSV_READ_RETRY: usize = 100;
/// Saturated current register
pub const CUR_MAX: u64 = 0x7fff;
/// Saturated power register
pub const PWR_MAX: u64 = 0xffff;
/// Current LSB in mA is this over (calibration * rsense)
pub const CUR_LSB_COEFFICIENT: f64 = 40.96;
/// Power LSB is this times the current LSB
pub const PWR_LSB_COEFFICIENT: f64 = 20.0;

const REG_NAMES: [(&str, u8); 8] = [
    ("cfg", 0),
    ("shv", 1),
    ("busv", 2),
    ("pwr", 3),
    ("cur", 4),
    ("cal", 5),
    ("msken", 6),
    ("alrt", 7),
];

/// Per-part constants
#[derive(Debug, Clone, Copy)]
pub struct InaModel {
    pub name: &'static str,
    pub busv_mv_per_lsb: f64,
    /// Right shift of the bus voltage register before scaling
    pub busv_mv_offset: u32,
    pub busv_max_mv: f64,
    pub shv_uv_per_lsb: f64,
    pub max_reg: u8,
    /// Conversion-ready and overflow flags live in the bus voltage register
    pub flags_in_busv: bool,
    /// The part keeps its register pointer between transactions
    pub reg_cache: bool,
}

impl InaModel {
    pub fn layout(&self) -> RegisterLayout {
        RegisterLayout::new(2).with_reg_cache(self.reg_cache)
    }
}

pub const INA219: InaModel = InaModel {
    name: "ina219",
    busv_mv_per_lsb: 4.0,
    busv_mv_offset: 3,
    busv_max_mv: 32000.0,
    shv_uv_per_lsb: 10.0,
    max_reg: 5,
    flags_in_busv: true,
    reg_cache: true,
};

pub const INA231: InaModel = InaModel {
    name: "ina231",
    busv_mv_per_lsb: 1.25,
    busv_mv_offset: 0,
    busv_max_mv: 28000.0,
    shv_uv_per_lsb: 2.5,
    max_reg: 7,
    flags_in_busv: false,
    reg_cache: false,
};

const BUSV_CNVR: u64 = 0x2;
const BUSV_OVF: u64 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtype {
    Millivolts,
    Milliamps,
    Milliwatts,
    ShuntMv,
    ReadReg(u8),
    WriteReg(u8),
}

pub struct Ina2xx {
    dev: Arc<I2cRegDevice>,
    model: InaModel,
    subtype: Subtype,
    rsense: Option<f64>,
}

pub(crate) fn build_ina219(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    build(ctx, INA219)
}

pub(crate) fn build_ina231(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    build(ctx, INA231)
}

fn build(ctx: &DriverContext<'_>, model: InaModel) -> Result<Box<dyn Driver>, DriverError> {
    let params = &ctx.params;
    let addr = check_address(params.require_int("slv")?)?;

    let subtype = match ctx.subtype()? {
        "millivolts" => Subtype::Millivolts,
        "milliamps" => Subtype::Milliamps,
        "milliwatts" => Subtype::Milliwatts,
        "shuntmv" => Subtype::ShuntMv,
        "readreg" => Subtype::ReadReg(register_param(params.require("reg")?, model)?),
        "writereg" => Subtype::WriteReg(register_param(params.require("reg")?, model)?),
        other => {
            return Err(DriverError::UnknownSubtype {
                driver: model.name,
                subtype: other.to_string(),
            })
        }
    };

    let rsense = params.float_param("rsense")?;
    if rsense.is_none() && matches!(subtype, Subtype::Milliamps | Subtype::Milliwatts) {
        return Err(DriverError::MissingParam("rsense"));
    }
    if rsense.is_some_and(|r| r <= 0.0) {
        return Err(DriverError::InvalidParam {
            key: "rsense",
            value: params.get("rsense").unwrap_or_default().to_string(),
        });
    }

    let dev = I2cRegDevice::open(ctx.devices, ctx.index()?, ctx.i2c()?, addr, model.layout())?;
    Ok(Box::new(Ina2xx {
        dev,
        model,
        subtype,
        rsense,
    }))
}

/// Register by name (`cal`) or index (`5`)
fn register_param(raw: &str, model: InaModel) -> Result<u8, DriverError> {
    let idx = REG_NAMES
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, idx)| i64::from(*idx))
        .or_else(|| parse_int(raw));
    match idx {
        Some(i) if (0..=i64::from(model.max_reg)).contains(&i) => Ok(i as u8),
        _ => Err(DriverError::InvalidParam {
            key: "reg",
            value: format!("{} (register out of range for {})", raw, model.name),
        }),
    }
}

impl Ina2xx {
    fn millivolts(&self) -> Result<Value, DriverError> {
        let busv = self.dev.read_register(REG_BUSV)?;
        let mv = (busv >> self.model.busv_mv_offset) as f64 * self.model.busv_mv_per_lsb;
        if mv >= self.model.busv_max_mv {
            log::error!("bus voltage measurement exceeded maximum {}", mv);
            return Err(DriverError::Device(format!(
                "Bus voltage {} mV exceeds maximum {} mV",
                mv, self.model.busv_max_mv
            )));
        }
        Ok(if mv.fract() == 0.0 {
            Value::Int(mv as i64)
        } else {
            Value::Float(mv)
        })
    }

    fn shunt_millivolts(&self) -> Result<f64, DriverError> {
        let raw = self.dev.read_register(REG_SHV)? as u16 as i16;
        log::debug!("shv = 0x{:04x}", raw);
        if raw.unsigned_abs() >= 0x7fff {
            return Err(DriverError::Device(format!("Shunt voltage overflow 0x{:04x}", raw)));
        }
        Ok(f64::from(raw) * self.model.shv_uv_per_lsb / 1000.0)
    }

    fn rsense(&self) -> Result<f64, DriverError> {
        self.rsense.ok_or(DriverError::MissingParam("rsense"))
    }

    fn milliamps(&self) -> Result<f64, DriverError> {
        self.require_flags(Direction::Get, "milliamps")?;
        let rsense = self.rsense()?;
        self.dev.transaction(|s| {
            let cal = self.calibrate(s)?;
            let lsb = CUR_LSB_COEFFICIENT / (cal as f64 * rsense);
            let raw = s.read(REG_CUR)?;
            if raw == CUR_MAX {
                log::error!("current saturated 0x{:x}", raw);
                return Err(DriverError::Device("Current register saturated".to_string()));
            }
            Ok(f64::from(raw as u16 as i16) * lsb)
        })
    }

    fn milliwatts(&self) -> Result<f64, DriverError> {
        self.require_flags(Direction::Get, "milliwatts")?;
        let rsense = self.rsense()?;
        self.dev.transaction(|s| {
            let cal = self.calibrate(s)?;
            let lsb = PWR_LSB_COEFFICIENT * CUR_LSB_COEFFICIENT / (cal as f64 * rsense);
            let raw = s.read(REG_PWR)?;
            if raw == PWR_MAX {
                log::error!("power saturated 0x{:x}", raw);
                return Err(DriverError::Device("Power register saturated".to_string()));
            }
            if raw & 0x8000 != 0 {
                log::warn!("power may be signed: 0x{:x}", raw);
            }
            Ok(f64::from(raw as u16 as i16) * lsb)
        })
    }

    fn require_flags(&self, op: Direction, what: &str) -> Result<(), DriverError> {
        if self.model.flags_in_busv {
            Ok(())
        } else {
            Err(unsupported(op, format!("{} {}", self.model.name, what)))
        }
    }

    /// Settle on the finest calibration that doesn't overflow
    fn calibrate(&self, s: &mut RegSession<'_>) -> Result<u64, DriverError> {
        let mut cal = s.read(REG_CAL)?;
        let mut ovf = if cal == 0 {
            log::debug!("0x{:02x}: uncalibrated, starting at 0x{:04x}", self.dev.addr(), MAX_CALIB);
            s.write(REG_CAL, MAX_CALIB)?;
            cal = MAX_CALIB;
            next_overflow(s)?
        } else {
            s.read(REG_BUSV)? & BUSV_OVF != 0
        };

        while ovf {
            if cal <= MIN_CALIB {
                s.set_calibration(None);
                return Err(DriverError::Calibration(format!(
                    "overflow persists at calibration 0x{:04x}",
                    cal
                )));
            }
            cal = (cal >> 1) & MAX_CALIB;
            log::debug!("writing calibrate to 0x{:04x}", cal);
            s.write(REG_CAL, cal)?;
            ovf = next_overflow(s)?;
        }
        s.set_calibration(Some(cal));
        Ok(cal)
    }
}

/// Wait for a fresh conversion, then report its overflow flag
fn next_overflow(s: &mut RegSession<'_>) -> Result<bool, DriverError> {
    for _ in 0..BUSV_READ_RETRY {
        let busv = s.read(REG_BUSV)?;
        if busv & BUSV_CNVR != 0 {
            return Ok(busv & BUSV_OVF != 0);
        }
    }
    Err(DriverError::Calibration(
        "Failed to see conversion (CNVR) while calibrating".to_string(),
    ))
}

impl Driver for Ina2xx {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        match self.subtype {
            Subtype::Millivolts => self.millivolts(),
            Subtype::Milliamps => self.milliamps().map(Value::Float),
            Subtype::Milliwatts => self.milliwatts().map(Value::Float),
            Subtype::ShuntMv => self.shunt_millivolts().map(Value::Float),
            Subtype::ReadReg(reg) => Ok(Value::try_from(self.dev.read_register(reg)?)?),
            Subtype::WriteReg(_) => Err(unsupported(Direction::Get, format!("{} writereg", self.model.name))),
        }
    }

    fn set(&self, _host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let Subtype::WriteReg(reg) = self.subtype else {
            return Err(unsupported(
                Direction::Set,
                format!("{} {:?}", self.model.name, self.subtype).to_lowercase(),
            ));
        };
        let value = value.as_u64()?;
        self.dev.transaction(|s| {
            s.write(reg, value)?;
            if reg == REG_CAL {
                s.set_calibration(Some(value));
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

    const ADDR: u8 = 0x40;

    fn build_with(
        bus: &Arc<FakeI2c>,
        cache: &DeviceCache,
        model: InaModel,
        pairs: &[(&str, &str)],
    ) -> Result<Box<dyn Driver>, DriverError> {
        let mut params = ParamSet::from_pairs([("slv", "0x40")]);
        for (k, v) in pairs {
            params.insert(*k, *v);
        }
        let ctx = DriverContext {
            name: "ppvar_vbat",
            params: Arc::new(params),
            interface_index: Some(2),
            interface: Some(Interface::I2c(bus.clone())),
            devices: cache,
        };
        build(&ctx, model)
    }

    fn approx(value: Value, expected: f64) {
        match value {
            Value::Float(v) => assert!((v - expected).abs() < 1e-9, "{} != {}", v, expected),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_millivolts() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_BUSV, 2, (3000 << 3) | BUSV_CNVR);
        let cache = DeviceCache::new();
        let mv = build_with(&bus, &cache, INA219, &[("subtype", "millivolts")]).unwrap();
        assert_eq!(mv.get(&RecordingHost::new()).unwrap(), Value::Int(12000));

        let mv = build_with(&bus, &cache, INA231, &[("subtype", "millivolts"), ("slv", "0x41")]).unwrap();
        bus.set_register(0x41, REG_BUSV, 2, 3);
        assert_eq!(mv.get(&RecordingHost::new()).unwrap(), Value::Float(3.75));
    }

    #[test]
    fn test_subtype_errors() {
        let bus = Arc::new(FakeI2c::new());
        let cache = DeviceCache::new();
        assert!(matches!(
            build_with(&bus, &cache, INA219, &[]).err(),
            Some(DriverError::MissingSubtype)
        ));
        match build_with(&bus, &cache, INA219, &[("subtype", "furlongs")]).err() {
            Some(DriverError::UnknownSubtype { driver, subtype }) => {
                assert_eq!(driver, "ina219");
                assert_eq!(subtype, "furlongs");
            }
            _ => panic!("expected UnknownSubtype"),
        }
        assert!(matches!(
            build_with(&bus, &cache, INA219, &[("subtype", "milliamps")]).err(),
            Some(DriverError::MissingParam("rsense"))
        ));
    }

    #[test]
    fn test_milliamps_from_preset_calibration() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_CAL, 2, 0x1000);
        bus.set_register(ADDR, REG_BUSV, 2, BUSV_CNVR);
        bus.set_register(ADDR, REG_CUR, 2, 100);
        let cache = DeviceCache::new();
        let ma = build_with(&bus, &cache, INA219, &[("subtype", "milliamps"), ("rsense", "0.1")]).unwrap();
        approx(ma.get(&RecordingHost::new()).unwrap(), 10.0);

        bus.set_register(ADDR, REG_CUR, 2, 0xff9c);
        approx(ma.get(&RecordingHost::new()).unwrap(), -10.0);

        bus.set_register(ADDR, REG_CUR, 2, CUR_MAX);
        assert!(ma.get(&RecordingHost::new()).is_err());
    }

    #[test]
    fn test_uncalibrated_starts_at_max() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_BUSV, 2, BUSV_CNVR);
        let cache = DeviceCache::new();
        let mw = build_with(&bus, &cache, INA219, &[("subtype", "milliwatts"), ("rsense", "0.01")]).unwrap();
        mw.get(&RecordingHost::new()).unwrap();
        assert_eq!(bus.register(ADDR, REG_CAL), MAX_CALIB);
    }

    #[test]
    fn test_milliwatts_sign() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_CAL, 2, 0x1000);
        bus.set_register(ADDR, REG_BUSV, 2, BUSV_CNVR);
        bus.set_register(ADDR, REG_PWR, 2, 10);
        let cache = DeviceCache::new();
        let mw = build_with(&bus, &cache, INA219, &[("subtype", "milliwatts"), ("rsense", "0.1")]).unwrap();
        approx(mw.get(&RecordingHost::new()).unwrap(), 20.0);

        bus.set_register(ADDR, REG_PWR, 2, 0xfff6);
        approx(mw.get(&RecordingHost::new()).unwrap(), -20.0);

        bus.set_register(ADDR, REG_PWR, 2, PWR_MAX);
        assert!(mw.get(&RecordingHost::new()).is_err());
    }

    #[test]
    fn test_ina219_elides_repeated_index() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_BUSV, 2, (3000 << 3) | BUSV_CNVR);
        let cache = DeviceCache::new();
        let mv = build_with(&bus, &cache, INA219, &[("subtype", "millivolts")]).unwrap();
        let raw = build_with(&bus, &cache, INA219, &[("subtype", "readreg"), ("reg", "busv")]).unwrap();
        let host = RecordingHost::new();

        assert_eq!(mv.get(&host).unwrap(), Value::Int(12000));
        assert_eq!(raw.get(&host).unwrap(), Value::Int((3000 << 3) | BUSV_CNVR as i64));
        assert_eq!(bus.log(), vec![(ADDR, vec![REG_BUSV], 2), (ADDR, vec![], 2)]);

        // INA231 always sends the index
        let mv = build_with(&bus, &cache, INA231, &[("subtype", "millivolts"), ("slv", "0x41")]).unwrap();
        bus.clear_log();
        mv.get(&host).unwrap();
        mv.get(&host).unwrap();
        assert_eq!(bus.log(), vec![(0x41, vec![REG_BUSV], 2), (0x41, vec![REG_BUSV], 2)]);
    }

    #[test]
    fn test_persistent_overflow_fails() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_CAL, 2, 0x1000);
        bus.set_register(ADDR, REG_BUSV, 2, BUSV_CNVR | BUSV_OVF);
        let cache = DeviceCache::new();
        let ma = build_with(&bus, &cache, INA219, &[("subtype", "milliamps"), ("rsense", "0.1")]).unwrap();
        let err = ma.get(&RecordingHost::new()).unwrap_err();
        assert!(matches!(err, DriverError::Calibration(_)));
        assert_eq!(bus.register(ADDR, REG_CAL), MIN_CALIB);
    }

    #[test]
    fn test_missing_conversion_fails() {
        let bus = Arc::new(FakeI2c::new());
        let cache = DeviceCache::new();
        let ma = build_with(&bus, &cache, INA219, &[("subtype", "milliamps"), ("rsense", "0.1")]).unwrap();
        match ma.get(&RecordingHost::new()).unwrap_err() {
            DriverError::Calibration(msg) => assert!(msg.contains("CNVR")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ina231_current_unsupported() {
        let bus = Arc::new(FakeI2c::new());
        let cache = DeviceCache::new();
        let ma = build_with(&bus, &cache, INA231, &[("subtype", "milliamps"), ("rsense", "0.1")]).unwrap();
        assert!(matches!(
            ma.get(&RecordingHost::new()).unwrap_err(),
            DriverError::Unsupported { op: Direction::Get, .. }
        ));
    }

    #[test]
    fn test_shunt_millivolts() {
        let bus = Arc::new(FakeI2c::new());
        bus.set_register(ADDR, REG_SHV, 2, 0xfc18);
        let cache = DeviceCache::new();
        let shv = build_with(&bus, &cache, INA219, &[("subtype", "shuntmv")]).unwrap();
        approx(shv.get(&RecordingHost::new()).unwrap(), -10.0);
    }

    #[test]
    fn test_raw_registers_share_calibration() {
        let bus = Arc::new(FakeI2c::new());
        let cache = DeviceCache::new();
        let write = build_with(&bus, &cache, INA219, &[("subtype", "writereg"), ("reg", "cal")]).unwrap();
        let read = build_with(&bus, &cache, INA219, &[("subtype", "readreg"), ("reg", "5")]).unwrap();
        let host = RecordingHost::new();

        write.set(&host, &Value::Int(0x2000)).unwrap();
        assert_eq!(read.get(&host).unwrap(), Value::Int(0x2000));
        assert!(read.set(&host, &Value::Int(1)).is_err());
        assert!(write.get(&host).is_err());

        let dev = I2cRegDevice::open(&cache, 2, bus.clone(), ADDR, INA219.layout()).unwrap();
        assert_eq!(dev.transaction(|s| Ok(s.calibration())).unwrap(), Some(0x2000));

        assert!(build_with(&bus, &cache, INA219, &[("subtype", "readreg"), ("reg", "alrt")]).is_err());
        assert!(build_with(&bus, &cache, INA231, &[("subtype", "readreg"), ("reg", "alrt"), ("slv", "0x41")]).is_ok());
        assert!(matches!(
            build_with(&bus, &cache, INA231, &[("subtype", "readreg"), ("reg", "cfg")]).err(),
            Some(DriverError::Device(_))
        ));
    }
}

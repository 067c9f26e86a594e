//! `drv = "uart"`: console attached to a UART interface
//!
//! Subtypes:
//! - `pty`: pseudo-terminal path (get)
//! - `baudrate`: line speed (get/set)
//! - `regexp`: response patterns kept by the next `cmd` (get/set)
//! - `timeout`: seconds to wait for the patterns (get/set)
//! - `cmd`: send a command (set), last matched response (get)
//! - `multicmd`: send `;`-separated commands, ignoring output (set)

use std::sync::Arc;

use super::{unsupported, Driver, DriverContext};
use crate::config::Direction;
use crate::device::Console;
use crate::error::DriverError;
use crate::host::{secs, ControlHost};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtype {
    Pty,
    Baudrate,
    Regexp,
    Timeout,
    Cmd,
    MultiCmd,
}

pub struct UartDriver {
    console: Arc<Console>,
    subtype: Subtype,
}

pub(crate) fn build(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let subtype = match ctx.subtype()? {
        "pty" => Subtype::Pty,
        "baudrate" => Subtype::Baudrate,
        "regexp" => Subtype::Regexp,
        "timeout" => Subtype::Timeout,
        "cmd" => Subtype::Cmd,
        "multicmd" => Subtype::MultiCmd,
        other => {
            return Err(DriverError::UnknownSubtype {
                driver: "uart",
                subtype: other.to_string(),
            })
        }
    };
    let console = Console::open(ctx.devices, ctx.index()?, ctx.uart()?)?;
    Ok(Box::new(UartDriver { console, subtype }))
}

impl Driver for UartDriver {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        let uart = self.console.uart();
        match self.subtype {
            Subtype::Pty => Ok(Value::Str(uart.pty().unwrap_or_else(|| "None".to_string()))),
            Subtype::Baudrate => Ok(Value::Int(i64::from(uart.baudrate()?))),
            Subtype::Regexp => Ok(Value::Str(self.console.patterns())),
            Subtype::Timeout => Ok(Value::Float(self.console.timeout().as_secs_f64())),
            Subtype::Cmd => Ok(Value::Str(self.console.last_result())),
            Subtype::MultiCmd => Err(unsupported(Direction::Get, "uart multicmd")),
        }
    }

    fn set(&self, _host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let uart = self.console.uart();
        match self.subtype {
            Subtype::Pty => Err(unsupported(Direction::Set, "uart pty")),
            Subtype::Baudrate => {
                let baud = value.as_u64()?;
                let baud = u32::try_from(baud).map_err(|_| DriverError::InvalidParam {
                    key: "baudrate",
                    value: baud.to_string(),
                })?;
                log::info!("{}: baudrate {}", uart.name(), baud);
                uart.set_baudrate(baud)?;
                Ok(())
            }
            Subtype::Regexp => self.console.set_patterns(&value.to_string()),
            Subtype::Timeout => {
                self.console.set_timeout(secs(value.as_float()?)?);
                Ok(())
            }
            Subtype::Cmd => self.console.send(&value.to_string()),
            Subtype::MultiCmd => {
                for cmd in value.to_string().split(';') {
                    uart.exchange(cmd, std::time::Duration::ZERO)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamSet;
    use crate::device::DeviceCache;
    use crate::error::ValueError;
    use crate::interface::Interface;
    use crate::testing::{FakeUart, RecordingHost};

    fn driver(uart: &Arc<FakeUart>, cache: &DeviceCache, subtype: &str) -> Box<dyn Driver> {
        let ctx = DriverContext {
            name: "ec_uart",
            params: Arc::new(ParamSet::from_pairs([("subtype", subtype)])),
            interface_index: Some(3),
            interface: Some(Interface::Uart(uart.clone())),
            devices: cache,
        };
        build(&ctx).unwrap()
    }

    #[test]
    fn test_regexp_shared_with_cmd() {
        let uart = Arc::new(FakeUart::new());
        uart.respond("gettemp", "temp: 42\n");
        let cache = DeviceCache::new();
        let regexp = driver(&uart, &cache, "regexp");
        let cmd = driver(&uart, &cache, "cmd");
        let host = RecordingHost::new();

        assert_eq!(regexp.get(&host).unwrap(), Value::from("None"));
        regexp.set(&host, &Value::from(r"['temp: (\d+)']")).unwrap();
        cmd.set(&host, &Value::from("gettemp")).unwrap();
        assert_eq!(cmd.get(&host).unwrap(), Value::from(r#"[["temp: 42", "42"]]"#));

        regexp.set(&host, &Value::from("None")).unwrap();
        cmd.set(&host, &Value::from("gettemp")).unwrap();
        assert_eq!(cmd.get(&host).unwrap(), Value::from("None"));
        assert_eq!(uart.sent(), vec!["gettemp", "gettemp"]);
    }

    #[test]
    fn test_pty_and_baudrate() {
        let uart = Arc::new(FakeUart::new());
        let cache = DeviceCache::new();
        let host = RecordingHost::new();
        let pty = driver(&uart, &cache, "pty");
        assert_eq!(pty.get(&host).unwrap(), Value::from("/dev/pts/9"));
        assert!(pty.set(&host, &Value::from("x")).is_err());

        let baud = driver(&uart, &cache, "baudrate");
        baud.set(&host, &Value::Int(9600)).unwrap();
        assert_eq!(baud.get(&host).unwrap(), Value::Int(9600));
    }

    #[test]
    fn test_timeout_rejects_huge_values() {
        let uart = Arc::new(FakeUart::new());
        let cache = DeviceCache::new();
        let host = RecordingHost::new();
        let timeout = driver(&uart, &cache, "timeout");
        timeout.set(&host, &Value::from("0.5")).unwrap();

        for text in ["1e400", "inf", "1e20"] {
            let err = timeout.set(&host, &Value::from(text)).unwrap_err();
            assert!(matches!(err, DriverError::Value(ValueError::BadDelay(_))), "{}", text);
        }
        assert_eq!(timeout.get(&host).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_multicmd_splits() {
        let uart = Arc::new(FakeUart::new());
        let cache = DeviceCache::new();
        let multi = driver(&uart, &cache, "multicmd");
        multi.set(&RecordingHost::new(), &Value::from("a;b")).unwrap();
        assert_eq!(uart.sent(), vec!["a", "b"]);
    }
}

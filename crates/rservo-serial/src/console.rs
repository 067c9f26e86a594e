//! Serial port console implementation
//!
//! A command is written followed by a newline. Its output is whatever the
//! DUT prints afterwards, collected until the line goes quiet or the caller's
//! timeout expires, whichever comes first.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use rservo_core::error::BusError;
use rservo_core::interface::Uart;

use crate::error::{Result, SerialError};

/// Default baud rate of DUT consoles
pub const DEFAULT_BAUD: u32 = 115_200;

/// Poll interval of a single port read
const POLL: Duration = Duration::from_millis(10);

/// Output is complete once nothing has arrived for this long
pub const DEFAULT_QUIET: Duration = Duration::from_millis(100);

/// Configuration for opening a serial console
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0")
    pub device: String,
    pub baud: u32,
    /// Idle gap that ends a command's output
    pub quiet: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud: DEFAULT_BAUD,
            quiet: DEFAULT_QUIET,
        }
    }
}

impl SerialConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}

/// DUT console on a serial port
pub struct SerialConsole {
    device: String,
    quiet: Duration,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SerialConsole {
    /// Open a serial port as 8N1 without flow control
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(SerialError::InvalidParameter("no device given".into()));
        }

        let port = serialport::new(&config.device, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL)
            .open()
            .map_err(|source| SerialError::OpenFailed {
                path: config.device.clone(),
                source,
            })?;

        log::info!("Opened serial port {} at {} baud", config.device, config.baud);

        Ok(Self {
            device: config.device.clone(),
            quiet: config.quiet,
            port: Mutex::new(port),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn SerialPort>> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write `cmd` and gather the reply on a port whose reads time out quickly
///
/// A zero `timeout` sends the command without waiting for output.
pub fn converse<P: Read + Write + ?Sized>(
    port: &mut P,
    cmd: &str,
    timeout: Duration,
    quiet: Duration,
) -> std::io::Result<String> {
    port.write_all(cmd.as_bytes())?;
    port.write_all(b"\n")?;
    port.flush()?;

    let mut output = Vec::new();
    if timeout.is_zero() {
        return Ok(String::new());
    }

    let start = Instant::now();
    let mut last_data = start;
    let mut buf = [0u8; 256];
    while start.elapsed() < timeout {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                output.extend_from_slice(&buf[..n]);
                last_data = Instant::now();
                continue;
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        if !output.is_empty() && last_data.elapsed() >= quiet {
            break;
        }
        std::thread::sleep(POLL.min(timeout.saturating_sub(start.elapsed())));
    }

    Ok(String::from_utf8_lossy(&output).into_owned())
}

impl Uart for SerialConsole {
    fn name(&self) -> &str {
        &self.device
    }

    fn pty(&self) -> Option<String> {
        Some(self.device.clone())
    }

    fn baudrate(&self) -> std::result::Result<u32, BusError> {
        Ok(self.lock().baud_rate().map_err(SerialError::from)?)
    }

    fn set_baudrate(&self, baud: u32) -> std::result::Result<(), BusError> {
        if baud == 0 {
            return Err(SerialError::InvalidParameter("baudrate 0".into()).into());
        }
        self.lock().set_baud_rate(baud).map_err(SerialError::from)?;
        log::debug!("{}: baudrate now {}", self.device, baud);
        Ok(())
    }

    fn exchange(&self, cmd: &str, timeout: Duration) -> std::result::Result<String, BusError> {
        let mut port = self.lock();
        // Drop anything the DUT printed between commands
        port.clear(ClearBuffer::Input).map_err(SerialError::from)?;
        let output = converse(&mut **port, cmd, timeout, self.quiet).map_err(SerialError::from)?;
        log::trace!("{}: '{}' -> {:?}", self.device, cmd, output);
        Ok(output)
    }
}

/// Parse interface options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/ttyUSB0` - serial device path (required)
/// - `baud=115200` - line speed (default: 115200)
/// - `quiet=100` - idle gap in ms that ends a command's output
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<SerialConfig, String> {
    let mut config = SerialConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "baud" => {
                config.baud = value
                    .parse()
                    .ok()
                    .filter(|b| *b > 0)
                    .ok_or_else(|| format!("Invalid baud rate: {}", value))?;
            }
            "quiet" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid quiet value: {}", value))?;
                config.quiet = Duration::from_millis(ms);
            }
            _ => {
                log::warn!("serial: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        return Err("Missing required parameter: dev\n\
             Usage: serial:dev=/dev/ttyUSB0[,baud=115200]"
            .to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Port that answers from a fixed buffer, then times out
    struct ScriptedPort {
        reply: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedPort {
        fn new(reply: &str) -> Self {
            Self {
                reply: Cursor::new(reply.as_bytes().to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.reply.read(buf)? {
                0 => Err(ErrorKind::TimedOut.into()),
                n => Ok(n),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_converse_collects_output() {
        let mut port = ScriptedPort::new("version\r\nRO: servo_v4\r\n> ");
        let out = converse(&mut port, "version", Duration::from_secs(2), Duration::from_millis(20)).unwrap();
        assert_eq!(port.written, b"version\n");
        assert!(out.contains("RO: servo_v4"));
    }

    #[test]
    fn test_converse_zero_timeout_does_not_read() {
        let mut port = ScriptedPort::new("noise");
        let out = converse(&mut port, "apshutdown", Duration::ZERO, DEFAULT_QUIET).unwrap();
        assert_eq!(out, "");
        assert_eq!(port.reply.position(), 0);
    }

    #[test]
    fn test_converse_silent_port_waits_for_timeout() {
        let mut port = ScriptedPort::new("");
        let start = Instant::now();
        let out = converse(&mut port, "wp", Duration::from_millis(50), Duration::from_millis(10)).unwrap();
        assert_eq!(out, "");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/ttyUSB1"), ("baud", "9600")]).unwrap();
        assert_eq!(config.device, "/dev/ttyUSB1");
        assert_eq!(config.baud, 9600);
        assert_eq!(config.quiet, DEFAULT_QUIET);

        assert!(parse_options(&[("baud", "9600")]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyS0"), ("baud", "0")]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyS0"), ("quiet", "soon")]).is_err());
    }
}

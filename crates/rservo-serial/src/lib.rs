//! rservo-serial - DUT consoles on serial ports
//!
//! This crate exposes a serial port (`/dev/ttyUSB0`, `/dev/ttyACM0`, a pty
//! set up by another tool, etc.) as a [`Uart`](rservo_core::interface::Uart)
//! interface, so console-driven controls such as `ec_uart_cmd` or the EC
//! power sequences can reach a real board.
//!
//! # Usage with rservod
//!
//! ```bash
//! rservod -c servo.toml -i dummy -i serial:dev=/dev/ttyUSB0,baud=115200 set ec_uart_cmd:version
//! ```

pub mod console;
pub mod error;

pub use console::{converse, parse_options, SerialConfig, SerialConsole, DEFAULT_BAUD};
pub use error::{Result, SerialError};

use std::sync::Arc;

use rservo_core::interface::Interface;

/// Open a serial console as a pool interface
///
/// # Example Options
///
/// - `dev=/dev/ttyUSB0` - Required: device path
/// - `baud=115200` - Optional: line speed
pub fn open_serial(options: &[(&str, &str)]) -> std::result::Result<Interface, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let console = SerialConsole::open(&config)?;
    Ok(Interface::Uart(Arc::new(console)))
}

//! rservo-linux-i2c - Linux i2c-dev support
//!
//! This crate exposes a Linux I2C adapter (`/dev/i2c-N`) as an
//! [`I2cBus`](rservo_core::interface::I2cBus). Every `wr_rd` call becomes a
//! single `I2C_RDWR` ioctl, so a register write followed by a read goes out
//! as one repeated-start transaction.
//!
//! # Usage with rservod
//!
//! ```bash
//! # Use adapter 1 as interface 2
//! rservod -c servo.toml -i dummy_gpio -i linux_i2c:dev=/dev/i2c-1 get ppvar_vbus_mv
//!
//! # Same, by adapter number
//! rservod -c servo.toml -i dummy_gpio -i linux_i2c:bus=1 get ppvar_vbus_mv
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with i2c-dev support enabled (`CONFIG_I2C_CHARDEV`)
//! - Read/write access to `/dev/i2c-N` (usually the `i2c` group)

pub mod device;
pub mod error;

pub use device::{parse_options, LinuxI2c, LinuxI2cConfig};
pub use error::{LinuxI2cError, Result};

use std::sync::Arc;

use rservo_core::interface::Interface;

/// Open a Linux I2C adapter as a pool interface
///
/// # Example Options
///
/// - `dev=/dev/i2c-1` - adapter device path
/// - `bus=1` - adapter number (alternative to dev)
pub fn open_linux_i2c(options: &[(&str, &str)]) -> std::result::Result<Interface, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let bus = LinuxI2c::open(&config)?;
    Ok(Interface::I2c(Arc::new(bus)))
}

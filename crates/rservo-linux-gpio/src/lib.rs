//! rservo-linux-gpio - GPIO banks on Linux GPIO character devices
//!
//! This crate exposes a set of lines of a `/dev/gpiochipN` device as one
//! [`GpioBank`](rservo_core::interface::GpioBank): bank bit N is the N-th
//! line listed in the configuration. It uses the gpiocdev crate, a pure
//! Rust implementation of the GPIO character device interface.
//!
//! # Usage with rservod
//!
//! ```bash
//! # Lines 0 through 7 of the first chip as interface 1
//! rservod -c servo.toml -i linux_gpio:dev=/dev/gpiochip0,lines=0-7 get cold_reset
//!
//! # Individual lines, in bank-bit order
//! rservod -c servo.toml -i linux_gpio:gpiochip=2,lines=17;4;22 hwinit
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;

pub use device::{parse_lines, parse_options, LinuxGpioBank, LinuxGpioConfig};
pub use error::{LinuxGpioError, Result};

use std::sync::Arc;

use rservo_core::interface::Interface;

/// Open a Linux GPIO bank as a pool interface
///
/// # Example Options
///
/// - `dev=/dev/gpiochip0` - GPIO chip device path (or use gpiochip=N)
/// - `gpiochip=0` - GPIO chip number (alternative to dev)
/// - `lines=0-7` - chip lines of the bank (required)
pub fn open_linux_gpio(options: &[(&str, &str)]) -> std::result::Result<Interface, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let bank = LinuxGpioBank::open(&config)?;
    Ok(Interface::Gpio(Arc::new(bank)))
}

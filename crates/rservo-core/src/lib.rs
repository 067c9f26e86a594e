//! rservo-core - Control dispatch engine for hardware debug boards
//!
//! This crate ties together everything needed to get and set named board
//! controls on a device under test:
//!
//! - [`config`] loads declarative control documents into a catalog of
//!   controls, value maps and an init sequence
//! - [`interface`] defines the byte-level channel traits (GPIO bank, I2C bus,
//!   UART) and the positional [`InterfacePool`]
//! - [`drivers`] holds the driver registry and the built-in drivers
//! - [`device`] is the shared device cache that keeps one protocol object per
//!   physical chip
//! - [`power`] and [`wp`] are the board-parameterized state machines
//! - [`dispatch`] is the [`Dispatcher`] gluing the above together
//!
//! # Example
//!
//! ```ignore
//! use rservo_core::{Dispatcher, DriverRegistry, InterfacePool, SystemConfig};
//!
//! let mut config = SystemConfig::new();
//! config.add_source("servo_v2.toml")?;
//!
//! let pool = InterfacePool::new(vec![/* opened interfaces */]);
//! let servo = Dispatcher::new(config, pool, DriverRegistry::builtin())?;
//!
//! servo.set("cold_reset", "on")?;
//! println!("{}", servo.get("ppvar_vbat_mv")?);
//! # Ok::<(), rservo_core::Error>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod codec;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod host;
pub mod interface;
pub mod power;
pub mod value;
pub mod wp;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Direction, ParamSet, SystemConfig};
pub use dispatch::{Dispatcher, Sleeper, ThreadSleeper};
pub use drivers::{Driver, DriverContext, DriverRegistry};
pub use error::{BusError, ConfigError, DriverError, Error, Result, ValueError};
pub use host::ControlHost;
pub use interface::{GpioBank, I2cBus, Interface, InterfacePool, Uart};
pub use value::Value;

//! Interface traits and the positional interface pool
//!
//! An interface is one channel on the debug board: a bank of GPIO lines, an
//! I2C bus, or a UART console. Adapter crates implement the traits below;
//! the [`InterfacePool`] holds them in the order the control documents
//! number them (starting from 1).
//!
//! Implementations serialize their own transfers, so a single interface may
//! be shared by any number of drivers across threads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BusError;

/// A bank of GPIO lines addressed as bits of one word
pub trait GpioBank: Send + Sync {
    /// Short human-readable name (for logging)
    fn name(&self) -> &str;

    /// Current level of every line, bit N = line N
    fn read(&self) -> Result<u64, BusError>;

    /// Drive the lines selected by `mask` to the matching bits of `value`.
    ///
    /// The read-modify-write happens atomically with respect to other
    /// callers on the same bank; unmasked lines keep their state.
    fn update(&self, mask: u64, value: u64) -> Result<(), BusError>;
}

/// An I2C bus master
pub trait I2cBus: Send + Sync {
    /// Short human-readable name (for logging)
    fn name(&self) -> &str;

    /// Write `write` to 7-bit address `addr`, then read `read_len` bytes.
    ///
    /// Either phase may be empty. A non-empty write followed by a read is
    /// issued as a repeated-start combined transaction.
    fn wr_rd(&self, addr: u8, write: &[u8], read_len: usize) -> Result<Vec<u8>, BusError>;
}

/// A UART attached to a DUT console
pub trait Uart: Send + Sync {
    /// Short human-readable name (for logging)
    fn name(&self) -> &str;

    /// Path of the pseudo-terminal clients can attach to, if any
    fn pty(&self) -> Option<String>;

    fn baudrate(&self) -> Result<u32, BusError>;

    fn set_baudrate(&self, baud: u32) -> Result<(), BusError>;

    /// Send a console command and collect its output
    fn exchange(&self, cmd: &str, timeout: Duration) -> Result<String, BusError>;
}

/// One pool slot
#[derive(Clone)]
pub enum Interface {
    Gpio(Arc<dyn GpioBank>),
    I2c(Arc<dyn I2cBus>),
    Uart(Arc<dyn Uart>),
    /// Reserved slot owned by an external tool
    Placeholder,
}

impl Interface {
    pub fn kind(&self) -> &'static str {
        match self {
            Interface::Gpio(_) => "gpio",
            Interface::I2c(_) => "i2c",
            Interface::Uart(_) => "uart",
            Interface::Placeholder => "placeholder",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Interface::Gpio(g) => g.name(),
            Interface::I2c(i) => i.name(),
            Interface::Uart(u) => u.name(),
            Interface::Placeholder => "placeholder",
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

/// Opened interfaces, numbered from 1
#[derive(Debug, Clone, Default)]
pub struct InterfacePool {
    slots: Vec<Interface>,
}

impl InterfacePool {
    pub fn new(slots: Vec<Interface>) -> Self {
        Self { slots }
    }

    pub fn push(&mut self, interface: Interface) {
        self.slots.push(interface);
    }

    /// Interface for a 1-based config index
    pub fn get(&self, index: usize) -> Option<&Interface> {
        index.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(index, interface)` pairs with 1-based indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Interface)> {
        self.slots.iter().enumerate().map(|(i, s)| (i + 1, s))
    }
}

//! rservo-dummy - Emulated debug-board interfaces
//!
//! This crate provides in-memory stand-ins for the three interface kinds so
//! the whole dispatch engine can run without hardware:
//!
//! - [`DummyGpio`]: a bank of lines held in one word
//! - [`DummyI2c`]: a bus with [`RegisterFile`] and [`Eeprom`] targets attached
//! - [`DummyUart`]: a console answering commands from a script
//!
//! [`dummy_servo`] assembles one of each, populated with the chips a typical
//! servo board carries.

mod i2c;

pub use i2c::{DummyI2c, Eeprom, I2cTarget, RegisterFile};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rservo_core::error::BusError;
use rservo_core::interface::{GpioBank, Interface, Uart};

/// Default line speed of [`DummyUart`]
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// INA219 address on the emulated servo
pub const INA219_ADDR: u8 = 0x40;
/// TCA6416 address on the emulated servo
pub const TCA6416_ADDR: u8 = 0x20;
/// M24C02 address on the emulated servo
pub const EEPROM_ADDR: u8 = 0x50;

/// Emulated GPIO bank
#[derive(Debug)]
pub struct DummyGpio {
    name: String,
    levels: Mutex<u64>,
}

impl DummyGpio {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_levels(name, 0)
    }

    /// Bank with lines starting at `levels`
    pub fn with_levels(name: impl Into<String>, levels: u64) -> Self {
        Self {
            name: name.into(),
            levels: Mutex::new(levels),
        }
    }

    pub fn levels(&self) -> u64 {
        *self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force line levels, as if driven from the DUT side
    pub fn set_levels(&self, levels: u64) {
        *self.levels.lock().unwrap_or_else(PoisonError::into_inner) = levels;
    }
}

impl GpioBank for DummyGpio {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<u64, BusError> {
        Ok(self.levels())
    }

    fn update(&self, mask: u64, value: u64) -> Result<(), BusError> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        *levels = (*levels & !mask) | (value & mask);
        log::trace!("{}: levels now 0x{:x}", self.name, *levels);
        Ok(())
    }
}

#[derive(Debug)]
struct UartState {
    baudrate: u32,
    responses: HashMap<String, String>,
    sent: Vec<String>,
}

/// Emulated UART console
///
/// Commands with a scripted response get it back; anything else gets no
/// output.
#[derive(Debug)]
pub struct DummyUart {
    name: String,
    state: Mutex<UartState>,
}

impl DummyUart {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(UartState {
                baudrate: DEFAULT_BAUDRATE,
                responses: HashMap::new(),
                sent: Vec::new(),
            }),
        }
    }

    /// Answer `cmd` with `output` from now on
    pub fn respond(&self, cmd: &str, output: &str) {
        self.lock().responses.insert(cmd.to_string(), output.to_string());
    }

    /// Every command received, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Uart for DummyUart {
    fn name(&self) -> &str {
        &self.name
    }

    fn pty(&self) -> Option<String> {
        None
    }

    fn baudrate(&self) -> Result<u32, BusError> {
        Ok(self.lock().baudrate)
    }

    fn set_baudrate(&self, baud: u32) -> Result<(), BusError> {
        if baud == 0 {
            return Err(BusError::Uart(format!("{}: invalid baudrate 0", self.name)));
        }
        self.lock().baudrate = baud;
        Ok(())
    }

    fn exchange(&self, cmd: &str, _timeout: Duration) -> Result<String, BusError> {
        let mut state = self.lock();
        state.sent.push(cmd.to_string());
        let output = state.responses.get(cmd).cloned().unwrap_or_default();
        log::debug!("{}: '{}' -> {:?}", self.name, cmd, output);
        Ok(output)
    }
}

/// Handles to the hardware behind [`dummy_servo`]
#[derive(Debug, Clone)]
pub struct DummyServo {
    pub gpio: Arc<DummyGpio>,
    pub i2c: Arc<DummyI2c>,
    pub ina219: Arc<RegisterFile>,
    pub tca6416: Arc<RegisterFile>,
    pub eeprom: Arc<Eeprom>,
    pub uart: Arc<DummyUart>,
}

impl DummyServo {
    /// Interfaces in pool order: GPIO, I2C, UART
    pub fn interfaces(&self) -> Vec<Interface> {
        vec![
            Interface::Gpio(self.gpio.clone()),
            Interface::I2c(self.i2c.clone()),
            Interface::Uart(self.uart.clone()),
        ]
    }
}

/// Emulated servo board: a GPIO bank, an I2C bus with an INA219, a TCA6416
/// and an M24C02, and an EC console
pub fn dummy_servo() -> DummyServo {
    let gpio = Arc::new(DummyGpio::new("dummy_gpio"));
    let ina219 = Arc::new(RegisterFile::new(2));
    let tca6416 = Arc::new(RegisterFile::new(1));
    let eeprom = Arc::new(Eeprom::new(256));
    for measurement in 1..=4 {
        ina219.mark_read_only(measurement);
    }
    // Every expander line powers up as an input
    tca6416.set_register(6, 0xff);
    tca6416.set_register(7, 0xff);
    let i2c = Arc::new(DummyI2c::new("dummy_i2c"));
    i2c.attach(INA219_ADDR, ina219.clone());
    i2c.attach(TCA6416_ADDR, tca6416.clone());
    i2c.attach(EEPROM_ADDR, eeprom.clone());
    let uart = Arc::new(DummyUart::new("dummy_uart"));
    log::info!("Emulated servo: gpio, i2c (0x20, 0x40, 0x50), uart");

    DummyServo {
        gpio,
        i2c,
        ina219,
        tca6416,
        eeprom,
        uart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpio_update_is_masked() {
        let gpio = DummyGpio::with_levels("g", 0b1010);
        gpio.update(0b0110, 0b0100).unwrap();
        assert_eq!(gpio.read().unwrap(), 0b1100);
    }

    #[test]
    fn test_uart_script() {
        let uart = DummyUart::new("u");
        uart.respond("version", "RO: servo_v4\n");
        assert_eq!(uart.exchange("version", Duration::ZERO).unwrap(), "RO: servo_v4\n");
        assert_eq!(uart.exchange("reboot", Duration::ZERO).unwrap(), "");
        assert_eq!(uart.sent(), vec!["version", "reboot"]);
        assert!(uart.set_baudrate(0).is_err());
        uart.set_baudrate(9600).unwrap();
        assert_eq!(uart.baudrate().unwrap(), 9600);
    }

    #[test]
    fn test_dummy_servo_layout() {
        let servo = dummy_servo();
        let kinds: Vec<_> = servo.interfaces().iter().map(Interface::kind).collect();
        assert_eq!(kinds, vec!["gpio", "i2c", "uart"]);
        assert_eq!(servo.i2c.addresses(), vec![TCA6416_ADDR, INA219_ADDR, EEPROM_ADDR]);
    }
}

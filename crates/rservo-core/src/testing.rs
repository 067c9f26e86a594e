//! In-crate fakes for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{BusError, Error, Result};
use crate::host::ControlHost;
use crate::interface::{GpioBank, I2cBus, Uart};

/// GPIO bank backed by a single word
pub struct FakeGpio {
    levels: Mutex<u64>,
    writes: Mutex<Vec<(u64, u64)>>,
}

impl FakeGpio {
    pub fn new(levels: u64) -> Self {
        Self {
            levels: Mutex::new(levels),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn levels(&self) -> u64 {
        *self.levels.lock().unwrap()
    }

    pub fn set_levels(&self, levels: u64) {
        *self.levels.lock().unwrap() = levels;
    }

    /// `(mask, value)` of every update
    pub fn writes(&self) -> Vec<(u64, u64)> {
        self.writes.lock().unwrap().clone()
    }
}

impl GpioBank for FakeGpio {
    fn name(&self) -> &str {
        "fake_gpio"
    }

    fn read(&self) -> std::result::Result<u64, BusError> {
        Ok(self.levels())
    }

    fn update(&self, mask: u64, value: u64) -> std::result::Result<(), BusError> {
        let mut levels = self.levels.lock().unwrap();
        *levels = (*levels & !mask) | (value & mask);
        self.writes.lock().unwrap().push((mask, value));
        Ok(())
    }
}

/// I2C bus with per-address register files and a transaction log
///
/// The first written byte selects the register; any further bytes replace
/// its contents. Reads return the selected register's bytes.
#[derive(Default)]
pub struct FakeI2c {
    regs: Mutex<HashMap<(u8, u8), Vec<u8>>>,
    pointer: Mutex<HashMap<u8, u8>>,
    log: Mutex<Vec<(u8, Vec<u8>, usize)>>,
    fail_next: AtomicBool,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` MSB-first in a `len`-byte register
    pub fn set_register(&self, addr: u8, reg: u8, len: usize, value: u64) {
        let bytes = (0..len).rev().map(|i| (value >> (i * 8)) as u8).collect();
        self.regs.lock().unwrap().insert((addr, reg), bytes);
    }

    /// Register contents read MSB-first
    pub fn register(&self, addr: u8, reg: u8) -> u64 {
        self.regs
            .lock()
            .unwrap()
            .get(&(addr, reg))
            .map(|b| b.iter().fold(0, |acc, x| (acc << 8) | u64::from(*x)))
            .unwrap_or(0)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<(u8, Vec<u8>, usize)> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl I2cBus for FakeI2c {
    fn name(&self) -> &str {
        "fake_i2c"
    }

    fn wr_rd(&self, addr: u8, write: &[u8], read_len: usize) -> std::result::Result<Vec<u8>, BusError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BusError::I2c {
                addr,
                reason: "NAK".to_string(),
            });
        }
        self.log.lock().unwrap().push((addr, write.to_vec(), read_len));

        let mut pointer = self.pointer.lock().unwrap();
        if let Some((&reg, data)) = write.split_first() {
            pointer.insert(addr, reg);
            if !data.is_empty() {
                self.regs.lock().unwrap().insert((addr, reg), data.to_vec());
            }
        }
        let reg = pointer.get(&addr).copied().unwrap_or(0);
        let mut bytes = self
            .regs
            .lock()
            .unwrap()
            .get(&(addr, reg))
            .cloned()
            .unwrap_or_default();
        bytes.resize(read_len, 0);
        Ok(bytes)
    }
}

/// Console answering commands from a script
#[derive(Default)]
pub struct FakeUart {
    responses: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<String>>,
    baud: Mutex<u32>,
}

impl FakeUart {
    pub fn new() -> Self {
        Self {
            baud: Mutex::new(115200),
            ..Self::default()
        }
    }

    pub fn respond(&self, cmd: &str, output: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(cmd.to_string(), output.to_string());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Uart for FakeUart {
    fn name(&self) -> &str {
        "fake_uart"
    }

    fn pty(&self) -> Option<String> {
        Some("/dev/pts/9".to_string())
    }

    fn baudrate(&self) -> std::result::Result<u32, BusError> {
        Ok(*self.baud.lock().unwrap())
    }

    fn set_baudrate(&self, baud: u32) -> std::result::Result<(), BusError> {
        *self.baud.lock().unwrap() = baud;
        Ok(())
    }

    fn exchange(&self, cmd: &str, _timeout: Duration) -> std::result::Result<String, BusError> {
        self.sent.lock().unwrap().push(cmd.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(cmd)
            .cloned()
            .unwrap_or_default())
    }
}

/// Host that records every call and answers gets from a table
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<String>>,
    values: Mutex<HashMap<String, VecDeque<String>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `get(name)` with `value`
    pub fn respond(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), VecDeque::from([value.to_string()]));
    }

    /// Answer successive gets with `values`, repeating the last one
    pub fn respond_seq(&self, name: &str, values: &[&str]) {
        self.values.lock().unwrap().insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than sleeps and button polls
    pub fn sets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("set "))
            .collect()
    }
}

impl ControlHost for RecordingHost {
    fn get(&self, name: &str) -> Result<String> {
        self.calls.lock().unwrap().push(format!("get {}", name));
        let mut values = self.values.lock().unwrap();
        let queue = values.get_mut(name).ok_or_else(|| {
            Error::Config(crate::error::ConfigError::UnknownControl {
                name: name.to_string(),
                valid: String::new(),
            })
        })?;
        let value = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(value)
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("set {}:{}", name, value));
        Ok(())
    }

    fn sleep(&self, duration: Duration) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("sleep {}", duration.as_secs_f64()));
    }
}

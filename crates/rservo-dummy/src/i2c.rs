//! Emulated I2C bus and targets

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use rservo_core::error::BusError;
use rservo_core::interface::I2cBus;

/// A device answering on the emulated bus
pub trait I2cTarget: Send + Sync {
    /// Write phase of a transfer (may be empty)
    fn write(&self, data: &[u8]);

    /// Read phase of a transfer
    fn read(&self, len: usize) -> Vec<u8>;
}

#[derive(Debug, Default)]
struct RegisterState {
    pointer: u8,
    registers: BTreeMap<u8, u64>,
    read_only: HashSet<u8>,
}

/// Register-indexed device with registers of `reg_len` bytes, MSB first
///
/// The first written byte selects a register, the remaining bytes (if any)
/// replace its contents. Reads return the selected register.
#[derive(Debug)]
pub struct RegisterFile {
    reg_len: usize,
    state: Mutex<RegisterState>,
}

impl RegisterFile {
    pub fn new(reg_len: usize) -> Self {
        Self {
            reg_len,
            state: Mutex::new(RegisterState::default()),
        }
    }

    pub fn register(&self, idx: u8) -> u64 {
        self.lock().registers.get(&idx).copied().unwrap_or(0)
    }

    /// Preset a register, as the chip itself would
    pub fn set_register(&self, idx: u8, value: u64) {
        self.lock().registers.insert(idx, value);
    }

    /// Ignore bus writes to `idx` (measurement registers)
    pub fn mark_read_only(&self, idx: u8) {
        self.lock().read_only.insert(idx);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegisterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl I2cTarget for RegisterFile {
    fn write(&self, data: &[u8]) {
        let Some((&idx, payload)) = data.split_first() else {
            return;
        };
        let mut state = self.lock();
        state.pointer = idx;
        if payload.is_empty() || state.read_only.contains(&idx) {
            return;
        }
        let value = payload
            .iter()
            .take(self.reg_len)
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        state.registers.insert(idx, value);
    }

    fn read(&self, len: usize) -> Vec<u8> {
        let state = self.lock();
        let value = state.registers.get(&state.pointer).copied().unwrap_or(0);
        let mut bytes: Vec<u8> = (0..self.reg_len)
            .rev()
            .map(|i| (value >> (i * 8)) as u8)
            .collect();
        bytes.resize(len, 0);
        bytes
    }
}

#[derive(Debug)]
struct EepromState {
    pointer: usize,
    data: Vec<u8>,
}

/// Byte-addressed EEPROM with an auto-incrementing address pointer
#[derive(Debug)]
pub struct Eeprom {
    state: Mutex<EepromState>,
}

impl Eeprom {
    /// Blank (`0xff`) EEPROM of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(EepromState {
                pointer: 0,
                data: vec![0xff; size],
            }),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub fn fill(&self, offset: usize, bytes: &[u8]) {
        let mut state = self.lock();
        let len = state.data.len();
        for (i, b) in bytes.iter().enumerate() {
            state.data[(offset + i) % len] = *b;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EepromState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl I2cTarget for Eeprom {
    fn write(&self, data: &[u8]) {
        let Some((&addr, payload)) = data.split_first() else {
            return;
        };
        let mut state = self.lock();
        let len = state.data.len();
        state.pointer = usize::from(addr) % len;
        for b in payload {
            let p = state.pointer;
            state.data[p] = *b;
            state.pointer = (p + 1) % len;
        }
    }

    fn read(&self, len: usize) -> Vec<u8> {
        let mut state = self.lock();
        let size = state.data.len();
        (0..len)
            .map(|_| {
                let p = state.pointer;
                state.pointer = (p + 1) % size;
                state.data[p]
            })
            .collect()
    }
}

/// Emulated I2C bus; addresses with no target NAK
pub struct DummyI2c {
    name: String,
    targets: Mutex<BTreeMap<u8, Arc<dyn I2cTarget>>>,
}

impl DummyI2c {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Attach a target at a 7-bit address, replacing any previous one
    pub fn attach(&self, addr: u8, target: Arc<dyn I2cTarget>) {
        self.lock().insert(addr, target);
    }

    pub fn detach(&self, addr: u8) {
        self.lock().remove(&addr);
    }

    /// Occupied addresses, ascending
    pub fn addresses(&self) -> Vec<u8> {
        self.lock().keys().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u8, Arc<dyn I2cTarget>>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DummyI2c {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyI2c")
            .field("name", &self.name)
            .field("addresses", &self.addresses())
            .finish()
    }
}

impl I2cBus for DummyI2c {
    fn name(&self) -> &str {
        &self.name
    }

    fn wr_rd(&self, addr: u8, write: &[u8], read_len: usize) -> Result<Vec<u8>, BusError> {
        let target = self.lock().get(&addr).cloned().ok_or_else(|| BusError::I2c {
            addr,
            reason: "no device (NAK)".to_string(),
        })?;
        target.write(write);
        let bytes = if read_len > 0 { target.read(read_len) } else { Vec::new() };
        log::trace!("{}: 0x{:02x} w{:02x?} r{:02x?}", self.name, addr, write, bytes);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_pointer() {
        let regs = RegisterFile::new(2);
        regs.set_register(2, 0x1234);
        regs.write(&[2]);
        assert_eq!(regs.read(2), vec![0x12, 0x34]);

        regs.write(&[5, 0xab, 0xcd]);
        assert_eq!(regs.register(5), 0xabcd);
        // Pointer stays on the last register written
        assert_eq!(regs.read(2), vec![0xab, 0xcd]);
    }

    #[test]
    fn test_read_only_register() {
        let regs = RegisterFile::new(2);
        regs.set_register(1, 0x10);
        regs.mark_read_only(1);
        regs.write(&[1, 0xff, 0xff]);
        assert_eq!(regs.register(1), 0x10);
    }

    #[test]
    fn test_eeprom_auto_increment() {
        let eeprom = Eeprom::new(256);
        eeprom.write(&[0x10, b'H']);
        eeprom.write(&[0x11, b'i']);
        eeprom.write(&[0x10]);
        assert_eq!(eeprom.read(3), vec![b'H', b'i', 0xff]);

        eeprom.write(&[0xff, 1, 2]);
        assert_eq!(&eeprom.contents()[..1], &[2]);
    }

    #[test]
    fn test_missing_target_naks() {
        let bus = DummyI2c::new("bus");
        bus.attach(0x40, Arc::new(RegisterFile::new(2)));
        assert!(bus.wr_rd(0x40, &[0], 2).is_ok());
        let err = bus.wr_rd(0x41, &[0], 2).unwrap_err();
        assert!(err.to_string().contains("0x41"));
        bus.detach(0x40);
        assert!(bus.addresses().is_empty());
    }
}

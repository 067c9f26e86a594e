//! Linux I2C bus implementation
//!
//! This module provides the `LinuxI2c` struct that implements the `I2cBus`
//! trait using Linux's i2c-dev interface.

use crate::error::{bus_error, LinuxI2cError, Result};

use rservo_core::error::BusError;
use rservo_core::interface::I2cBus;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::sync::{Mutex, PoisonError};

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::{ioctl_read_bad, ioctl_write_ptr_bad};

    const I2C_FUNCS: u16 = 0x0705;
    const I2C_RDWR: u16 = 0x0707;

    /// Adapter supports plain I2C-level commands
    pub const I2C_FUNC_I2C: libc::c_ulong = 0x0000_0001;

    /// Message is a read
    pub const I2C_M_RD: u16 = 0x0001;

    /// Mirrors the kernel's struct i2c_msg
    #[repr(C)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// Mirrors the kernel's struct i2c_rdwr_ioctl_data
    #[repr(C)]
    pub struct I2cRdwrData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    ioctl_read_bad!(i2c_funcs, I2C_FUNCS, libc::c_ulong);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrData);
}

/// Configuration for opening a Linux I2C bus
#[derive(Debug, Clone, Default)]
pub struct LinuxI2cConfig {
    /// Device path (e.g., "/dev/i2c-1")
    pub device: String,
}

impl LinuxI2cConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

/// Linux I2C bus master using the i2c-dev interface
pub struct LinuxI2c {
    name: String,
    file: Mutex<File>,
}

impl LinuxI2c {
    /// Open a Linux I2C adapter with the given configuration
    pub fn open(config: &LinuxI2cConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxI2cError::NoDevice);
        }

        log::debug!("linux_i2c: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxI2cError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        let mut funcs: libc::c_ulong = 0;
        unsafe {
            ioctl::i2c_funcs(file.as_raw_fd(), &mut funcs).map_err(|e| {
                LinuxI2cError::FuncsFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
        }
        if funcs & ioctl::I2C_FUNC_I2C == 0 {
            return Err(LinuxI2cError::Unsupported(config.device.clone()));
        }

        log::info!("linux_i2c: Opened {} (funcs=0x{:08x})", config.device, funcs);

        Ok(Self {
            name: config.device.clone(),
            file: Mutex::new(file),
        })
    }

    /// Open a device with default settings
    pub fn open_device(device: &str) -> Result<Self> {
        Self::open(&LinuxI2cConfig::new(device))
    }

    /// Issue one I2C_RDWR transaction: an optional write then an optional read
    fn transfer(&self, addr: u8, write: &[u8], read_buf: &mut [u8]) -> Result<()> {
        let too_long = |len: usize| LinuxI2cError::TooLong(len);
        let write_len = u16::try_from(write.len()).map_err(|_| too_long(write.len()))?;
        let read_len = u16::try_from(read_buf.len()).map_err(|_| too_long(read_buf.len()))?;

        // The kernel never writes through a write message's buffer
        let mut tx = write.to_vec();
        let mut msgs = Vec::with_capacity(2);
        if !write.is_empty() || read_buf.is_empty() {
            msgs.push(ioctl::I2cMsg {
                addr: addr as u16,
                flags: 0,
                len: write_len,
                buf: tx.as_mut_ptr(),
            });
        }
        if !read_buf.is_empty() {
            msgs.push(ioctl::I2cMsg {
                addr: addr as u16,
                flags: ioctl::I2C_M_RD,
                len: read_len,
                buf: read_buf.as_mut_ptr(),
            });
        }
        let data = ioctl::I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            ioctl::i2c_rdwr(file.as_raw_fd(), &data).map_err(|e| {
                LinuxI2cError::TransferFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
        }
        Ok(())
    }
}

impl I2cBus for LinuxI2c {
    fn name(&self) -> &str {
        &self.name
    }

    fn wr_rd(&self, addr: u8, write: &[u8], read_len: usize) -> std::result::Result<Vec<u8>, BusError> {
        if addr > 0x7f {
            return Err(bus_error(
                addr,
                LinuxI2cError::InvalidParameter("address is not 7-bit".into()),
            ));
        }
        let mut read_buf = vec![0u8; read_len];
        self.transfer(addr, write, &mut read_buf)
            .map_err(|e| bus_error(addr, e))?;
        log::trace!("linux_i2c: 0x{:02x} wr {:02x?} rd {:02x?}", addr, write, read_buf);
        Ok(read_buf)
    }
}

/// Parse interface options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/i2c-N` - I2C adapter device path (or use bus)
/// - `bus=N` - adapter number (alternative to dev)
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxI2cConfig, String> {
    let mut config = LinuxI2cConfig::default();
    let mut bus: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "bus" => {
                bus = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid bus value: {}", value))?,
                );
            }
            _ => {
                log::warn!("linux_i2c: Unknown option: {}={}", key, value);
            }
        }
    }

    match (config.device.is_empty(), bus) {
        (true, Some(n)) => config.device = format!("/dev/i2c-{}", n),
        (true, None) => {
            return Err("Missing required parameter: dev\n\
                 Usage: linux_i2c:dev=/dev/i2c-N"
                .to_string())
        }
        (false, Some(_)) => return Err("Only one of 'dev' or 'bus' can be specified".to_string()),
        (false, None) => {}
    }

    Ok(config)
}

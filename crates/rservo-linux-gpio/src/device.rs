//! GPIO bank over the Linux character device interface
//!
//! Every line of the bank is requested as an input when the bank opens.
//! Lines switch to outputs the first time a control drives them and stay
//! outputs afterwards; reading an output line returns the driven level.

use std::sync::{Mutex, PoisonError};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use rservo_core::error::BusError;
use rservo_core::interface::GpioBank;

use crate::error::{LinuxGpioError, Result};

/// Consumer label shown by `gpioinfo`
pub const DEFAULT_CONSUMER: &str = "rservod";

/// Configuration for opening a Linux GPIO bank
#[derive(Debug, Clone, Default)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Chip line offset for each bank bit, bit 0 first
    pub lines: Vec<Offset>,
    pub consumer: Option<String>,
}

impl LinuxGpioConfig {
    pub fn new(device: impl Into<String>, lines: Vec<Offset>) -> Self {
        Self {
            device: device.into(),
            lines,
            consumer: None,
        }
    }
}

struct BankState {
    request: Request,
    /// Bank bits currently configured as outputs
    outputs: u64,
    /// Levels last driven on the output bits
    driven: u64,
}

/// A set of chip lines presented as one [`GpioBank`] word
pub struct LinuxGpioBank {
    name: String,
    lines: Vec<Offset>,
    state: Mutex<BankState>,
}

impl LinuxGpioBank {
    /// Open the chip and request every line of the bank as an input
    pub fn open(config: &LinuxGpioConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        if config.lines.is_empty() {
            return Err(LinuxGpioError::InvalidParameter("no lines given".to_string()));
        }
        if config.lines.len() > 64 {
            return Err(LinuxGpioError::TooManyLines(config.lines.len()));
        }

        log::debug!("linux_gpio: Opening device {}", config.device);

        let mut req_config = Config::default();
        for &line in &config.lines {
            req_config.with_line(line).as_input();
        }
        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer(config.consumer.as_deref().unwrap_or(DEFAULT_CONSUMER))
            .request()
            .map_err(|source| LinuxGpioError::LineRequestFailed {
                path: config.device.clone(),
                source,
            })?;

        log::info!(
            "linux_gpio: Opened {} ({} lines: {:?})",
            config.device,
            config.lines.len(),
            config.lines
        );

        Ok(Self {
            name: config.device.clone(),
            lines: config.lines.clone(),
            state: Mutex::new(BankState {
                request,
                outputs: 0,
                driven: 0,
            }),
        })
    }

    /// Chip offsets of the bank bits
    pub fn lines(&self) -> &[Offset] {
        &self.lines
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn level(bit: bool) -> Value {
    if bit {
        Value::Active
    } else {
        Value::Inactive
    }
}

impl GpioBank for LinuxGpioBank {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> std::result::Result<u64, BusError> {
        let state = self.lock();
        let mut levels = 0u64;
        for (bit, &line) in self.lines.iter().enumerate() {
            let value = state
                .request
                .value(line)
                .map_err(|source| LinuxGpioError::GetValueFailed { line, source })?;
            if value == Value::Active {
                levels |= 1 << bit;
            }
        }
        Ok(levels)
    }

    fn update(&self, mask: u64, value: u64) -> std::result::Result<(), BusError> {
        let mut state = self.lock();
        let new_outputs = mask & !state.outputs;
        let driven = (state.driven & !mask) | (value & mask);

        if new_outputs == 0 {
            for (bit, &line) in self.lines.iter().enumerate() {
                let select = 1u64 << bit;
                if mask & select != 0 {
                    state
                        .request
                        .set_value(line, level(driven & select != 0))
                        .map_err(|source| LinuxGpioError::SetValueFailed { line, source })?;
                }
            }
        } else {
            // Direction change: the whole request is reconfigured at once
            let outputs = state.outputs | new_outputs;
            let mut cfg = Config::default();
            for (bit, &line) in self.lines.iter().enumerate() {
                let select = 1u64 << bit;
                if outputs & select != 0 {
                    cfg.with_line(line).as_output(level(driven & select != 0));
                } else {
                    cfg.with_line(line).as_input();
                }
            }
            log::debug!("linux_gpio: {} lines 0x{:x} now outputs", self.name, new_outputs);
            state
                .request
                .reconfigure(&cfg)
                .map_err(LinuxGpioError::ReconfigureFailed)?;
            state.outputs = outputs;
        }
        state.driven = driven;
        Ok(())
    }
}

/// Parse a `lines` option: `N`, `A-B` (inclusive) or `A;B;C`
pub fn parse_lines(value: &str) -> std::result::Result<Vec<Offset>, String> {
    let bad = || format!("Invalid lines value: {}", value);
    if let Some((start, end)) = value.split_once('-') {
        let start: Offset = start.trim().parse().map_err(|_| bad())?;
        let end: Offset = end.trim().parse().map_err(|_| bad())?;
        if end < start {
            return Err(bad());
        }
        return Ok((start..=end).collect());
    }
    value
        .split(';')
        .map(|s| s.trim().parse().map_err(|_| bad()))
        .collect()
}

/// Parse interface options from a list of key-value pairs
///
/// # Supported Options
///
/// - `dev=/dev/gpiochipN` - GPIO chip device path (or use gpiochip)
/// - `gpiochip=N` - GPIO chip number (alternative to dev)
/// - `lines=0-7` - chip lines making up the bank, bit 0 first (required)
/// - `consumer=name` - label for the line request (optional)
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxGpioConfig, String> {
    let mut config = LinuxGpioConfig::default();
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                gpiochip = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid gpiochip value: {}", value))?,
                );
            }
            "lines" => {
                config.lines = parse_lines(value)?;
            }
            "consumer" => {
                config.consumer = Some(value.to_string());
            }
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        match gpiochip {
            Some(n) => config.device = format!("/dev/gpiochip{}", n),
            None => {
                return Err("Either 'dev' or 'gpiochip' must be specified.\n\
                     e.g. linux_gpio:dev=/dev/gpiochip0,lines=0-7"
                    .to_string())
            }
        }
    } else if gpiochip.is_some() {
        return Err("Only one of 'dev' or 'gpiochip' can be specified".to_string());
    }

    if config.lines.is_empty() {
        return Err("Missing required parameter: lines".to_string());
    }
    if config.lines.len() > 64 {
        return Err(format!("A bank holds at most 64 lines, got {}", config.lines.len()));
    }

    Ok(config)
}

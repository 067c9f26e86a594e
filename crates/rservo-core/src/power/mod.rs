//! Power-state sequencing
//!
//! One `power_state` control per board accepts `off`, `on`, `rec` and
//! `reset`. What each of those means electrically differs from board to
//! board: some shut down through the EC console, some hold the power button,
//! some toggle a recovery strap around a cold reset.
//!
//! The [`PowerSequencer`] is the single engine. A [`BoardPower`] describes a
//! board as a set of step functions, each of which drives other controls
//! (`cold_reset`, `pwr_button`, `rec_mode`, `ec_uart_cmd`, ...) through the
//! [`ControlHost`]. Sequences run to completion once started.

pub mod boards;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{Direction, ParamSet};
use crate::drivers::{unsupported, Driver, DriverContext, DriverFactory};
use crate::error::{DriverError, ValueError};
use crate::host::{self, secs, ControlHost};
use crate::value::Value;

/// Settable power states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
    Rec,
    Reset,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Off => "off",
            PowerState::On => "on",
            PowerState::Rec => "rec",
            PowerState::Reset => "reset",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "off" => Ok(PowerState::Off),
            "on" => Ok(PowerState::On),
            "rec" | "recovery" => Ok(PowerState::Rec),
            "reset" => Ok(PowerState::Reset),
            other => Err(ValueError::InvalidState {
                value: other.to_string(),
                valid: "on, off, rec, reset".to_string(),
            }),
        }
    }
}

/// Recovery strap setting applied at power on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecMode {
    Off,
    On,
}

impl RecMode {
    /// Value written to the `rec_mode` control
    pub fn as_str(&self) -> &'static str {
        match self {
            RecMode::Off => "off",
            RecMode::On => "on",
        }
    }
}

/// Delays and commands every board shares, overridable per control
#[derive(Debug, Clone, PartialEq)]
pub struct PowerTiming {
    /// How long `cold_reset` stays asserted
    pub reset_hold: Duration,
    /// Settle time after releasing `cold_reset`
    pub reset_recovery: Duration,
    /// Wait after the EC shutdown command
    pub shutdown_delay: Duration,
    pub shutdown_ec_command: String,
    /// Time for the recovery screen to come up
    pub boot_to_rec_screen_delay: Duration,
}

impl Default for PowerTiming {
    fn default() -> Self {
        Self {
            reset_hold: Duration::from_millis(500),
            reset_recovery: Duration::from_secs(5),
            shutdown_delay: Duration::from_millis(500),
            shutdown_ec_command: "apshutdown".to_string(),
            boot_to_rec_screen_delay: Duration::from_secs(5),
        }
    }
}

impl PowerTiming {
    pub fn from_params(params: &ParamSet) -> Result<Self, DriverError> {
        let defaults = Self::default();
        let delay = |key: &'static str, default: Duration| -> Result<Duration, DriverError> {
            Ok(params.float_param(key)?.map(secs).transpose()?.unwrap_or(default))
        };
        Ok(Self {
            reset_hold: delay("reset_hold", defaults.reset_hold)?,
            reset_recovery: delay("reset_recovery", defaults.reset_recovery)?,
            shutdown_delay: delay("shutdown_delay", defaults.shutdown_delay)?,
            shutdown_ec_command: params
                .get("shutdown_ec_command")
                .map_or(defaults.shutdown_ec_command, str::to_string),
            boot_to_rec_screen_delay: delay("boot_to_rec_screen_delay", defaults.boot_to_rec_screen_delay)?,
        })
    }
}

/// A board step with no argument
pub type Step = fn(&PowerSequencer<'_>) -> Result<(), DriverError>;
/// A power-on step taking the recovery setting
pub type PowerOnStep = fn(&PowerSequencer<'_>, RecMode) -> Result<(), DriverError>;

/// What a board does for each power operation
pub struct BoardPower {
    /// `drv` name
    pub name: &'static str,
    pub power_off: Step,
    pub power_on: PowerOnStep,
    /// Cycle through reset and come back up in normal mode
    pub reset_cycle: Step,
    pub cold_reset: Step,
    /// Start the AP once the EC is ready
    pub power_on_ap: Step,
    /// Board-specific wait for recovery detection
    pub recovery_delay: Duration,
}

impl fmt::Debug for BoardPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardPower")
            .field("name", &self.name)
            .field("recovery_delay", &self.recovery_delay)
            .finish_non_exhaustive()
    }
}

/// Runs board steps against a host
pub struct PowerSequencer<'a> {
    host: &'a dyn ControlHost,
    board: &'static BoardPower,
    timing: &'a PowerTiming,
}

impl<'a> PowerSequencer<'a> {
    pub fn new(host: &'a dyn ControlHost, board: &'static BoardPower, timing: &'a PowerTiming) -> Self {
        Self { host, board, timing }
    }

    pub fn board(&self) -> &'static BoardPower {
        self.board
    }

    pub fn timing(&self) -> &PowerTiming {
        self.timing
    }

    /// Apply a state from start to finish
    pub fn apply(&self, state: PowerState) -> Result<(), DriverError> {
        log::info!("{}: power_state:{}", self.board.name, state);
        match state {
            PowerState::Off => self.power_off(),
            PowerState::On => self.power_on(RecMode::Off),
            PowerState::Rec => self.power_on(RecMode::On),
            PowerState::Reset => self.reset_cycle(),
        }
    }

    pub fn power_off(&self) -> Result<(), DriverError> {
        (self.board.power_off)(self)
    }

    pub fn power_on(&self, rec: RecMode) -> Result<(), DriverError> {
        (self.board.power_on)(self, rec)
    }

    pub fn reset_cycle(&self) -> Result<(), DriverError> {
        (self.board.reset_cycle)(self)
    }

    pub fn cold_reset(&self) -> Result<(), DriverError> {
        (self.board.cold_reset)(self)
    }

    pub fn power_on_ap(&self) -> Result<(), DriverError> {
        (self.board.power_on_ap)(self)
    }

    /// Set another control
    pub fn set(&self, name: &str, value: &str) -> Result<(), DriverError> {
        self.host.set(name, value)?;
        Ok(())
    }

    pub fn sleep(&self, duration: Duration) {
        self.host.sleep(duration);
    }

    pub fn set_rec_mode(&self, rec: RecMode) -> Result<(), DriverError> {
        self.set("rec_mode", rec.as_str())
    }

    /// Send an EC console command, ignoring its output
    pub fn ec_command(&self, cmd: &str) -> Result<(), DriverError> {
        self.set("ec_uart_cmd", cmd)
    }

    pub fn power_key(&self, hold: Duration) -> Result<(), DriverError> {
        host::power_key(self.host, hold)?;
        Ok(())
    }

    pub fn short_press(&self) -> Result<(), DriverError> {
        host::power_short_press(self.host)?;
        Ok(())
    }

    pub fn long_press(&self) -> Result<(), DriverError> {
        host::power_long_press(self.host)?;
        Ok(())
    }

    /// Assert `cold_reset`, hold, release and let the board recover
    pub fn cold_reset_pulse(&self) -> Result<(), DriverError> {
        self.set("cold_reset", "on")?;
        self.sleep(self.timing.reset_hold);
        self.set("cold_reset", "off")?;
        self.sleep(self.timing.reset_recovery);
        Ok(())
    }
}

/// Driver bound to a board's power-state behavior
pub struct PowerStateDriver {
    board: &'static BoardPower,
    timing: PowerTiming,
}

impl PowerStateDriver {
    pub fn new(board: &'static BoardPower, timing: PowerTiming) -> Self {
        Self { board, timing }
    }
}

pub(crate) fn build(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let drv = ctx.params.require("drv")?;
    let board = boards::find(drv).ok_or_else(|| DriverError::InvalidParam {
        key: "drv",
        value: drv.to_string(),
    })?;
    let timing = PowerTiming::from_params(&ctx.params)?;
    Ok(Box::new(PowerStateDriver::new(board, timing)))
}

/// Every board's `drv` name with the shared constructor
pub(crate) fn factories() -> Vec<(&'static str, DriverFactory)> {
    boards::ALL
        .iter()
        .map(|b| (b.name, build as DriverFactory))
        .collect()
}

impl Driver for PowerStateDriver {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        Err(unsupported(Direction::Get, self.board.name))
    }

    fn set(&self, host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        let state: PowerState = value.to_string().parse()?;
        PowerSequencer::new(host, self.board, &self.timing).apply(state)
    }
}

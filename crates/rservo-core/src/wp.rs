//! Firmware write-protect state
//!
//! `fw_wp_state` is set to `force_on`, `force_off` or `reset` (back to the
//! board's own strap) and reads back one of `force_on`, `force_off`, `on` or
//! `off`. Two backends exist: a servo flex cable driving the WP line
//! directly, and a CCD console that toggles it by command.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

use crate::device::Console;
use crate::drivers::{Driver, DriverContext};
use crate::error::{DriverError, ValueError};
use crate::host::ControlHost;
use crate::value::Value;

/// Settable write-protect states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WpRequest {
    ForceOn,
    ForceOff,
    Reset,
}

impl FromStr for WpRequest {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "force_on" => Ok(WpRequest::ForceOn),
            "force_off" => Ok(WpRequest::ForceOff),
            "reset" => Ok(WpRequest::Reset),
            other => Err(ValueError::InvalidState {
                value: other.to_string(),
                valid: "force_on, force_off, reset".to_string(),
            }),
        }
    }
}

/// Observed write-protect state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WpState {
    ForceOn,
    ForceOff,
    On,
    Off,
}

impl fmt::Display for WpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WpState::ForceOn => "force_on",
            WpState::ForceOff => "force_off",
            WpState::On => "on",
            WpState::Off => "off",
        })
    }
}

/// A way of controlling write protect
pub trait WpBackend: Send + Sync {
    fn force(&self, host: &dyn ControlHost, enable: bool) -> Result<(), DriverError>;

    fn reset(&self, host: &dyn ControlHost) -> Result<(), DriverError>;

    fn state(&self, host: &dyn ControlHost) -> Result<WpState, DriverError>;
}

/// `fw_wp_state` driver over any backend
pub struct FwWpState<B> {
    backend: B,
}

impl<B: WpBackend> FwWpState<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: WpBackend> Driver for FwWpState<B> {
    fn get(&self, host: &dyn ControlHost) -> Result<Value, DriverError> {
        Ok(Value::Str(self.backend.state(host)?.to_string()))
    }

    fn set(&self, host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        match value.to_string().parse()? {
            WpRequest::ForceOn => self.backend.force(host, true),
            WpRequest::ForceOff => self.backend.force(host, false),
            WpRequest::Reset => self.backend.reset(host),
        }
    }
}

/// WP line driven through the `fw_wp_vref`, `fw_wp_en` and `fw_wp` controls
pub struct Servoflex {
    vref: String,
}

impl Servoflex {
    pub fn new(vref: impl Into<String>) -> Self {
        Self { vref: vref.into() }
    }
}

impl WpBackend for Servoflex {
    fn force(&self, host: &dyn ControlHost, enable: bool) -> Result<(), DriverError> {
        host.set("fw_wp_vref", &self.vref)?;
        host.set("fw_wp_en", "on")?;
        host.set("fw_wp", if enable { "on" } else { "off" })?;
        Ok(())
    }

    fn reset(&self, host: &dyn ControlHost) -> Result<(), DriverError> {
        host.set("fw_wp_en", "off")?;
        Ok(())
    }

    fn state(&self, host: &dyn ControlHost) -> Result<WpState, DriverError> {
        let enabled = host.get("fw_wp_en")? == "on";
        let wp = host.get("fw_wp")? == "on";
        Ok(match (enabled, wp) {
            (true, true) => WpState::ForceOn,
            (true, false) => WpState::ForceOff,
            (false, true) => WpState::On,
            (false, false) => WpState::Off,
        })
    }
}

pub(crate) fn build_servoflex(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let vref = ctx.params.get("fw_wp_vref").unwrap_or("pp1800");
    Ok(Box::new(FwWpState::new(Servoflex::new(vref))))
}

/// WP toggled through the `wp` command of a CCD console
pub struct Ccd {
    console: Arc<Console>,
    status: Regex,
}

impl Ccd {
    pub fn new(console: Arc<Console>) -> Result<Self, DriverError> {
        let status = Regex::new("Flash WP is (enabled|disabled)").map_err(|e| DriverError::Device(e.to_string()))?;
        Ok(Self { console, status })
    }
}

impl WpBackend for Ccd {
    fn force(&self, _host: &dyn ControlHost, enable: bool) -> Result<(), DriverError> {
        let cmd = if enable { "wp on" } else { "wp off" };
        self.console.command(cmd, &[], self.console.timeout())?;
        Ok(())
    }

    /// The console has no notion of handing WP back to the strap
    fn reset(&self, _host: &dyn ControlHost) -> Result<(), DriverError> {
        Ok(())
    }

    fn state(&self, _host: &dyn ControlHost) -> Result<WpState, DriverError> {
        let results = self
            .console
            .command("wp", std::slice::from_ref(&self.status), self.console.timeout())?;
        let word = results
            .first()
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| DriverError::Device("Cannot retrieve wp result on CCD console".to_string()))?;
        Ok(if word == "enabled" {
            WpState::ForceOn
        } else {
            WpState::ForceOff
        })
    }
}

pub(crate) fn build_ccd(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    let console = Console::open(ctx.devices, ctx.index()?, ctx.uart()?)?;
    Ok(Box::new(FwWpState::new(Ccd::new(console)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeUart, RecordingHost};

    #[test]
    fn test_servoflex_force_and_reset() {
        let host = RecordingHost::new();
        let wp = FwWpState::new(Servoflex::new("pp3300"));
        wp.set(&host, &Value::from("force_on")).unwrap();
        wp.set(&host, &Value::from("force_off")).unwrap();
        wp.set(&host, &Value::from("reset")).unwrap();
        assert_eq!(
            host.calls(),
            vec![
                "set fw_wp_vref:pp3300",
                "set fw_wp_en:on",
                "set fw_wp:on",
                "set fw_wp_vref:pp3300",
                "set fw_wp_en:on",
                "set fw_wp:off",
                "set fw_wp_en:off",
            ]
        );
    }

    #[test]
    fn test_servoflex_state() {
        let wp = FwWpState::new(Servoflex::new("pp1800"));
        for (en, line, expected) in [
            ("on", "on", "force_on"),
            ("on", "off", "force_off"),
            ("off", "on", "on"),
            ("off", "off", "off"),
        ] {
            let host = RecordingHost::new();
            host.respond("fw_wp_en", en);
            host.respond("fw_wp", line);
            assert_eq!(wp.get(&host).unwrap(), Value::from(expected));
        }
    }

    #[test]
    fn test_query_states_not_settable() {
        let host = RecordingHost::new();
        let wp = FwWpState::new(Servoflex::new("pp1800"));
        for state in ["on", "off", "sideways"] {
            let err = wp.set(&host, &Value::from(state)).unwrap_err();
            assert!(matches!(err, DriverError::Value(ValueError::InvalidState { .. })));
        }
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_ccd() {
        let uart = Arc::new(FakeUart::new());
        uart.respond("wp", "Flash WP is enabled\n");
        let wp = FwWpState::new(Ccd::new(Arc::new(Console::new(uart.clone()))).unwrap());
        let host = RecordingHost::new();

        assert_eq!(wp.get(&host).unwrap(), Value::from("force_on"));
        wp.set(&host, &Value::from("force_off")).unwrap();
        wp.set(&host, &Value::from("reset")).unwrap();
        assert_eq!(uart.sent(), vec!["wp", "wp off"]);

        uart.respond("wp", "Flash WP is disabled\n");
        assert_eq!(wp.get(&host).unwrap(), Value::from("force_off"));
    }
}

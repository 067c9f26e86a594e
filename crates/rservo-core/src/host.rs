//! Call-back surface for composite drivers
//!
//! Power and write-protect sequences are built out of other controls
//! (`cold_reset`, `pwr_button`, `ec_uart_cmd`, ...). Drivers bound to the
//! `servo` interface receive a [`ControlHost`] and drive those controls by
//! name, exactly as a client would.

use std::time::Duration;

use crate::error::{Result, ValueError};

/// Button hold time for a short press
pub const SHORT_DELAY: Duration = Duration::from_millis(200);
/// Button hold time for a normal press
pub const NORMAL_DELAY: Duration = Duration::from_millis(1200);
/// Button hold time for a long press
pub const LONG_DELAY: Duration = Duration::from_millis(8500);
/// Settle time after a long press, the EC may ignore the next press before it
pub const LONG_PRESS_SETTLE: Duration = Duration::from_secs(1);
/// Extra polls of `pwr_button` waiting for it to read back released
pub const RELEASE_RETRY_MAX: u32 = 5;

/// Get/set controls by name and wait
pub trait ControlHost: Send + Sync {
    /// Formatted value of a control
    fn get(&self, name: &str) -> Result<String>;

    /// Set a control from user text
    fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Block for a calibrated delay
    fn sleep(&self, duration: Duration);
}

/// Convert fractional seconds from a param into a delay
///
/// Negative values clamp to zero. NaN, infinities and delays too long for a
/// [`Duration`] are rejected.
pub fn secs(seconds: f64) -> std::result::Result<Duration, ValueError> {
    if seconds.is_nan() {
        return Err(ValueError::BadDelay(seconds));
    }
    Duration::try_from_secs_f64(seconds.max(0.0)).map_err(|_| ValueError::BadDelay(seconds))
}

/// Hold the power button for `hold`, then wait for it to read released
pub fn power_key(host: &dyn ControlHost, hold: Duration) -> Result<()> {
    log::info!("Pressing power button for {:.4} secs", hold.as_secs_f64());
    host.set("pwr_button", "press")?;
    host.sleep(hold);
    host.set("pwr_button", "release")?;

    let mut retry = 1;
    loop {
        if host.get("pwr_button")? == "release" {
            break;
        }
        if retry > RELEASE_RETRY_MAX {
            log::warn!("pwr_button still not released after {} retries", RELEASE_RETRY_MAX);
            break;
        }
        log::info!("Waiting for pwr_button to release, retry {}", retry);
        retry += 1;
        host.sleep(SHORT_DELAY);
    }
    Ok(())
}

pub fn power_short_press(host: &dyn ControlHost) -> Result<()> {
    power_key(host, SHORT_DELAY)
}

pub fn power_normal_press(host: &dyn ControlHost) -> Result<()> {
    power_key(host, NORMAL_DELAY)
}

pub fn power_long_press(host: &dyn ControlHost) -> Result<()> {
    power_key(host, LONG_DELAY)?;
    host.sleep(LONG_PRESS_SETTLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    #[test]
    fn test_secs_rejects_unrepresentable_delays() {
        assert_eq!(secs(0.25), Ok(Duration::from_millis(250)));
        assert_eq!(secs(-3.0), Ok(Duration::ZERO));
        assert!(secs(f64::INFINITY).is_err());
        assert!(secs(f64::NEG_INFINITY).is_err());
        assert!(secs(f64::NAN).is_err());
        assert!(secs(1e20).is_err());
    }

    #[test]
    fn test_short_press_sequence() {
        let host = RecordingHost::new();
        host.respond("pwr_button", "release");
        power_short_press(&host).unwrap();
        assert_eq!(
            host.calls(),
            vec![
                "set pwr_button:press",
                "sleep 0.2",
                "set pwr_button:release",
                "get pwr_button",
            ]
        );
    }

    #[test]
    fn test_release_poll_is_bounded() {
        let host = RecordingHost::new();
        host.respond("pwr_button", "press");
        power_key(&host, NORMAL_DELAY).unwrap();
        let polls = host.calls().iter().filter(|c| *c == "get pwr_button").count();
        assert_eq!(polls, RELEASE_RETRY_MAX as usize + 1);
    }

    #[test]
    fn test_long_press_settles() {
        let host = RecordingHost::new();
        host.respond("pwr_button", "release");
        power_long_press(&host).unwrap();
        let calls = host.calls();
        assert_eq!(calls[1], "sleep 8.5");
        assert_eq!(calls.last().map(String::as_str), Some("sleep 1"));
    }
}

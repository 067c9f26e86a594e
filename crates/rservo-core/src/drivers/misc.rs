//! Pseudo-controls with no hardware behind them

use super::{unsupported, Driver, DriverContext};
use crate::config::Direction;
use crate::error::DriverError;
use crate::host::{secs, ControlHost};
use crate::value::Value;

/// `drv = "na"`: control that doesn't exist on this board
pub struct NotApplicable;

pub(crate) fn build_na(ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    match ctx.subtype()? {
        "lid_open" => Ok(Box::new(NotApplicable)),
        other => Err(DriverError::UnknownSubtype {
            driver: "na",
            subtype: other.to_string(),
        }),
    }
}

impl Driver for NotApplicable {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        Ok(Value::from("not_applicable"))
    }

    fn set(&self, _host: &dyn ControlHost, _value: &Value) -> Result<(), DriverError> {
        Ok(())
    }
}

/// `drv = "sleep"`: set blocks for the given seconds
pub struct Sleep;

pub(crate) fn build_sleep(_ctx: &DriverContext<'_>) -> Result<Box<dyn Driver>, DriverError> {
    Ok(Box::new(Sleep))
}

impl Driver for Sleep {
    fn get(&self, _host: &dyn ControlHost) -> Result<Value, DriverError> {
        Err(unsupported(Direction::Get, "sleep"))
    }

    fn set(&self, host: &dyn ControlHost, value: &Value) -> Result<(), DriverError> {
        host.sleep(secs(value.as_float()?)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    #[test]
    fn test_not_applicable() {
        let host = RecordingHost::new();
        assert_eq!(NotApplicable.get(&host).unwrap(), Value::from("not_applicable"));
        NotApplicable.set(&host, &Value::Int(1)).unwrap();
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_sleep_goes_through_host() {
        let host = RecordingHost::new();
        Sleep.set(&host, &Value::Float(0.25)).unwrap();
        assert_eq!(host.calls(), vec!["sleep 0.25"]);
        assert!(Sleep.get(&host).is_err());

        assert!(Sleep.set(&host, &Value::from("inf")).is_err());
        assert!(Sleep.set(&host, &Value::Float(1e20)).is_err());
        assert_eq!(host.calls().len(), 1);
    }
}

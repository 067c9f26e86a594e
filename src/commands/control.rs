//! One-shot control commands

use std::io::Write;

use rservo_core::dispatch::Request;
use rservo_core::Dispatcher;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Print `name:value` for every control, stopping at the first failure
pub fn run_get<W: Write>(servo: &Dispatcher, names: &[String], out: &mut W) -> CmdResult {
    for name in names {
        let value = servo.get(name)?;
        writeln!(out, "{}:{}", name, value)?;
    }
    Ok(())
}

/// Apply `name:value` assignments in order
pub fn run_set(servo: &Dispatcher, assignments: &[String]) -> CmdResult {
    for assignment in assignments {
        let Request::Set(name, value) = Request::parse(assignment) else {
            return Err(format!("Expected name:value, got '{}'", assignment).into());
        };
        servo.set(name, value)?;
        log::info!("{} set to {}", name, value.trim());
    }
    Ok(())
}

pub fn run_doc<W: Write>(servo: &Dispatcher, name: &str, out: &mut W) -> CmdResult {
    writeln!(out, "{}", servo.doc(name)?)?;
    Ok(())
}

/// Run the init sequence past any failed step, returning how many failed
pub fn run_hwinit(servo: &Dispatcher) -> usize {
    let failures = servo.hwinit();
    if failures.is_empty() {
        log::info!("Init sequence complete");
    } else {
        log::warn!("Init sequence complete, {} steps failed", failures.len());
    }
    failures.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shell::tests::{dispatcher_with, dummy_dispatcher, DOC};

    #[test]
    fn test_get_and_set() {
        let (servo, _) = dummy_dispatcher();
        run_set(&servo, &["cold_reset:on".to_string(), "pwr_button:press".to_string()]).unwrap();

        let mut out = Vec::new();
        run_get(&servo, &["cold_reset".to_string(), "pwr_button".to_string()], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "cold_reset:on\npwr_button:press\n");
    }

    #[test]
    fn test_set_requires_value() {
        let (servo, _) = dummy_dispatcher();
        let err = run_set(&servo, &["cold_reset".to_string()]).unwrap_err();
        assert!(err.to_string().contains("name:value"));
    }

    #[test]
    fn test_doc_and_hwinit() {
        let (servo, gpio) = dummy_dispatcher();
        let mut out = Vec::new();
        run_doc(&servo, "cold_reset", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Cold reset (active low)\n");

        gpio.set_levels(0);
        assert_eq!(run_hwinit(&servo), 0);
        assert_eq!(gpio.levels() & 0b11, 0b11);
    }

    #[test]
    fn test_hwinit_failure_is_not_fatal() {
        let doc = DOC.replace(r#"init = "release""#, r#"init = "sideways""#);
        let (servo, gpio) = dispatcher_with(&doc);
        gpio.set_levels(0);
        assert_eq!(run_hwinit(&servo), 1);
        assert_eq!(gpio.levels() & 0b01, 0b01);

        let mut out = Vec::new();
        run_get(&servo, &["cold_reset".to_string()], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "cold_reset:off\n");
    }
}

//! Line-oriented request loop
//!
//! Each input line is a `name` (get), `name:value` (set) or `sleep:secs`
//! request. Every line gets exactly one response line: `name:value` for a
//! get, `OK` for a set or sleep, `ERR: reason` on failure. Empty lines and
//! lines starting with `#` are skipped.

use std::io::{BufRead, Write};

use rservo_core::dispatch::Request;
use rservo_core::Dispatcher;

pub fn run_shell<R: BufRead, W: Write>(servo: &Dispatcher, input: R, out: &mut W) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let response = match Request::parse(line) {
            Request::Get(name) => servo.get(name).map(|value| format!("{}:{}", name, value)),
            Request::Set(..) | Request::Sleep(_) => servo.set_get_all(&[line]).map(|_| "OK".to_string()),
        };
        match response {
            Ok(text) => writeln!(out, "{}", text)?,
            Err(err) => {
                log::error!("{}: {}", line, err);
                writeln!(out, "ERR: {}", err)?;
            }
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use rservo_core::{DriverRegistry, Interface, InterfacePool, SystemConfig};
    use rservo_dummy::DummyGpio;

    pub(crate) const DOC: &str = r#"
[[map]]
name = "onoff_i"
params = { on = 0, off = 1 }

[[map]]
name = "press"
params = { press = 0, release = 1 }

[[control]]
name = "cold_reset"
doc = "Cold reset (active low)"
params = { interface = 1, drv = "gpio", offset = 0, map = "onoff_i", init = "off" }

[[control]]
name = "pwr_button"
params = { interface = 1, drv = "gpio", offset = 1, map = "press", init = "release" }
"#;

    pub(crate) fn dummy_dispatcher() -> (Dispatcher, Arc<DummyGpio>) {
        dispatcher_with(DOC)
    }

    pub(crate) fn dispatcher_with(doc: &str) -> (Dispatcher, Arc<DummyGpio>) {
        let mut config = SystemConfig::new();
        config.add_str("shell_test", doc, None).unwrap();
        let gpio = Arc::new(DummyGpio::with_levels("gpio", 0b11));
        let pool = InterfacePool::new(vec![Interface::Gpio(gpio.clone())]);
        let servo = Dispatcher::new(config, pool, DriverRegistry::builtin()).unwrap();
        (servo, gpio)
    }

    #[test]
    fn test_one_response_per_line() {
        let (servo, gpio) = dummy_dispatcher();
        let input = "cold_reset\n\n# comment\ncold_reset:on\ncold_reset\nbogus\nsleep:0\n";
        let mut out = Vec::new();
        run_shell(&servo, input.as_bytes(), &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "cold_reset:off");
        assert_eq!(lines[1], "OK");
        assert_eq!(lines[2], "cold_reset:on");
        assert!(lines[3].starts_with("ERR: "));
        assert_eq!(lines[4], "OK");
        assert_eq!(gpio.levels() & 1, 0);
    }
}

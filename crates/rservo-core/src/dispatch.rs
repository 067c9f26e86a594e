//! Control dispatcher
//!
//! The [`Dispatcher`] owns the loaded catalog, the opened interface pool,
//! the driver registry and the shared device cache. A get or set on a
//! control builds the control's driver on first use (one per control and
//! direction) and keeps it for the life of the dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::config::{ControlDef, Direction, ParamSet, Section, SystemConfig};
use crate::device::DeviceCache;
use crate::drivers::{Driver, DriverContext, DriverRegistry};
use crate::error::{Error, Result, ValueError};
use crate::host::{secs, ControlHost};
use crate::interface::{Interface, InterfacePool};
use crate::value::{parse_number, Value};

/// Interface name binding a driver to the dispatcher itself
pub const SERVO_INTERFACE: &str = "servo";

/// Rendered in place of a value that couldn't be read
pub const ERR_VALUE: &str = "ERR";

/// Source of delays for sequences and `sleep`
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeper that blocks the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A constructed driver and the params it was built from
struct Binding {
    params: Arc<ParamSet>,
    driver: Box<dyn Driver>,
}

/// Where a control's `interface` key points
enum Target {
    Servo,
    Pool(usize, Interface),
}

pub struct Dispatcher {
    config: SystemConfig,
    pool: InterfacePool,
    registry: DriverRegistry,
    devices: DeviceCache,
    sleeper: Box<dyn Sleeper>,
    bindings: Mutex<HashMap<(String, Direction), Arc<Binding>>>,
}

impl Dispatcher {
    /// Create a dispatcher, checking every control against the registry and
    /// the pool.
    ///
    /// All problems are collected into a single [`Error::Validation`].
    pub fn new(config: SystemConfig, pool: InterfacePool, registry: DriverRegistry) -> Result<Self> {
        let dispatcher = Self {
            config,
            pool,
            registry,
            devices: DeviceCache::new(),
            sleeper: Box::new(ThreadSleeper),
            bindings: Mutex::new(HashMap::new()),
        };
        let problems = dispatcher.validate();
        if !problems.is_empty() {
            for problem in &problems {
                log::error!("{}", problem);
            }
            return Err(Error::Validation(problems));
        }
        log::info!(
            "Dispatcher ready: {} controls, {} interfaces",
            dispatcher.config.controls().count(),
            dispatcher.pool.len()
        );
        Ok(dispatcher)
    }

    /// Replace the sleeper used for delays
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn pool(&self) -> &InterfacePool {
        &self.pool
    }

    pub fn devices(&self) -> &DeviceCache {
        &self.devices
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for def in self.config.controls() {
            for direction in [Direction::Get, Direction::Set] {
                if direction == Direction::Set && Arc::ptr_eq(&def.get, &def.set) {
                    continue;
                }
                let params = def.params(direction);
                let check = params
                    .get("drv")
                    .ok_or_else(|| missing_key(def, "drv", direction))
                    .and_then(|drv| match self.registry.contains(drv) {
                        true => Ok(()),
                        false => Err(Error::UnknownDriver {
                            control: def.name.clone(),
                            drv: drv.to_string(),
                        }),
                    })
                    .and_then(|()| self.target(def, params, direction).map(|_| ()));
                if let Err(err) = check {
                    problems.push(format!("{} ({}): {}", def.name, direction, err));
                }
            }
        }
        problems
    }

    fn target(&self, def: &ControlDef, params: &ParamSet, direction: Direction) -> Result<Target> {
        let value = params
            .get("interface")
            .ok_or_else(|| missing_key(def, "interface", direction))?;
        if value == SERVO_INTERFACE {
            return Ok(Target::Servo);
        }
        let index: usize = value.trim().parse().map_err(|_| Error::InvalidInterface {
            control: def.name.clone(),
            value: value.to_string(),
        })?;
        let interface = self.pool.get(index).ok_or_else(|| Error::InterfaceOutOfRange {
            control: def.name.clone(),
            index,
            available: self.pool.len(),
        })?;
        Ok(Target::Pool(index, interface.clone()))
    }

    /// Driver for a control, constructed on first use
    fn bind(&self, def: &ControlDef, direction: Direction) -> Result<Arc<Binding>> {
        let key = (def.name.clone(), direction);
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(binding) = bindings.get(&key) {
            return Ok(binding.clone());
        }

        let params = def.params(direction).clone();
        let drv = params
            .get("drv")
            .ok_or_else(|| missing_key(def, "drv", direction))?;
        let entry = self.registry.get(drv).ok_or_else(|| Error::UnknownDriver {
            control: def.name.clone(),
            drv: drv.to_string(),
        })?;
        let (interface_index, interface) = match self.target(def, &params, direction)? {
            Target::Servo => (None, None),
            Target::Pool(index, interface) => (Some(index), Some(interface)),
        };

        let ctx = DriverContext {
            name: &def.name,
            params: params.clone(),
            interface_index,
            interface,
            devices: &self.devices,
        };
        let driver = (entry.factory)(&ctx).map_err(|source| Error::Driver {
            control: def.name.clone(),
            op: direction,
            source,
        })?;
        log::debug!("Bound {} ({}) to driver '{}'", def.name, direction, drv);

        let binding = Arc::new(Binding { params, driver });
        bindings.insert(key, binding.clone());
        Ok(binding)
    }

    /// Read a control and format it for display
    pub fn get(&self, name: &str) -> Result<String> {
        log::debug!("get {}", name);
        let def = self.config.control(name)?;
        let binding = self.bind(def, Direction::Get)?;
        let raw = binding.driver.get(self).map_err(|source| {
            log::error!("Getting {}: {}", name, source);
            Error::Driver {
                control: name.to_string(),
                op: Direction::Get,
                source,
            }
        })?;
        let formatted = self
            .config
            .format_value(&binding.params, &raw)
            .map_err(|source| Error::Value {
                control: name.to_string(),
                source,
            })?;
        log::debug!("{} = {}", name, formatted);
        Ok(formatted)
    }

    /// Set a control from user text.
    ///
    /// The text is resolved into a value before the driver is built or
    /// touched, so a bad value never reaches the hardware.
    pub fn set(&self, name: &str, text: &str) -> Result<()> {
        log::debug!("set {}:{}", name, text);
        let def = self.config.control(name)?;
        let params = def.params(Direction::Set);
        let text_input = params
            .get("drv")
            .and_then(|drv| self.registry.get(drv))
            .is_some_and(|entry| entry.text_input);
        let value = if text_input {
            Value::Str(text.trim().to_string())
        } else {
            self.config
                .resolve_value(params, text)
                .map_err(|source| Error::Value {
                    control: name.to_string(),
                    source,
                })?
        };

        let binding = self.bind(def, Direction::Set)?;
        binding.driver.set(self, &value).map_err(|source| {
            log::error!("Setting {} -> {}: {}", name, text, source);
            Error::Driver {
                control: name.to_string(),
                op: Direction::Set,
                source,
            }
        })
    }

    pub fn doc(&self, name: &str) -> Result<String> {
        Ok(self.config.doc(name)?.to_string())
    }

    /// Docs and params of every map and control
    pub fn doc_all(&self) -> String {
        self.config.display(None)
    }

    /// Docs and params of the controls only
    pub fn doc_controls(&self) -> String {
        self.config.display(Some(Section::Control))
    }

    /// Apply every `init` value in load order.
    ///
    /// Failures are logged and skipped; the ones that happened are returned.
    pub fn hwinit(&self) -> Vec<Error> {
        let sequence = self.config.init_sequence();
        log::info!("Initializing {} controls", sequence.len());
        let mut failures = Vec::new();
        for (name, value) in sequence {
            log::debug!("init {}:{}", name, value);
            if let Err(err) = self.set(&name, &value) {
                log::warn!("Skipping init of {}: {}", name, err);
                failures.push(err);
            }
        }
        failures
    }

    /// Read every control, `ERR` for the ones that fail.
    ///
    /// Lines are `name:value`, or `GET name = value :: doc` when verbose.
    pub fn get_all(&self, verbose: bool) -> String {
        let mut out = String::new();
        for def in self.config.controls() {
            let value = self.get(&def.name).unwrap_or_else(|err| {
                log::debug!("{}: {}", def.name, err);
                ERR_VALUE.to_string()
            });
            if verbose {
                out.push_str(&format!("GET {} = {} :: {}\n", def.name, value, def.doc));
            } else {
                out.push_str(&format!("{}:{}\n", def.name, value));
            }
        }
        out
    }

    /// Run a list of `name`, `name:value` and `sleep:secs` requests in order.
    ///
    /// Returns one `name:value` line per get; stops at the first failure.
    pub fn set_get_all<S: AsRef<str>>(&self, requests: &[S]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for request in requests {
            match Request::parse(request.as_ref()) {
                Request::Get(name) => out.push(format!("{}:{}", name, self.get(name)?)),
                Request::Sleep(text) => {
                    let delay = parse_number(text)
                        .and_then(|v| v.as_float().ok())
                        .ok_or_else(|| ValueError::WrongType {
                            expected: "seconds",
                            value: text.to_string(),
                        })
                        .and_then(secs)
                        .map_err(|source| Error::Value {
                            control: "sleep".to_string(),
                            source,
                        })?;
                    self.sleeper.sleep(delay);
                }
                Request::Set(name, value) => self.set(name, value)?,
            }
        }
        Ok(out)
    }

    pub fn echo(&self, text: &str) -> String {
        log::debug!("echo({})", text);
        format!("ECH0ING: {}", text)
    }
}

impl ControlHost for Dispatcher {
    fn get(&self, name: &str) -> Result<String> {
        Dispatcher::get(self, name)
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        Dispatcher::set(self, name, value)
    }

    fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool)
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

/// One entry of a batch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Get(&'a str),
    Set(&'a str, &'a str),
    Sleep(&'a str),
}

impl<'a> Request<'a> {
    /// `name` is a get, `name:value` a set, `sleep:secs` a delay
    pub fn parse(text: &'a str) -> Self {
        match text.split_once(':') {
            None => Request::Get(text.trim()),
            Some((name, value)) if name.trim() == "sleep" => Request::Sleep(value.trim()),
            Some((name, value)) => Request::Set(name.trim(), value),
        }
    }
}

fn missing_key(def: &ControlDef, key: &'static str, op: Direction) -> Error {
    Error::MissingKey {
        control: def.name.clone(),
        key,
        op,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, DriverError, ValueError};
    use crate::testing::{FakeGpio, FakeI2c, FakeUart};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Records delays instead of waiting
    #[derive(Clone, Default)]
    struct LogSleeper(Arc<Mutex<Vec<Duration>>>);

    impl Sleeper for LogSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    const DOC: &str = r#"
        [[map]]
        name = "onoff"
        params = { on = 0, off = 1 }

        [[map]]
        name = "onoff_i"
        params = { on = 1, off = 0 }

        [[map]]
        name = "press"
        params = { press = 0, release = 1 }

        [[control]]
        name = "relay"
        doc = "Relay on line 2"
        params = { interface = 1, drv = "gpio", offset = 2, width = 1 }

        [[control]]
        name = "reset_line"
        params = { interface = 1, drv = "gpio", offset = 0, map = "onoff", init = "off" }

        [[control]]
        name = "cold_reset"
        params = { interface = 1, drv = "gpio", offset = 4, map = "onoff_i" }

        [[control]]
        name = "pwr_button"
        params = { interface = 1, drv = "gpio", offset = 5, map = "press", init = "release" }

        [[control]]
        name = "rec_mode"
        params = { interface = 1, drv = "gpio", offset = 6, map = "onoff", init = "off" }

        [[control]]
        name = "power_state"
        params = { interface = "servo", drv = "cros_ec_softrec_power", reset_hold = 0.1, reset_recovery = 0.2 }

        [[control]]
        name = "ec_uart_cmd"
        params = { interface = 3, drv = "uart", subtype = "cmd" }

        [[control]]
        name = "vbus_mv"
        params = { interface = 2, drv = "ina219", slv = 0x40, subtype = "millivolts" }

        [[control]]
        name = "scratch_hex"
        params = { interface = 1, drv = "gpio", offset = 8, width = 8, fmt = "hex" }
    "#;

    fn pool() -> (Arc<FakeGpio>, Arc<FakeI2c>, Arc<FakeUart>, InterfacePool) {
        let gpio = Arc::new(FakeGpio::new(0));
        let i2c = Arc::new(FakeI2c::new());
        let uart = Arc::new(FakeUart::new());
        let pool = InterfacePool::new(vec![
            Interface::Gpio(gpio.clone()),
            Interface::I2c(i2c.clone()),
            Interface::Uart(uart.clone()),
        ]);
        (gpio, i2c, uart, pool)
    }

    fn dispatcher() -> (Dispatcher, Arc<FakeGpio>, Arc<FakeI2c>, LogSleeper) {
        let mut config = SystemConfig::new();
        config.add_str("test", DOC, None).unwrap();
        let (gpio, i2c, _uart, pool) = pool();
        let sleeper = LogSleeper::default();
        let servo = Dispatcher::new(config, pool, DriverRegistry::builtin())
            .unwrap()
            .with_sleeper(sleeper.clone());
        (servo, gpio, i2c, sleeper)
    }

    #[test]
    fn test_relay_merges_into_bank() {
        let (servo, gpio, _, _) = dispatcher();
        gpio.set_levels(0b1_0001);
        servo.set("relay", "1").unwrap();
        assert_eq!(gpio.writes(), vec![(0b100, 0b100)]);
        assert_eq!(gpio.levels(), 0b1_0101);
        assert_eq!(servo.get("relay").unwrap(), "1");
    }

    #[test]
    fn test_map_round_trip() {
        let (servo, gpio, _, _) = dispatcher();
        gpio.set_levels(1);
        servo.set("reset_line", "on").unwrap();
        assert_eq!(gpio.levels() & 1, 0);
        assert_eq!(servo.get("reset_line").unwrap(), "on");
        servo.set("scratch_hex", "0xa5").unwrap();
        assert_eq!(servo.get("scratch_hex").unwrap(), "0xa5");
    }

    #[test]
    fn test_bad_value_never_reaches_bus() {
        let (servo, gpio, _, _) = dispatcher();
        let err = servo.set("reset_line", "sideways").unwrap_err();
        assert!(matches!(
            err,
            Error::Value {
                source: ValueError::UnknownKey { .. },
                ..
            }
        ));
        let err = servo.set("relay", "3").unwrap_err();
        assert!(matches!(err, Error::Driver { op: Direction::Set, .. }));
        assert!(gpio.writes().is_empty());
    }

    #[test]
    fn test_unknown_control() {
        let (servo, _, _, _) = dispatcher();
        assert!(matches!(
            servo.get("nope").unwrap_err(),
            Error::Config(ConfigError::UnknownControl { .. })
        ));
    }

    #[test]
    fn test_bus_error_names_control() {
        let (servo, _, i2c, _) = dispatcher();
        i2c.fail_next();
        let err = servo.get("vbus_mv").unwrap_err();
        assert!(err.to_string().starts_with("Failed to get 'vbus_mv'"));
        assert!(matches!(
            err,
            Error::Driver {
                source: DriverError::Bus(_),
                ..
            }
        ));
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let mut config = SystemConfig::new();
        config
            .add_str(
                "bad",
                r#"
                [[control]]
                name = "a"
                params = { interface = 1, drv = "pca9500" }

                [[control]]
                name = "b"
                params = { interface = 7, drv = "gpio", offset = 0 }

                [[control]]
                name = "c"
                params = { interface = "usb", drv = "gpio", offset = 0 }

                [[control]]
                name = "d"
                params = { interface = 1 }
                "#,
                None,
            )
            .unwrap();
        let (_, _, _, pool) = pool();
        let Err(Error::Validation(problems)) = Dispatcher::new(config, pool, DriverRegistry::builtin()) else {
            panic!("expected validation error");
        };
        assert_eq!(problems.len(), 4);
        assert!(problems[0].contains("pca9500"));
        assert!(problems[1].contains("out of range"));
        assert!(problems[2].contains("'usb'"));
        assert!(problems[3].contains("'drv'"));
    }

    #[test]
    fn test_hwinit_applies_init_values() {
        let (servo, gpio, _, _) = dispatcher();
        assert!(servo.hwinit().is_empty());
        // reset_line off -> 1, pwr_button release -> 1, rec_mode off -> 1
        assert_eq!(gpio.levels(), 0b110_0001);
    }

    #[test]
    fn test_hwinit_continues_past_failures() {
        let mut config = SystemConfig::new();
        config.add_str("test", DOC, None).unwrap();
        config
            .add_str(
                "broken",
                r#"
                [[control]]
                name = "reset_line"
                params = { init = "sideways", clobber_ok = "" }
                "#,
                None,
            )
            .unwrap();
        let (gpio, _, _, pool) = pool();
        let servo = Dispatcher::new(config, pool, DriverRegistry::builtin()).unwrap();
        let failures = servo.hwinit();
        assert_eq!(failures.len(), 1);
        assert_eq!(gpio.levels(), 0b110_0000);
    }

    #[test]
    fn test_power_reset_through_dispatcher() {
        let (servo, gpio, _, sleeper) = dispatcher();
        gpio.set_levels(1 << 5);
        servo.set("power_state", "reset").unwrap();

        let writes = gpio.writes();
        let cold_reset: Vec<u64> = writes
            .iter()
            .filter(|(mask, _)| *mask == 1 << 4)
            .map(|(_, v)| *v >> 4)
            .collect();
        assert_eq!(cold_reset, vec![1, 0]);
        let first_press = writes.iter().position(|(mask, v)| *mask == 1 << 5 && *v == 0);
        let last_cold = writes.iter().rposition(|(mask, _)| *mask == 1 << 4);
        assert!(first_press > last_cold);

        let delays = sleeper.0.lock().unwrap().clone();
        assert_eq!(&delays[..2], &[Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[test]
    fn test_power_state_rejects_bad_state() {
        let (servo, gpio, _, _) = dispatcher();
        let err = servo.set("power_state", "sideways").unwrap_err();
        assert!(err.to_string().contains("on, off, rec, reset"));
        assert!(gpio.writes().is_empty());
        assert!(servo.get("power_state").is_err());
    }

    #[test]
    fn test_get_all_marks_errors() {
        let (servo, _, i2c, _) = dispatcher();
        i2c.fail_next();
        let all = servo.get_all(false);
        assert!(all.contains("relay:0\n"));
        assert!(all.contains("vbus_mv:ERR\n"));
        assert!(all.contains("power_state:ERR\n"));

        let verbose = servo.get_all(true);
        assert!(verbose.contains("GET relay = 0 :: Relay on line 2\n"));
    }

    #[test]
    fn test_set_get_all() {
        let (servo, _, _, sleeper) = dispatcher();
        let out = servo
            .set_get_all(&["relay:1", "sleep:0.5", "relay", "reset_line:on", "reset_line"])
            .unwrap();
        assert_eq!(out, vec!["relay:1", "reset_line:on"]);
        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_millis(500)]);
        assert!(servo.set_get_all(&["sleep:soon"]).is_err());
    }

    #[test]
    fn test_sleep_rejects_endless_delays() {
        let (servo, _, _, sleeper) = dispatcher();
        for request in ["sleep:inf", "sleep:nan", "sleep:1e20", "sleep:1e400"] {
            let err = servo.set_get_all(&[request]).unwrap_err();
            assert!(
                matches!(err, Error::Value { source: ValueError::BadDelay(_), .. }),
                "{}: {}",
                request,
                err
            );
        }
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_parse() {
        assert_eq!(Request::parse("relay"), Request::Get("relay"));
        assert_eq!(Request::parse("relay:1"), Request::Set("relay", "1"));
        assert_eq!(Request::parse("sleep:2"), Request::Sleep("2"));
    }

    #[test]
    fn test_doc_and_echo() {
        let (servo, _, _, _) = dispatcher();
        assert_eq!(servo.doc("relay").unwrap(), "Relay on line 2");
        assert!(servo.doc_all().contains("* CONTROL"));
        assert_eq!(servo.echo("hi"), "ECH0ING: hi");
    }

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    fn counting(ctx: &DriverContext<'_>) -> std::result::Result<Box<dyn Driver>, DriverError> {
        BUILT.fetch_add(1, Ordering::SeqCst);
        crate::drivers::gpio::build(ctx)
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let mut registry = DriverRegistry::builtin();
        registry.register("counting_gpio", counting);
        let mut config = SystemConfig::new();
        config
            .add_str(
                "count",
                r#"
                [[control]]
                name = "line"
                alias = ["line_alias"]
                params = { interface = 1, drv = "counting_gpio", offset = 1 }
                "#,
                None,
            )
            .unwrap();
        let (_, _, _, pool) = pool();
        let servo = Arc::new(Dispatcher::new(config, pool, registry).unwrap());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let servo = servo.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let name = if i % 2 == 0 { "line" } else { "line_alias" };
                    servo.get(name).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "0");
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }
}

//! Interface registry
//!
//! This module handles opening interfaces by name. Adapters that are not
//! compiled in are reported as unknown.

use rservo_core::interface::{Interface, InterfacePool};
use std::collections::HashMap;

/// Parsed interface parameters
#[derive(Debug)]
pub struct InterfaceParams {
    /// Adapter name
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl InterfaceParams {
    /// Parameters in the `(key, value)` form adapter `parse_options` take
    #[allow(dead_code)] // Used in feature-gated code
    fn options(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse an interface string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
///
/// # Example
/// ```ignore
/// let params = parse_interface_params("linux_i2c:bus=1")?;
/// assert_eq!(params.name, "linux_i2c");
/// assert_eq!(params.params.get("bus"), Some(&"1".to_string()));
/// ```
pub fn parse_interface_params(s: &str) -> Result<InterfaceParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err(format!("Missing interface name in '{}'", s).into());
    }

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(InterfaceParams {
        name: name.to_string(),
        params,
    })
}

/// Open the interfaces one `-i` argument names
///
/// Most adapters yield one slot. `dummy` yields the three slots of an
/// emulated servo (GPIO, I2C, UART).
///
/// # Example
/// ```ignore
/// let slots = open_interface("serial:dev=/dev/ttyUSB0,baud=115200")?;
/// assert_eq!(slots.len(), 1);
/// ```
pub fn open_interface(spec: &str) -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    let params = parse_interface_params(spec)?;

    match params.name.as_str() {
        "placeholder" | "none" => Ok(vec![Interface::Placeholder]),

        #[cfg(feature = "dummy")]
        "dummy" | "dummy_servo" => open_dummy(),

        #[cfg(feature = "dummy")]
        "dummy_gpio" | "dummy_i2c" | "dummy_uart" => open_dummy_single(&params),

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" | "linux-gpio" | "gpiochip" => open_linux_gpio(&params),

        #[cfg(feature = "linux-i2c")]
        "linux_i2c" | "linux-i2c" | "i2c-dev" => open_linux_i2c(&params),

        #[cfg(feature = "serial")]
        "serial" | "uart" => open_serial(&params),

        _ => Err(format!("Unknown interface: {}", params.name).into()),
    }
}

/// Open every interface in order and number them from 1
pub fn open_pool<S: AsRef<str>>(specs: &[S]) -> Result<InterfacePool, Box<dyn std::error::Error>> {
    let mut pool = InterfacePool::default();
    for spec in specs {
        let spec = spec.as_ref();
        let slots = open_interface(spec).map_err(|e| format!("Failed to open '{}': {}", spec, e))?;
        for slot in slots {
            log::info!("Interface {}: {:?}", pool.len() + 1, slot);
            pool.push(slot);
        }
    }
    Ok(pool)
}

// Adapter-specific open functions

#[cfg(feature = "dummy")]
fn open_dummy() -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    Ok(rservo_dummy::dummy_servo().interfaces())
}

#[cfg(feature = "dummy")]
fn open_dummy_single(params: &InterfaceParams) -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    use rservo_dummy::{DummyGpio, DummyI2c, DummyUart};
    use std::sync::Arc;

    let name = params.params.get("name").cloned().unwrap_or_else(|| params.name.clone());
    let slot = match params.name.as_str() {
        "dummy_gpio" => {
            let levels = match params.params.get("levels") {
                Some(v) => parse_u64(v).ok_or_else(|| format!("Invalid levels value: {}", v))?,
                None => 0,
            };
            Interface::Gpio(Arc::new(DummyGpio::with_levels(name, levels)))
        }
        "dummy_i2c" => Interface::I2c(Arc::new(DummyI2c::new(name))),
        _ => Interface::Uart(Arc::new(DummyUart::new(name))),
    };
    Ok(vec![slot])
}

#[cfg(feature = "dummy")]
fn parse_u64(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(feature = "linux-gpio")]
fn open_linux_gpio(params: &InterfaceParams) -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    log::info!("Opening Linux GPIO bank...");

    let slot = rservo_linux_gpio::open_linux_gpio(&params.options()).map_err(|e| {
        format!(
            "Failed to open GPIO bank: {}\n\
             Make sure the chip exists and you have read/write permissions.",
            e
        )
    })?;
    Ok(vec![slot])
}

#[cfg(feature = "linux-i2c")]
fn open_linux_i2c(params: &InterfaceParams) -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    log::info!("Opening Linux I2C adapter...");

    let slot = rservo_linux_i2c::open_linux_i2c(&params.options()).map_err(|e| {
        format!(
            "Failed to open I2C adapter: {}\n\
             Make sure i2c-dev is loaded and you have read/write permissions.\n\
             You may need to: sudo usermod -aG i2c $USER",
            e
        )
    })?;
    Ok(vec![slot])
}

#[cfg(feature = "serial")]
fn open_serial(params: &InterfaceParams) -> Result<Vec<Interface>, Box<dyn std::error::Error>> {
    log::info!("Opening serial console...");

    let slot = rservo_serial::open_serial(&params.options())
        .map_err(|e| format!("Failed to open serial console: {}", e))?;
    Ok(vec![slot])
}

// Interface information and listing
/// Information about an interface adapter
pub struct InterfaceInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available adapters (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_interfaces() -> Vec<InterfaceInfo> {
    let mut interfaces = vec![InterfaceInfo {
        name: "placeholder",
        aliases: &["none"],
        description: "Reserved slot owned by another tool",
    }];

    #[cfg(feature = "dummy")]
    interfaces.push(InterfaceInfo {
        name: "dummy",
        aliases: &["dummy_servo"],
        description: "Emulated servo: GPIO bank, I2C bus (INA219, TCA6416, M24C02), EC console",
    });

    #[cfg(feature = "dummy")]
    interfaces.push(InterfaceInfo {
        name: "dummy_gpio",
        aliases: &["dummy_i2c", "dummy_uart"],
        description: "Single emulated interface (name=<label>, levels=<word> for GPIO)",
    });

    #[cfg(feature = "linux-gpio")]
    interfaces.push(InterfaceInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpiochip"],
        description: "Linux GPIO character device lines (dev=/dev/gpiochipN,lines=0-7)",
    });

    #[cfg(feature = "linux-i2c")]
    interfaces.push(InterfaceInfo {
        name: "linux_i2c",
        aliases: &["linux-i2c", "i2c-dev"],
        description: "Linux I2C adapter via i2c-dev (dev=/dev/i2c-N or bus=N)",
    });

    #[cfg(feature = "serial")]
    interfaces.push(InterfaceInfo {
        name: "serial",
        aliases: &["uart"],
        description: "DUT console on a serial port (dev=/dev/ttyUSB0,baud=115200)",
    });

    interfaces
}

/// Generate a short list of adapter names for CLI help
pub fn interface_names_short() -> String {
    let names: Vec<&str> = available_interfaces().iter().map(|i| i.name).collect();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interface_params() {
        let params = parse_interface_params("linux_i2c:bus=1,speed=400").unwrap();
        assert_eq!(params.name, "linux_i2c");
        assert_eq!(params.params.get("bus").map(String::as_str), Some("1"));
        assert_eq!(params.params.len(), 2);

        let params = parse_interface_params("dummy").unwrap();
        assert!(params.params.is_empty());

        assert!(parse_interface_params("serial:dev").is_err());
        assert!(parse_interface_params(":dev=x").is_err());
    }

    #[test]
    fn test_unknown_interface() {
        let err = open_interface("ftdi_gpio").unwrap_err();
        assert!(err.to_string().contains("Unknown interface"));
    }

    #[test]
    fn test_placeholder() {
        let slots = open_interface("placeholder").unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].kind(), "placeholder");
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_pool_numbering() {
        let pool = open_pool(&["dummy", "none", "dummy_gpio:levels=0x5,name=aux"]).unwrap();
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.get(3).map(|i| i.kind()), Some("uart"));
        assert_eq!(pool.get(4).map(|i| i.kind()), Some("placeholder"));
        let Some(Interface::Gpio(aux)) = pool.get(5) else {
            panic!("slot 5 should be a GPIO bank");
        };
        assert_eq!(aux.name(), "aux");
        assert_eq!(aux.read().unwrap(), 0x5);

        assert!(open_pool(&["dummy_gpio:levels=zz"]).is_err());
    }

    #[test]
    fn test_names_listed() {
        let names = interface_names_short();
        assert!(names.starts_with("placeholder"));
        #[cfg(feature = "dummy")]
        assert!(names.contains("dummy"));
    }
}

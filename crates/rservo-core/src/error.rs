//! Error types for rservo-core
//!
//! Errors are layered the same way requests flow through the engine:
//! [`BusError`] comes from an interface, [`ValueError`] from value
//! conversion, [`DriverError`] from a driver, and [`Error`] is what the
//! [`Dispatcher`](crate::Dispatcher) hands back with the control name and
//! operation attached.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Direction;

/// Errors raised while loading or querying control documents
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a document from disk
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid TOML or doesn't match the schema
    #[error("Failed to parse config '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// Named document not found
    #[error("Unable to find config '{name}' (from '{origin}')")]
    NotFound { name: String, origin: String },

    /// A map or control without a name
    #[error("{kind} in '{origin}' has no name")]
    MissingName { kind: &'static str, origin: String },

    /// Name collides with a built-in
    #[error("'{0}' is a reserved name. Choose another.")]
    ReservedName(String),

    /// Redefinition without `clobber_ok`
    #[error("Duplicate {kind} '{name}' without 'clobber_ok' key (in '{origin}')")]
    Duplicate {
        kind: &'static str,
        name: String,
        origin: String,
    },

    /// Control with the wrong combination of params/get/set tables
    #[error("Control '{name}' must have either 'params' or both 'get' and 'set'")]
    IllegalParams { name: String },

    /// Map entry that isn't an integer
    #[error("Map '{map}' value for '{key}' is not an integer: '{value}'")]
    BadMapValue {
        map: String,
        key: String,
        value: String,
    },

    /// Alias or remap target collides with another control
    #[error("Alias '{alias}' of control '{name}' collides with an existing control")]
    AliasCollision { alias: String, name: String },

    /// No control by that name
    #[error("No control named '{name}'. Valid controls: {valid}")]
    UnknownControl { name: String, valid: String },
}

/// Errors converting between user text, logical values and hardware values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// Logical value has bits outside the field once shifted
    #[error("Value 0x{value:x} asserts bits outside mask 0x{mask:x}")]
    OutsideMask { value: u64, mask: u64 },

    /// Bit field doesn't fit in 64 bits
    #[error("Bit field offset {offset} width {width} doesn't fit in 64 bits")]
    BadField { offset: u32, width: u32 },

    /// Text with no numeric meaning and no map to resolve it
    #[error("No map for control but value '{0}' is a string")]
    NoMap(String),

    /// Map named by a control doesn't exist
    #[error("Map '{0}' isn't defined")]
    UndefinedMap(String),

    /// Map exists but doesn't contain the key
    #[error("Map '{map}' doesn't contain key '{key}'. Valid keys: {valid}")]
    UnknownKey {
        map: String,
        key: String,
        valid: String,
    },

    /// `fmt` param names no known formatter
    #[error("Unrecognized format '{0}'")]
    UnknownFormat(String),

    /// Value of the wrong kind for the control
    #[error("Expected {expected}, got '{value}'")]
    WrongType {
        expected: &'static str,
        value: String,
    },

    /// Value outside the accepted range
    #[error("Value {value} out of range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },

    /// Unsigned value beyond the signed integer range
    #[error("Value {0} too large")]
    TooLarge(u64),

    /// Delay that can't be waited for
    #[error("Invalid delay {0} seconds")]
    BadDelay(f64),

    /// Value too large for the target register
    #[error("Value 0x{value:x} too large for {bytes}-byte register")]
    RegisterOverflow { value: u64, bytes: usize },

    /// Not one of a state machine's settable states
    #[error("Invalid state '{value}'. Valid states: {valid}")]
    InvalidState { value: String, valid: String },
}

/// Errors raised by an interface at the byte level
#[derive(Debug, Error)]
pub enum BusError {
    /// I2C transaction failed or was NAKed
    #[error("I2C transfer to 0x{addr:02x} failed: {reason}")]
    I2c { addr: u8, reason: String },

    /// GPIO line access failed
    #[error("GPIO access failed: {0}")]
    Gpio(String),

    /// UART console access failed
    #[error("UART access failed: {0}")]
    Uart(String),

    /// Console didn't answer in time
    #[error("Timeout waiting for response to '{0}'")]
    Timeout(String),

    /// Adapter-specific failure
    #[error(transparent)]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by a driver while servicing a get or set
#[derive(Debug, Error)]
pub enum DriverError {
    /// Required parameter absent
    #[error("Missing required param '{0}'")]
    MissingParam(&'static str),

    /// Parameter present but malformed
    #[error("Invalid value for param '{key}': '{value}'")]
    InvalidParam { key: &'static str, value: String },

    /// Multi-behavior driver without a `subtype`
    #[error("Unable to find subtype param")]
    MissingSubtype,

    /// `subtype` names no behavior of this driver
    #[error("Unknown subtype '{subtype}' for driver '{driver}'")]
    UnknownSubtype { driver: &'static str, subtype: String },

    /// Operation not offered by the driver or board
    #[error("{op} not supported by {what}")]
    Unsupported { op: Direction, what: String },

    /// Interface slot is of the wrong kind
    #[error("Interface {index} is not a {expected} interface")]
    WrongInterface { index: usize, expected: &'static str },

    /// Calibration retries exhausted
    #[error("Failed to calibrate: {0}")]
    Calibration(String),

    /// Device-level constraint violated
    #[error("{0}")]
    Device(String),

    /// Bus failure
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Value conversion failure
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Failure of a control invoked by a composite driver
    #[error(transparent)]
    Nested(Box<Error>),
}

impl From<Error> for DriverError {
    fn from(err: Error) -> Self {
        DriverError::Nested(Box::new(err))
    }
}

/// Errors returned by the dispatcher
#[derive(Debug, Error)]
pub enum Error {
    /// Config load or lookup failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `drv` names no registered driver
    #[error("Unknown driver '{drv}' for control '{control}'")]
    UnknownDriver { control: String, drv: String },

    /// Mandatory key absent from a parameter set
    #[error("No '{key}' param for control '{control}' ({op})")]
    MissingKey {
        control: String,
        key: &'static str,
        op: Direction,
    },

    /// `interface` isn't a number or `servo`
    #[error("Invalid interface '{value}' for control '{control}'")]
    InvalidInterface { control: String, value: String },

    /// `interface` beyond the opened pool
    #[error("Interface {index} for control '{control}' out of range (have {available})")]
    InterfaceOutOfRange {
        control: String,
        index: usize,
        available: usize,
    },

    /// Driver failed
    #[error("Failed to {op} '{control}': {source}")]
    Driver {
        control: String,
        op: Direction,
        #[source]
        source: DriverError,
    },

    /// User value couldn't be resolved or formatted
    #[error("Invalid value for '{control}': {source}")]
    Value {
        control: String,
        #[source]
        source: ValueError,
    },

    /// Eager validation found problems in the loaded config
    #[error("Invalid configuration:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, Error>;

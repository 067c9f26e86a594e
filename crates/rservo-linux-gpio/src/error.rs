//! Error types for Linux GPIO banks

use rservo_core::error::BusError;
use thiserror::Error;

/// Linux GPIO bank specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request GPIO lines
    #[error("Failed to request GPIO lines on '{path}': {source}")]
    LineRequestFailed {
        path: String,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to set GPIO line value
    #[error("Failed to set GPIO line {line}: {source}")]
    SetValueFailed {
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to get GPIO line value
    #[error("Failed to get GPIO line {line}: {source}")]
    GetValueFailed {
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to switch lines to output
    #[error("Failed to reconfigure GPIO lines: {0}")]
    ReconfigureFailed(#[source] gpiocdev::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,

    /// More lines than bits in a bank word
    #[error("A bank holds at most 64 lines, got {0}")]
    TooManyLines(usize),
}

impl From<LinuxGpioError> for BusError {
    fn from(err: LinuxGpioError) -> Self {
        BusError::Gpio(err.to_string())
    }
}

/// Result type for Linux GPIO bank operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;

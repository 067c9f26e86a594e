//! Error types for Linux I2C operations

use rservo_core::error::BusError;
use thiserror::Error;

/// Linux I2C specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to query adapter functionality
    #[error("Failed to query adapter functionality: {0}")]
    FuncsFailed(#[source] std::io::Error),

    /// Adapter cannot issue plain I2C messages
    #[error("{0} does not support plain I2C transfers")]
    Unsupported(String),

    /// Transfer failed (usually a NAK)
    #[error("transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Message longer than an i2c_msg can carry
    #[error("transfer of {0} bytes is too long")]
    TooLong(usize),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device not specified
    #[error("No device specified. Use dev=/dev/i2c-N or bus=N")]
    NoDevice,
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;

/// Attach the target address to a transfer failure
pub(crate) fn bus_error(addr: u8, err: LinuxI2cError) -> BusError {
    BusError::I2c {
        addr,
        reason: err.to_string(),
    }
}

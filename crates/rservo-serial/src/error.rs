//! Error types for serial console operations

use rservo_core::error::BusError;
use thiserror::Error;

/// Serial console specific errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// Failed to open the port
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    PortError(#[from] serialport::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for serial console operations
pub type Result<T> = std::result::Result<T, SerialError>;

impl From<SerialError> for BusError {
    fn from(err: SerialError) -> Self {
        BusError::Uart(err.to_string())
    }
}

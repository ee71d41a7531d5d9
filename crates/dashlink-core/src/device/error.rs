//! Device errors

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the dashboard device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Serial port error: {0}")]
    SerialError(#[from] tokio_serial::Error),

    #[error("Not connected to device")]
    NotConnected,

    #[error("Another open attempt is already in progress")]
    OpenInProgress,

    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("Device closed the connection")]
    Disconnected,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

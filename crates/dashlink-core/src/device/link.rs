//! Device link abstraction
//!
//! The channel only needs an async byte pipe, so real serial ports and
//! in-memory test doubles plug in behind the same seam.

use tokio::io::{AsyncRead, AsyncWrite};

use super::DeviceError;

/// Bidirectional byte stream to the dashboard
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialLink for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Where and how fast to talk to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub device_id: String,
    /// Baud rate
    pub baud_rate: u32,
}

/// Factory for device links
pub trait Connector: Send + Sync + 'static {
    /// Open a fresh link to the device
    fn connect(&self, settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError>;
}

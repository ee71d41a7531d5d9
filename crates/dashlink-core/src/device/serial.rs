//! Serial port handling
//!
//! Opens the dashboard's serial port through `tokio-serial` and enumerates
//! candidate ports for diagnostics.

use std::collections::BTreeMap;
use std::fmt;
#[cfg(target_os = "linux")]
use std::fs;

use serialport::SerialPortType;
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::debug;

use super::{Connector, DeviceError, SerialLink, SerialSettings};

/// A candidate dashboard port, as shown in open-failure diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// Name to put in the `port` config key
    pub name: String,
    /// USB `(vendor, product)` IDs, if it is a USB adapter
    pub usb_id: Option<(u16, u16)>,
    /// USB product string
    pub product: Option<String>,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match (self.usb_id, &self.product) {
            (Some((vid, pid)), Some(product)) => {
                write!(f, " [{:04x}:{:04x} {}]", vid, pid, product)
            }
            (Some((vid, pid)), None) => write!(f, " [{:04x}:{:04x}]", vid, pid),
            (None, _) => Ok(()),
        }
    }
}

/// CDC-ACM boards first, then USB-serial adapters, then everything else
fn port_rank(name: &str) -> (u8, usize, &str) {
    let base = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0, "ttyACM"), (1, "ttyUSB")] {
        if let Some(index) = base.strip_prefix(prefix) {
            return (rank, index.parse().unwrap_or(usize::MAX), base);
        }
    }
    (2, 0, base)
}

fn sort_ports(ports: impl IntoIterator<Item = PortInfo>) -> Vec<PortInfo> {
    // Dedupe by name, keeping the first (richest) entry
    let mut by_name = BTreeMap::new();
    for port in ports {
        by_name.entry(port.name.clone()).or_insert(port);
    }
    let mut ports: Vec<PortInfo> = by_name.into_values().collect();
    ports.sort_by(|a, b| port_rank(&a.name).cmp(&port_rank(&b.name)));
    ports
}

/// Enumerate serial ports the dashboard could be attached to.
///
/// Blocks on the OS device scan; keep it off hot paths.
pub fn list_ports() -> Vec<PortInfo> {
    let found = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: info.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
            },
            _ => PortInfo {
                name: info.port_name,
                ..Default::default()
            },
        });

    // CDC adapters without udev metadata still show up in /dev
    #[cfg(target_os = "linux")]
    let found = found.chain(
        fs::read_dir("/dev")
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
            .map(|name| PortInfo {
                name: format!("/dev/{}", name),
                ..Default::default()
            }),
    );

    sort_ports(found)
}

/// Open the dashboard port as 8N1 without flow control
pub fn open_port(settings: &SerialSettings) -> Result<SerialStream, DeviceError> {
    let mut port = tokio_serial::new(&settings.device_id, settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    // Keep DTR asserted so Arduino/ESP32 boards are not reset by the open
    if let Err(e) = port.write_data_terminal_ready(true) {
        debug!("Failed to set DTR high on {}: {} (continuing)", settings.device_id, e);
    }

    Ok(port)
}

/// Connector backed by real serial hardware
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialConnector;

impl Connector for TokioSerialConnector {
    fn connect(&self, settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError> {
        Ok(Box::new(open_port(settings)?))
    }
}

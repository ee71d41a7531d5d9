//! Dashboard Device
//!
//! Serial output side of the bridge: the channel that owns the port, the
//! connector seam that opens it, and the supervisor that re-acquires it.

mod channel;
mod error;
mod link;
pub mod serial;
mod supervisor;

pub use channel::{ChannelState, DeviceEvent, SerialChannel};
pub use error::DeviceError;
pub use link::{Connector, SerialLink, SerialSettings};
pub use serial::{list_ports, PortInfo, TokioSerialConnector};
pub use supervisor::ReconnectSupervisor;

use std::time::Duration;

/// Fixed period between reconnect attempts
pub const RECONNECT_PERIOD: Duration = Duration::from_secs(2);

/// Upper bound for writing one frame to the device
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Capacity of the failure notification queue
pub const DEVICE_EVENT_CAPACITY: usize = 8;

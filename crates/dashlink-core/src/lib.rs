//! # dashlink Core Library
//!
//! Streams machine telemetry from a server-sent event feed to a
//! serial-attached gauge dashboard.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Self-reconnecting event-stream ingestion
//! - Frame assembly and metric normalization
//! - Serial output with automatic device re-acquisition
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dashlink_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Arc::new(BridgeConfig::from_file("dashlink.conf")?);
//! let cancel = CancellationToken::new();
//! Bridge::new(config).run(TokioSerialConnector, cancel).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod device;
pub mod forward;
pub mod normalize;
pub mod stream;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{Bridge, BridgeError};
    pub use crate::config::{BridgeConfig, ConfigError};
    pub use crate::device::{
        ChannelState, Connector, DeviceError, ReconnectSupervisor, SerialChannel, SerialSettings,
        TokioSerialConnector,
    };
    pub use crate::forward::{ForwardOutcome, ForwardStats, ForwardingLoop};
    pub use crate::normalize::{Ceilings, MetricClass, MetricSample};
    pub use crate::stream::{DataFrame, MessageAssembler, RawLine, StreamEvent, StreamReader};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

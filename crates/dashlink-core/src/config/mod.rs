//! Bridge configuration
//!
//! Loaded once at startup from a plain `key = value` text file and shared
//! read-only with every component afterwards.
//!
//! ```text
//! # telemetry source
//! url = http://192.168.1.20:8080/sse
//! port = /dev/ttyUSB0
//! baud = 115200
//! max_temp = 100
//! max_speed = 5000
//! # seconds of stream silence before reconnecting, 0 waits forever
//! idle_timeout = 30
//! ```

mod error;

pub use error::ConfigError;

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::normalize::Ceilings;
use crate::stream::IDLE_TIMEOUT;

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Telemetry event-stream endpoint
    pub endpoint_url: String,
    /// Serial device name (e.g., "/dev/ttyUSB0" or "COM3")
    pub device_id: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Temperature ceiling used for the temperature metric class
    pub max_temperature: u32,
    /// Speed ceiling used for the speed and fine-speed metric classes
    pub max_speed: u32,
    /// Allowed silence on the event stream; `None` never times out
    pub stream_idle_timeout: Option<Duration>,
}

impl BridgeConfig {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from `key = value` text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let mut url = None;
        let mut device = None;
        let mut baud = None;
        let mut max_temp = None;
        let mut max_speed = None;
        let mut idle = None;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Syntax {
                line: idx + 1,
                text: line.to_string(),
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = unquote(value.trim()).to_string();

            match key.as_str() {
                "url" | "endpoint" => url = Some(value),
                "port" | "device" | "com" => device = Some(value),
                "baud" | "baud_rate" => baud = Some(value),
                "max_temp" | "max_temperature" => max_temp = Some(value),
                "max_speed" => max_speed = Some(value),
                "idle_timeout" => idle = Some(value),
                _ => warn!("Ignoring unknown config key '{}' at line {}", key, idx + 1),
            }
        }

        let endpoint_url = url.filter(|v| !v.is_empty()).ok_or(ConfigError::Missing("url"))?;
        if !(endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "url",
                value: endpoint_url,
            });
        }
        let device_id = device
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("port"))?;

        let config = Self {
            endpoint_url,
            device_id,
            baud_rate: parse_positive("baud", baud)?,
            max_temperature: parse_positive("max_temp", max_temp)?,
            max_speed: parse_positive("max_speed", max_speed)?,
            stream_idle_timeout: parse_idle_timeout(idle)?,
        };
        Ok(config)
    }

    /// Normalization ceilings derived from this configuration
    pub fn ceilings(&self) -> Ceilings {
        Ceilings {
            max_temperature: f64::from(self.max_temperature),
            max_speed: f64::from(self.max_speed),
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_positive(key: &'static str, value: Option<String>) -> Result<u32, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(key))?;
    let parsed: i64 = value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.clone(),
    })?;
    if parsed <= 0 {
        return Err(ConfigError::NonPositive(key));
    }
    u32::try_from(parsed).map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_idle_timeout(value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = value else {
        return Ok(Some(IDLE_TIMEOUT));
    };
    let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
        key: "idle_timeout",
        value,
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

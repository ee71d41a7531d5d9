//! Bridge runtime
//!
//! Wires the stream reader, forwarding loop, serial channel and reconnect
//! supervisor together and tears them down on cancellation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::BridgeConfig;
use crate::device::{
    Connector, ReconnectSupervisor, SerialChannel, SerialSettings, RECONNECT_PERIOD,
};
use crate::forward::{ForwardStats, ForwardingLoop};
use crate::stream::{StreamError, StreamReader, EVENT_CHANNEL_CAPACITY, RETRY_DELAY};

/// Failures that prevent the pipeline from starting
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to set up telemetry stream: {0}")]
    Stream(#[from] StreamError),
}

/// The telemetry-to-dashboard pipeline
pub struct Bridge {
    config: Arc<BridgeConfig>,
    http_client: Option<reqwest::Client>,
    stream_retry_delay: Duration,
    reconnect_period: Duration,
}

impl Bridge {
    /// Create a bridge for a validated configuration
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            config,
            http_client: None,
            stream_retry_delay: RETRY_DELAY,
            reconnect_period: RECONNECT_PERIOD,
        }
    }

    /// Use a preconfigured HTTP client for the event stream
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Override the delay between stream reconnects
    pub fn with_stream_retry_delay(mut self, delay: Duration) -> Self {
        self.stream_retry_delay = delay;
        self
    }

    /// Override the serial reconnect period
    pub fn with_reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = period;
        self
    }

    /// Run until `cancel` fires.
    ///
    /// Transport and device failures are handled internally; the only error
    /// is failing to build the HTTP client.
    pub async fn run(
        self,
        connector: impl Connector,
        cancel: CancellationToken,
    ) -> Result<ForwardStats, BridgeError> {
        let config = self.config;
        let reader = match self.http_client {
            Some(client) => StreamReader::with_client(client, config.endpoint_url.clone()),
            None => StreamReader::new(config.endpoint_url.clone())?,
        }
        .with_retry_delay(self.stream_retry_delay)
        .with_idle_timeout(config.stream_idle_timeout);

        let settings = SerialSettings {
            device_id: config.device_id.clone(),
            baud_rate: config.baud_rate,
        };
        let (channel, device_events) = SerialChannel::new(settings, connector);
        let supervisor = ReconnectSupervisor::new(Arc::clone(&channel), device_events)
            .with_period(self.reconnect_period)
            .spawn(cancel.child_token());

        // A failed first open is logged and handed to the supervisor
        let _ = channel.open().await;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader_task = reader.spawn(tx, cancel.child_token());

        info!(
            url = %config.endpoint_url,
            device = %config.device_id,
            "Bridge running"
        );
        let stats = ForwardingLoop::new(Arc::clone(&channel), config.ceilings())
            .run(rx, cancel.clone())
            .await;

        cancel.cancel();
        join("reconnect supervisor", supervisor).await;
        join("stream reader", reader_task).await;
        channel.close().await;
        info!("Bridge stopped");

        Ok(stats)
    }
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if e.is_panic() {
            error!("{} panicked: {}", name, e);
        }
    }
}

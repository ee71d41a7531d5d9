//! Reconnect supervisor
//!
//! Waits for failure notifications from a [`SerialChannel`] and retries
//! `open()` on a fixed period until the device is back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelState, DeviceError, DeviceEvent, SerialChannel, RECONNECT_PERIOD};

/// Periodic re-acquisition driver for the serial channel
pub struct ReconnectSupervisor {
    channel: Arc<SerialChannel>,
    events: mpsc::Receiver<DeviceEvent>,
    period: Duration,
}

impl ReconnectSupervisor {
    /// Supervise `channel`, listening on the receiver returned by [`SerialChannel::new`]
    pub fn new(channel: Arc<SerialChannel>, events: mpsc::Receiver<DeviceEvent>) -> Self {
        Self {
            channel,
            events,
            period: RECONNECT_PERIOD,
        }
    }

    /// Override the retry period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run the supervisor on its own task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Serve notifications until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => {
                    if event.is_none() {
                        break;
                    }
                }
            }

            // Notifications raised while retrying are stale once the device is
            // back; only the channel state decides whether to retry again.
            while self.channel.state() == ChannelState::Faulted {
                if !self.retry_until_open(&cancel).await {
                    debug!("Reconnect supervisor stopped");
                    return;
                }
                while self.events.try_recv().is_ok() {}
            }
        }
        debug!("Reconnect supervisor stopped");
    }

    /// Tick until the channel opens. Returns false if cancelled.
    async fn retry_until_open(&mut self, cancel: &CancellationToken) -> bool {
        warn!(
            device = %self.channel.settings().device_id,
            "Serial device unavailable, retrying every {:?}", self.period
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = ticker.tick() => {}
            }

            // Closed deliberately while we were waiting
            if self.channel.state() == ChannelState::Closed {
                return true;
            }

            attempt += 1;
            match self.channel.open().await {
                Ok(()) => {
                    info!(attempts = attempt, "Serial device re-acquired");
                    return true;
                }
                Err(DeviceError::OpenInProgress) => {
                    debug!("Open already in progress, skipping attempt {}", attempt)
                }
                Err(e) => debug!("Reconnect attempt {} failed: {}", attempt, e),
            }
        }
    }
}

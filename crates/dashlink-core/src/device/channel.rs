//! Serial channel
//!
//! Owns the device link and its `Closed`/`Open`/`Faulted` state. Failures
//! flip the state to `Faulted` and post a [`DeviceEvent`] so the reconnect
//! supervisor can take over; a deliberate [`SerialChannel::close`] does not.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, Level};

use super::serial::list_ports;
use super::{
    Connector, DeviceError, SerialLink, SerialSettings, DEVICE_EVENT_CAPACITY, WRITE_TIMEOUT,
};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_FAULTED: u8 = 2;

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not open, and nobody is trying to open it
    Closed,
    /// Link is up
    Open,
    /// Lost or never acquired because of an error; reconnect pending
    Faulted,
}

impl ChannelState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_OPEN => ChannelState::Open,
            STATE_FAULTED => ChannelState::Faulted,
            _ => ChannelState::Closed,
        }
    }
}

/// Notification posted by the channel on every failure transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The channel entered `Faulted`
    Faulted,
}

type LinkWriter = WriteHalf<Box<dyn SerialLink>>;
type LinkReader = ReadHalf<Box<dyn SerialLink>>;

/// Clears the open-in-progress flag even if the open future is dropped
struct OpenGuard<'a>(&'a AtomicBool);

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Serial connection to the dashboard device
pub struct SerialChannel {
    settings: SerialSettings,
    connector: Box<dyn Connector>,
    state: AtomicU8,
    opening: AtomicBool,
    /// Bumped on every open and close; device readers only fault their own generation
    generation: AtomicU64,
    writer: Mutex<Option<LinkWriter>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    events: mpsc::Sender<DeviceEvent>,
    write_timeout: Duration,
}

impl SerialChannel {
    /// Create a closed channel and the receiver for its failure notifications
    pub fn new(
        settings: SerialSettings,
        connector: impl Connector,
    ) -> (Arc<Self>, mpsc::Receiver<DeviceEvent>) {
        let (events, rx) = mpsc::channel(DEVICE_EVENT_CAPACITY);
        let channel = Self {
            settings,
            connector: Box::new(connector),
            state: AtomicU8::new(STATE_CLOSED),
            opening: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            writer: Mutex::new(None),
            reader_task: StdMutex::new(None),
            events,
            write_timeout: WRITE_TIMEOUT,
        };
        (Arc::new(channel), rx)
    }

    /// Port settings this channel opens with
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        ChannelState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// True if frames can be written
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Try to acquire the device.
    ///
    /// Only one open may run at a time; a concurrent caller gets
    /// [`DeviceError::OpenInProgress`]. On failure the channel becomes
    /// `Faulted` and a [`DeviceEvent`] is posted.
    pub async fn open(self: &Arc<Self>) -> Result<(), DeviceError> {
        if self
            .opening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DeviceError::OpenInProgress);
        }
        let _guard = OpenGuard(&self.opening);

        if self.is_open() {
            return Ok(());
        }

        let link = match self.connector.connect(&self.settings) {
            Ok(link) => link,
            Err(e) => {
                error!(
                    device = %self.settings.device_id,
                    "Failed to open serial device: {}", e
                );
                if tracing::enabled!(Level::DEBUG) {
                    let ports: Vec<String> = list_ports().iter().map(|p| p.to_string()).collect();
                    debug!("Available serial ports: {}", ports.join(", "));
                }
                self.state.store(STATE_FAULTED, Ordering::Release);
                self.notify();
                return Err(e);
            }
        };

        let (read_half, write_half) = tokio::io::split(link);
        *self.writer.lock().await = Some(write_half);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.store(STATE_OPEN, Ordering::Release);

        let task = tokio::spawn(Arc::clone(self).read_device(read_half, generation));
        if let Some(stale) = self.lock_reader_task().replace(task) {
            stale.abort();
        }

        info!(
            device = %self.settings.device_id,
            baud = self.settings.baud_rate,
            "Serial device opened"
        );
        Ok(())
    }

    /// Write one frame. A failed or timed-out write faults the channel.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        if !self.is_open() {
            return Err(DeviceError::NotConnected);
        }
        let generation = self.generation.load(Ordering::Acquire);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(DeviceError::NotConnected)?;
        let result = tokio::time::timeout(self.write_timeout, async {
            writer.write_all(bytes).await?;
            writer.flush().await
        })
        .await;

        let err = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => DeviceError::IoError(e),
            Err(_) => DeviceError::WriteTimeout(self.write_timeout),
        };
        drop(guard);

        self.fault(generation, &err).await;
        Err(err)
    }

    /// Release the device for shutdown. Does not trigger a reconnect.
    pub async fn close(&self) {
        let previous = self.state.swap(STATE_CLOSED, Ordering::AcqRel);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.writer.lock().await.take();
        if let Some(task) = self.lock_reader_task().take() {
            task.abort();
        }
        if previous == STATE_OPEN {
            info!(device = %self.settings.device_id, "Serial device closed");
        }
    }

    /// Move `Open -> Faulted` for the given generation and notify the supervisor
    async fn fault(&self, generation: u64, err: &DeviceError) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_FAULTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        error!(device = %self.settings.device_id, "Serial device error: {}", err);
        self.writer.lock().await.take();
        self.notify();
        if let Some(task) = self.lock_reader_task().take() {
            task.abort();
        }
    }

    fn notify(&self) {
        // A full queue already holds a pending notification
        if let Err(mpsc::error::TrySendError::Closed(_)) =
            self.events.try_send(DeviceEvent::Faulted)
        {
            debug!("No reconnect supervisor listening for device events");
        }
    }

    fn lock_reader_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain whatever the device sends back until the link fails
    async fn read_device(self: Arc<Self>, mut reader: LinkReader, generation: u64) {
        let mut buf = [0u8; 256];
        let err = loop {
            match reader.read(&mut buf).await {
                Ok(0) => break DeviceError::Disconnected,
                Ok(n) => trace!("Device sent {:?}", String::from_utf8_lossy(&buf[..n])),
                Err(e) => break DeviceError::IoError(e),
            }
        };
        self.fault(generation, &err).await;
    }
}

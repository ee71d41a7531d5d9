//! Event stream reader
//!
//! Keeps one HTTP event stream open for the life of the process and
//! reconnects after any failure, including a clean end of the body.
//!
//! Lines are split on raw bytes and decoded lossily, so a stray non-UTF-8
//! byte costs at most one reading, never the connection. An established
//! stream that stays silent longer than the idle timeout (30 s unless
//! configured otherwise) is treated as dead and reconnected. Feeds that go
//! quiet for long stretches without keep-alive comments should raise or
//! disable it with [`StreamReader::with_idle_timeout`].

use std::borrow::Cow;
use std::io;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader as BodyReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{RawLine, StreamError, StreamEvent, IDLE_TIMEOUT, MAX_LINE_LENGTH, RETRY_DELAY};

/// Timeout for establishing the TCP/TLS connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest server error body kept for the log
const MAX_ERROR_BODY: usize = 512;

/// Reader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Request in flight
    Connecting,
    /// Response body is being consumed
    Streaming,
    /// Waiting before the next attempt
    Backoff,
}

/// Self-reconnecting consumer of the telemetry event stream
pub struct StreamReader {
    client: reqwest::Client,
    url: String,
    retry_delay: Duration,
    idle_timeout: Option<Duration>,
    state: ReaderState,
}

impl StreamReader {
    /// Create a reader with its own HTTP client
    pub fn new(url: impl Into<String>) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dashlink/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    /// Create a reader that uses an existing HTTP client
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            retry_delay: RETRY_DELAY,
            idle_timeout: Some(IDLE_TIMEOUT),
            state: ReaderState::Connecting,
        }
    }

    /// Override the delay between connection attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override how long an established stream may stay silent.
    ///
    /// `None` waits for data indefinitely.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Run the reader on its own task
    pub fn spawn(
        self,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    /// Stream forever, reconnecting on failure.
    ///
    /// Returns only when `cancel` fires or the receiving side is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) {
        loop {
            self.state = ReaderState::Connecting;
            info!(url = %self.url, "Requesting telemetry event stream");

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.stream_once(&tx) => result,
            };
            let err = result.err().unwrap_or(StreamError::Ended);

            if let StreamError::ConsumerGone = err {
                debug!("Frame consumer gone, stopping stream reader");
                break;
            }
            error!(kind = err.kind(), "Telemetry stream failed: {}", err);

            self.state = ReaderState::Backoff;
            debug!("Reconnecting in {:?}", self.retry_delay);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
        debug!("Stream reader stopped");
    }

    /// One connection lifetime. `Ok(())` means the server ended the body.
    async fn stream_once(&mut self, tx: &mpsc::Sender<StreamEvent>) -> Result<(), StreamError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(StreamError::Status { status, body });
        }

        self.state = ReaderState::Streaming;
        info!(%status, "Telemetry stream connected");
        send(tx, StreamEvent::Connected).await?;

        let body = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(io::Error::other)),
        );
        let mut lines = FramedRead::new(
            BodyReader::new(body),
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_LENGTH),
        );

        loop {
            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, lines.next())
                    .await
                    .map_err(|_| StreamError::Idle(limit))?,
                None => lines.next().await,
            };
            let Some(chunk) = next else {
                return Ok(());
            };
            let chunk = chunk?;
            let line = decode_line(&chunk);
            if let Cow::Owned(_) = line {
                debug!("Replaced invalid UTF-8 in stream line: {:?}", line);
            }
            if let Some(raw) = RawLine::from_stream_line(&line) {
                send(tx, StreamEvent::Line(raw)).await?;
            }
        }
    }
}

/// Decode one newline-split chunk, dropping a trailing `\r`
fn decode_line(chunk: &[u8]) -> Cow<'_, str> {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    String::from_utf8_lossy(chunk)
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), StreamError> {
    tx.send(event).await.map_err(|_| StreamError::ConsumerGone)
}

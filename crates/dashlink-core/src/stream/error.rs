//! Stream errors

use thiserror::Error;
use tokio_util::codec::AnyDelimiterCodecError;

/// Transport failures of the telemetry event stream.
///
/// These never leave the reader: every variant leads to a backoff and a
/// fresh connection.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Stream read failed: {0}")]
    Read(#[from] AnyDelimiterCodecError),

    #[error("No data received for {0:?}")]
    Idle(std::time::Duration),

    #[error("Server closed the event stream")]
    Ended,

    #[error("Line consumer dropped")]
    ConsumerGone,
}

impl StreamError {
    /// Short label for the failure class, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Request(e) if e.is_connect() => "connect",
            StreamError::Request(e) if e.is_timeout() => "timeout",
            StreamError::Request(_) => "request",
            StreamError::Status { .. } => "status",
            StreamError::Read(AnyDelimiterCodecError::MaxChunkLengthExceeded) => "line-too-long",
            StreamError::Read(_) => "read",
            StreamError::Idle(_) => "idle",
            StreamError::Ended => "eof",
            StreamError::ConsumerGone => "shutdown",
        }
    }
}

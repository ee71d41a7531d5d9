//! Telemetry Event Stream
//!
//! Pulls the server-sent event feed and turns it into complete data frames.
//!
//! Frames arrive as one or more `data:` lines closed by a blank line. The
//! frame payload is a list of `key|value` entries joined by `{|}`.

mod assembler;
mod error;
mod reader;

pub use assembler::{DataFrame, MessageAssembler};
pub use error::StreamError;
pub use reader::{ReaderState, StreamReader};

use std::time::Duration;

/// Prefix of payload lines in the event stream
pub const DATA_MARKER: &str = "data:";

/// Separator between entries of one frame
pub const FRAME_SEPARATOR: &str = "{|}";

/// Separator between key and value of one entry
pub const PAIR_SEPARATOR: char = '|';

/// Delay before reconnecting after any stream failure
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Longest accepted line in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Longest payload the assembler buffers for one frame
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Default silence allowed on an established stream before reconnecting
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the reader-to-consumer event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A line of interest from the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    /// Payload of a `data:` line, marker stripped
    Data(String),
    /// Frame delimiter
    Blank,
}

impl RawLine {
    /// Classify one decoded stream line.
    ///
    /// Returns `None` for SSE fields other than `data` and for comments.
    pub fn from_stream_line(line: &str) -> Option<Self> {
        if line.trim().is_empty() {
            return Some(RawLine::Blank);
        }
        let payload = line.strip_prefix(DATA_MARKER)?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        Some(RawLine::Data(payload.to_string()))
    }
}

/// What the reader hands to the forwarding path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A new response body started streaming
    Connected,
    /// One relevant line
    Line(RawLine),
}

//! Frame assembly
//!
//! Accumulates `data:` payload lines until a blank line closes the frame,
//! then splits the payload into key/value entries. A payload that outgrows
//! [`MAX_FRAME_LENGTH`] is discarded up to the next blank line.

use tracing::warn;

use super::{RawLine, FRAME_SEPARATOR, MAX_FRAME_LENGTH, PAIR_SEPARATOR};

/// One complete telemetry message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFrame {
    /// Well-formed `(key, raw value)` entries in stream order
    pub pairs: Vec<(String, String)>,
}

impl DataFrame {
    /// Split a frame payload into entries.
    ///
    /// Each entry is split once on its last pair separator; entries without
    /// a separator are discarded.
    pub fn parse(payload: &str) -> Self {
        let pairs = payload
            .split(FRAME_SEPARATOR)
            .filter_map(|entry| {
                let (key, value) = entry.rsplit_once(PAIR_SEPARATOR)?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();
        Self { pairs }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if no entry survived parsing
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Incremental line-to-frame parser
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: String,
    /// Skipping the rest of an oversized frame
    discarding: bool,
}

impl MessageAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a frame when a blank line closes a non-empty buffer
    pub fn consume(&mut self, line: RawLine) -> Option<DataFrame> {
        match line {
            RawLine::Data(_) if self.discarding => None,
            RawLine::Data(text) => {
                let text = text.trim();
                if self.buffer.len() + text.len() > MAX_FRAME_LENGTH {
                    warn!(
                        "Frame exceeds {} bytes without a delimiter, discarding it",
                        MAX_FRAME_LENGTH
                    );
                    self.buffer.clear();
                    self.discarding = true;
                } else {
                    self.buffer.push_str(text);
                }
                None
            }
            RawLine::Blank if self.discarding => {
                self.discarding = false;
                None
            }
            RawLine::Blank if self.buffer.is_empty() => None,
            RawLine::Blank => {
                let frame = DataFrame::parse(&self.buffer);
                self.buffer.clear();
                Some(frame)
            }
        }
    }

    /// Drop any partially accumulated frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// True if part of a frame is buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

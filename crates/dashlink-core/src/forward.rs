//! Frame forwarding
//!
//! Turns assembled frames into the dashboard wire format and writes them to
//! the serial channel. Wire format: rounded fractions joined by `|`, e.g.
//! `0.5|1|0.75`, with no trailing delimiter and no terminator.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::device::SerialChannel;
use crate::normalize::{normalize, Ceilings, MetricClass, MetricSample};
use crate::stream::{DataFrame, MessageAssembler, StreamEvent};

/// Separator between samples on the wire
pub const OUTPUT_SEPARATOR: &str = "|";

/// Result of forwarding one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Written to the device
    Written,
    /// Device not open; frame discarded
    Dropped,
    /// Write failed; frame discarded and channel faulted
    Failed,
    /// No valid samples; nothing to write
    Empty,
}

/// Running totals per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Frames written to the device
    pub written: u64,
    /// Frames discarded because the device was not open
    pub dropped: u64,
    /// Frames lost to a write error
    pub failed: u64,
    /// Frames without a single valid sample
    pub empty: u64,
}

impl ForwardStats {
    fn record(&mut self, outcome: ForwardOutcome) {
        match outcome {
            ForwardOutcome::Written => self.written += 1,
            ForwardOutcome::Dropped => self.dropped += 1,
            ForwardOutcome::Failed => self.failed += 1,
            ForwardOutcome::Empty => self.empty += 1,
        }
    }
}

/// Render samples in wire format
pub fn render_output(samples: &[MetricSample]) -> String {
    let out = samples
        .iter()
        .map(|s| s.rounded.to_string())
        .collect::<Vec<_>>()
        .join(OUTPUT_SEPARATOR);
    out.trim_end_matches(OUTPUT_SEPARATOR).to_string()
}

/// Normalize a whole frame and render it, skipping pairs without a number
pub fn build_output_frame(frame: &DataFrame, ceilings: &Ceilings) -> String {
    let samples: Vec<MetricSample> = frame
        .pairs
        .iter()
        .filter_map(|(key, value)| normalize(key, value, ceilings))
        .collect();
    render_output(&samples)
}

/// Single consumer between the stream reader and the serial channel
pub struct ForwardingLoop {
    channel: Arc<SerialChannel>,
    ceilings: Ceilings,
    assembler: MessageAssembler,
    stats: ForwardStats,
}

impl ForwardingLoop {
    /// Create a loop writing to `channel`
    pub fn new(channel: Arc<SerialChannel>, ceilings: Ceilings) -> Self {
        Self {
            channel,
            ceilings,
            assembler: MessageAssembler::new(),
            stats: ForwardStats::default(),
        }
    }

    /// Totals so far
    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Process one reader event; returns the outcome if it completed a frame
    pub async fn handle(&mut self, event: StreamEvent) -> Option<ForwardOutcome> {
        match event {
            StreamEvent::Connected => {
                if self.assembler.has_partial() {
                    debug!("Discarding partial frame from previous connection");
                }
                self.assembler.reset();
                None
            }
            StreamEvent::Line(line) => {
                let frame = self.assembler.consume(line)?;
                Some(self.forward(frame).await)
            }
        }
    }

    /// Normalize, render and write one frame
    pub async fn forward(&mut self, frame: DataFrame) -> ForwardOutcome {
        let mut samples = Vec::with_capacity(frame.len());
        for (key, value) in &frame.pairs {
            match normalize(key, value, &self.ceilings) {
                Some(sample) => {
                    if MetricClass::from_key(key) == MetricClass::Unknown {
                        trace!("Unrecognized metric key '{}', sending 0", key);
                    }
                    samples.push(sample);
                }
                None => trace!("Dropping '{}': no number in '{}'", key, value),
            }
        }

        let output = render_output(&samples);
        let outcome = if output.is_empty() {
            ForwardOutcome::Empty
        } else if !self.channel.is_open() {
            warn!("Serial device not open, dropping frame {}", output);
            ForwardOutcome::Dropped
        } else {
            match self.channel.write(output.as_bytes()).await {
                Ok(()) => {
                    trace!("Sent {}", output);
                    ForwardOutcome::Written
                }
                Err(e) => {
                    error!("Failed to write frame to serial device: {}", e);
                    ForwardOutcome::Failed
                }
            }
        };

        self.stats.record(outcome);
        outcome
    }

    /// Consume reader events in order until cancelled or the reader goes away
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
    ) -> ForwardStats {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }

        let stats = self.stats;
        info!(
            written = stats.written,
            dropped = stats.dropped,
            failed = stats.failed,
            empty = stats.empty,
            "Forwarding stopped"
        );
        stats
    }
}

//! Per-chunk statistics and the sizing controller.
//!
//! ## Sizing
//!
//! Every chunk should take about `target` to send and drain. After each chunk:
//!
//! ```text
//! avg   = elapsed / read            (fallback_average when read == 0)
//! next  = min(target / avg, max_chunk_size, growth_factor * current)
//! pause = elapsed * pause_fraction
//! ```
//!
//! The growth cap ramps the pipeline depth up gradually from the initial
//! single statement, the hard cap bounds memory, and the latency term follows
//! the server's actual speed.

use crate::config::SizingConfig;
use crate::pipeline::PipelineError;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of sending one chunk.
#[derive(Debug, Default)]
pub struct SendResult {
    /// Chunk id, for log correlation
    pub chunk: u64,
    /// Statements matched to a response
    pub read: usize,
    /// Error replies from the server
    pub errors: usize,
    /// Non-error replies from the server
    pub replies: usize,
    /// Bytes successfully written
    pub byte_size: usize,
    /// Write, flush and drain time
    pub elapsed: Duration,
    /// Pause inserted after this chunk
    pub paused: Duration,
    /// Set when the response stream could not be drained
    pub failure: Option<PipelineError>,
}

impl SendResult {
    /// Average round-trip time per statement.
    pub fn average(&self, fallback: Duration) -> Duration {
        if self.read == 0 {
            debug!(chunk = self.chunk, "No statements read, using fallback average");
            return fallback;
        }
        let nanos = self.elapsed.as_nanos() / self.read as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Emits the per-chunk controller line.
    pub fn log(&self, next_size: usize, fallback: Duration, enabled: bool) {
        let avg = self.average(fallback);
        if enabled {
            info!(
                chunk = self.chunk,
                errors = self.errors,
                replies = self.replies,
                total = self.errors + self.replies,
                sent = self.read,
                elapsed = ?self.elapsed,
                avg = ?avg,
                bytes = self.byte_size,
                paused = ?self.paused,
                next_size,
                "Chunk complete"
            );
        } else {
            debug!(
                chunk = self.chunk,
                sent = self.read,
                elapsed = ?self.elapsed,
                next_size,
                "Chunk complete"
            );
        }
    }
}

/// Running totals across a whole load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Totals {
    pub chunks: u64,
    pub statements: u64,
    pub errors: u64,
    pub replies: u64,
    pub bytes: u64,
    /// Input elements skipped because they failed to decode
    pub input_errors: u64,
    pub elapsed: Duration,
}

impl Totals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk's result into the totals.
    pub fn accumulate(&mut self, result: &SendResult) {
        self.chunks += 1;
        self.statements += result.read as u64;
        self.errors += result.errors as u64;
        self.replies += result.replies as u64;
        self.bytes += result.byte_size as u64;
        self.elapsed += result.elapsed;
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors: {} replies: {}", self.errors, self.replies)
    }
}

/// Computes the next chunk size and the pause between chunks.
#[derive(Debug, Clone)]
pub struct SizingController {
    config: SizingConfig,
}

impl SizingController {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Size of the chunk that follows one of `current` statements.
    ///
    /// Never returns less than 1, so a slow server still makes progress one
    /// statement at a time.
    pub fn next_size(&self, result: &SendResult, current: usize) -> usize {
        let avg = result.average(self.config.fallback_average).as_nanos().max(1);
        let proposed = (self.config.target.as_nanos() / avg).min(usize::MAX as u128) as usize;

        let mut next = proposed.min(self.config.max_chunk_size);
        if let Some(factor) = self.config.growth_factor {
            next = next.min(current.max(1).saturating_mul(factor));
        }
        next.max(1)
    }

    /// Pause to insert after a chunk that took `elapsed`.
    ///
    /// A fraction that is not a finite positive number, or a product too
    /// large for a `Duration`, yields no pause.
    pub fn pause_for(&self, elapsed: Duration) -> Duration {
        let fraction = self.config.pause_fraction;
        if !fraction.is_finite() || fraction <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(elapsed.as_secs_f64() * fraction).unwrap_or(Duration::ZERO)
    }
}

//! Loader configuration.
//!
//! Every tunable of the batching engine lives here with its default, so the
//! binary only has to map flags onto fields.

use crate::protocol::decoder::MAX_NESTING_DEPTH;
use std::time::Duration;

/// Default per-chunk round-trip target.
pub const DEFAULT_CHUNK_TARGET: Duration = Duration::from_millis(250);

/// Default upper bound on statements per chunk.
pub const DEFAULT_CHUNK_MAX: usize = 10_000;

/// Default inter-chunk pause, as a fraction of the previous chunk's elapsed time.
pub const DEFAULT_PAUSE_FRACTION: f64 = 0.10;

/// Default capacity of the decode channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Parameters of the chunk sizing controller.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    /// Round-trip time each chunk should take
    pub target: Duration,

    /// Hard cap on statements per chunk
    pub max_chunk_size: usize,

    /// Pause after each chunk, relative to its elapsed time
    pub pause_fraction: f64,

    /// Maximum growth multiple per round trip; `None` means unbounded
    pub growth_factor: Option<usize>,

    /// Per-statement average used when a chunk read no responses
    pub fallback_average: Duration,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_CHUNK_TARGET,
            max_chunk_size: DEFAULT_CHUNK_MAX,
            pause_fraction: DEFAULT_PAUSE_FRACTION,
            growth_factor: Some(2),
            fallback_average: Duration::from_micros(100),
        }
    }
}

/// Configuration of one load run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub sizing: SizingConfig,

    /// Capacity of the input and response channels; `None` is unbounded
    pub channel_capacity: Option<usize>,

    /// Maximum array nesting accepted from either stream
    pub max_depth: usize,

    /// Log every request/response pair
    pub verbose: bool,

    /// Log the controller's numbers after every chunk
    pub chunk_info: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sizing: SizingConfig::default(),
            channel_capacity: Some(DEFAULT_CHANNEL_CAPACITY),
            max_depth: MAX_NESTING_DEPTH,
            verbose: false,
            chunk_info: false,
        }
    }
}

//! Adaptive Pipelining Engine
//!
//! This module moves decoded commands from an input stream to the server in
//! chunks, and sizes each chunk from how long the previous one took.
//!
//! ## Architecture
//!
//! ```text
//!   input ValueStream            response ValueStream
//!         │                              ▲
//!         ▼                              │
//! ┌───────────────┐  full   ┌────────────┴─────┐
//! │    Filling    │───────> │     Draining     │
//! │ (Chunk::push) │         │  (Chunk::send)   │
//! └───────▲───────┘         └────────┬─────────┘
//!         │    pause + next_size     │
//!         └──── SizingController <───┘ SendResult
//! ```
//!
//! ## Modules
//!
//! - `chunk`: `Chunk`, its id allocator and the send/drain cycle
//! - `stats`: `SendResult`, `Totals` and the `SizingController`
//! - `driver`: the `Loader` control loop
//! - `replay`: raw pass-through of split statements

pub mod chunk;
pub mod driver;
pub mod replay;
pub mod stats;

use crate::protocol::DecodeError;
use thiserror::Error;

// Re-export commonly used types
pub use chunk::{Chunk, ChunkIds};
pub use driver::Loader;
pub use replay::replay;
pub use stats::{SendResult, SizingController, Totals};

/// Errors that end a load run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The response stream ended before every request was answered
    #[error("response stream closed after {received} of {expected} responses")]
    ResponseStreamClosed { expected: usize, received: usize },

    /// The server sent bytes that are not valid RESP
    #[error("response stream desynchronized after {received} of {expected} responses: {source}")]
    ResponseDecode {
        expected: usize,
        received: usize,
        #[source]
        source: DecodeError,
    },

    /// The server did not acknowledge AUTH
    #[error("authentication failed: {0}")]
    Auth(String),

    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fatal error together with the totals gathered before it.
#[derive(Debug, Error)]
#[error("load aborted ({totals}): {cause}")]
pub struct Aborted {
    pub totals: Totals,
    #[source]
    pub cause: PipelineError,
}

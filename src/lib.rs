//! # rsload - Adaptive Pipelining Bulk Loader
//!
//! rsload streams pre-encoded RESP commands from a file or stdin into a
//! Redis-compatible server. It pipelines as many commands per round trip as
//! the server can absorb, and retunes that depth after every batch.
//!
//! ## Features
//!
//! - **Binary-Safe Codec**: Streaming RESP decoder and encoder with byte-exact round trips
//! - **Adaptive Pipelining**: Chunk sizes follow measured latency toward a fixed target
//! - **Backpressure**: Bounded channels between decoders and the driver
//! - **Raw Replay**: Line-level statement splitting for pass-through loads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               rsload                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │ Input file  │───>│ ValueReader │───>│        Loader            │     │
//! │  │  / stdin    │    │ (task)      │    │  Filling ──> Draining    │     │
//! │  └─────────────┘    └─────────────┘    │      ▲          │        │     │
//! │                                        │      └ Sizing <─┘        │     │
//! │                                        └───────┬──────────▲───────┘     │
//! │                                      write+flush│          │responses   │
//! │                                                 ▼          │            │
//! │                                        ┌─────────────┐  ┌──┴──────────┐ │
//! │                                        │  BufWriter  │  │ ValueReader │ │
//! │                                        │  (socket)   │  │ (task)      │ │
//! │                                        └──────┬──────┘  └──────▲──────┘ │
//! └───────────────────────────────────────────────┼────────────────┼────────┘
//!                                                 ▼                │
//!                                             ┌──────────────────────┐
//!                                             │   RESP server        │
//!                                             └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use rsload::config::LoaderConfig;
//! use rsload::connection::Connection;
//! use rsload::pipeline::Loader;
//! use rsload::protocol::{spawn_decoder, ValueReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoaderConfig::default();
//!     let conn = Connection::connect("127.0.0.1:6379").await?;
//!     let (writer, responses, _) = conn.into_parts(config.channel_capacity, config.max_depth);
//!
//!     let file = tokio::fs::File::open("dump.resp").await?;
//!     let (input, _) = spawn_decoder(ValueReader::new(file), config.channel_capacity, "input");
//!
//!     let totals = Loader::new(writer, responses, config).run(input).await?;
//!     println!("{}", totals);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP values, streaming decoder, value streams, statement splitter
//! - [`pipeline`]: Chunks, send statistics, sizing controller, the Loader and raw replay
//! - [`connection`]: Server connection and AUTH handshake
//! - [`config`]: Tunables and their defaults
//!
//! ## Design Highlights
//!
//! ### Ordering Without Request Ids
//!
//! RESP replies carry no correlation id. The loader is the only writer to the
//! socket and the only reader of the decoded replies, and it drains each chunk
//! completely before writing the next, so reply N always answers request N.
//!
//! ### Latency-Targeted Batching
//!
//! Each chunk aims to take about 250 ms end to end. Sizes start at one
//! statement, at most double per round trip, and never exceed a configured
//! maximum. A short pause after each chunk keeps the server from saturating.

pub mod config;
pub mod connection;
pub mod pipeline;
pub mod protocol;

// Re-export commonly used types for convenience
pub use config::{LoaderConfig, SizingConfig};
pub use connection::Connection;
pub use pipeline::{replay, Aborted, Loader, PipelineError, Totals};
pub use protocol::{DecodeError, RespValue, ValueReader, ValueStream};

/// The default port of RESP servers
pub const DEFAULT_PORT: u16 = 6379;

/// The default host to load into
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of rsload
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Server Connection Module
//!
//! Connection setup and the AUTH handshake that must finish before the
//! pipelining loop takes over the socket.
//!
//! ## Example
//!
//! ```ignore
//! use rsload::connection::Connection;
//! use rsload::config::LoaderConfig;
//! use rsload::pipeline::Loader;
//!
//! let config = LoaderConfig::default();
//! let mut conn = Connection::connect("127.0.0.1:6379").await?;
//! conn.authenticate("secret").await?;
//!
//! let (writer, responses, _decoder) = conn.into_parts(config.channel_capacity, config.max_depth);
//! let totals = Loader::new(writer, responses, config).run(input).await?;
//! ```

pub mod client;

// Re-export commonly used types
pub use client::Connection;

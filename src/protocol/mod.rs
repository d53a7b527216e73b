//! RESP Protocol Implementation
//!
//! This module provides everything the loader needs to speak the Redis
//! Serialization Protocol (RESP) in both directions.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and its encoder
//! - `decoder`: Streaming, binary-safe decoder over async readers
//! - `stream`: Decoder tasks feeding channel-backed `ValueStream`s
//! - `statement`: Line-level splitter used for raw replay
//!
//! ## Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use rsload::protocol::{decode_one, RespValue};
//!
//! // Decoding a command
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let value = decode_one(data).await.unwrap().unwrap();
//! assert_eq!(value, RespValue::command(["GET", "name"]));
//!
//! // Encoding it back gives the same bytes
//! assert_eq!(value.serialize(), data);
//! # });
//! ```

pub mod decoder;
pub mod statement;
pub mod stream;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{decode_one, DecodeError, DecodeResult, ValueReader};
pub use statement::{split, SplitError, Statement};
pub use stream::{spawn_decoder, StreamItem, ValueSink, ValueStream};
pub use types::RespValue;

//! Streaming RESP Decoder
//!
//! Unlike a server, which parses out of a buffer it refills itself, the loader
//! reads from two byte streams it does not control: the input file and the
//! server connection. This decoder pulls exactly the bytes one value needs
//! from an `AsyncBufRead` and leaves the rest in the reader's buffer.
//!
//! ## How the Decoder Works
//!
//! 1. Read one CRLF-terminated line and dispatch on its first byte.
//! 2. Bulk strings read their payload with `read_exact`, never by scanning
//!    for CRLF, so payloads may contain `\r\n`.
//! 3. Arrays are decoded with an explicit stack of partially filled arrays
//!    instead of recursion, and the stack depth is capped.
//!
//! `ValueReader::next` returns:
//! - `Some(Ok(value))` - a complete value
//! - `Some(Err(e))` - the bytes were not valid RESP; decoding can continue
//! - `None` - clean end of stream, or the reader stopped after an I/O error

use crate::protocol::types::{prefix, RespValue};
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Errors that can occur while decoding a RESP value.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed line terminator or a line too short to hold a frame
    #[error("framing error: {0}")]
    Framing(String),

    /// Illegal type byte, bad length or integer, truncated payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A child of an array failed to decode
    #[error("protocol error: unable to read array element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<DecodeError>,
    },

    /// The underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// True when the failure came from the transport rather than the bytes.
    pub fn is_io(&self) -> bool {
        match self {
            DecodeError::Io(_) => true,
            DecodeError::Element { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on pre-allocated array capacity; the declared count is untrusted.
const MAX_PREALLOC: usize = 1024;

/// An array whose header has been read but whose elements have not.
struct PendingArray {
    expected: usize,
    items: Vec<RespValue>,
}

/// Pulls RESP values, one at a time, off a buffered byte source.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use rsload::protocol::{RespValue, ValueReader};
///
/// let mut reader = ValueReader::new(&b"+OK\r\n:42\r\n"[..]);
/// assert_eq!(reader.next().await.unwrap().unwrap(), RespValue::simple_string("OK"));
/// assert_eq!(reader.next().await.unwrap().unwrap(), RespValue::integer(42));
/// assert!(reader.next().await.is_none());
/// # });
/// ```
#[derive(Debug)]
pub struct ValueReader<R> {
    reader: R,
    max_depth: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> ValueReader<BufReader<R>> {
    /// Wraps an unbuffered source in a `BufReader`.
    pub fn new(reader: R) -> Self {
        Self::from_buffered(BufReader::new(reader))
    }
}

impl<R: AsyncBufRead + Unpin> ValueReader<R> {
    /// Uses an already buffered source, keeping whatever it has buffered.
    pub fn from_buffered(reader: R) -> Self {
        Self {
            reader,
            max_depth: MAX_NESTING_DEPTH,
            done: false,
        }
    }

    /// Sets the maximum array nesting depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the next decode outcome, or `None` once the stream is over.
    ///
    /// Malformed frames are reported and decoding resumes at the next line;
    /// an I/O error is reported once and then ends the sequence.
    pub async fn next(&mut self) -> Option<DecodeResult<RespValue>> {
        if self.done {
            return None;
        }
        match self.read_value().await {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                if e.is_io() {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }

    /// Decodes one value. `Ok(None)` means the source ended cleanly before
    /// the first byte of a frame.
    pub async fn read_value(&mut self) -> DecodeResult<Option<RespValue>> {
        let mut stack: Vec<PendingArray> = Vec::new();

        'frames: loop {
            let mut value = match self.read_frame(&mut stack).await {
                Ok(Some(value)) => value,
                // A nested array header was pushed; read its first element.
                Ok(None) if !stack.is_empty() => continue,
                Ok(None) => return Ok(None),
                Err(e) => return Err(wrap_element_error(&stack, e)),
            };

            while let Some(mut top) = stack.pop() {
                top.items.push(value);
                if top.items.len() < top.expected {
                    stack.push(top);
                    continue 'frames;
                }
                value = RespValue::Array(top.items);
            }
            return Ok(Some(value));
        }
    }

    /// Reads one line and turns it into a value. A non-empty array header is
    /// pushed onto `stack` instead and reported as `Ok(None)`.
    async fn read_frame(
        &mut self,
        stack: &mut Vec<PendingArray>,
    ) -> DecodeResult<Option<RespValue>> {
        let line = match self.read_line().await? {
            Some(line) => line,
            None if stack.is_empty() => return Ok(None),
            None => {
                return Err(DecodeError::Protocol(
                    "unexpected end of stream".to_string(),
                ))
            }
        };

        let body = &line[1..line.len() - 2];
        let value = match line[0] {
            prefix::SIMPLE_STRING => RespValue::SimpleString(Bytes::copy_from_slice(body)),
            prefix::ERROR => RespValue::Error(Bytes::copy_from_slice(body)),
            prefix::INTEGER => RespValue::Integer(parse_i64(body, "integer")?),
            prefix::BULK_STRING => self.read_bulk_string(body).await?,
            prefix::ARRAY => {
                let count = parse_i64(body, "array length")?;
                match count {
                    -1 => RespValue::NullArray,
                    0 => RespValue::Array(Vec::new()),
                    n if n < 0 => {
                        return Err(DecodeError::Protocol(format!(
                            "illegal array of negative length {}",
                            n
                        )))
                    }
                    n => {
                        if stack.len() >= self.max_depth {
                            return Err(DecodeError::Protocol(format!(
                                "maximum nesting depth exceeded: {}",
                                self.max_depth
                            )));
                        }
                        let expected = n as usize;
                        stack.push(PendingArray {
                            expected,
                            items: Vec::with_capacity(expected.min(MAX_PREALLOC)),
                        });
                        return Ok(None);
                    }
                }
            }
            other => {
                return Err(DecodeError::Protocol(format!(
                    "illegal start character: {:?}",
                    other as char
                )))
            }
        };
        Ok(Some(value))
    }

    /// Reads the payload of a bulk string whose length line has been consumed.
    async fn read_bulk_string(&mut self, len_field: &[u8]) -> DecodeResult<RespValue> {
        let length = parse_i64(len_field, "bulk string length")?;
        if length == -1 {
            return Ok(RespValue::Null);
        }
        if length < 0 {
            return Err(DecodeError::Protocol(format!(
                "illegal bulk string of negative length {}",
                length
            )));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(DecodeError::Protocol(format!(
                "bulk string too large: {} bytes (max: {})",
                length, MAX_BULK_SIZE
            )));
        }

        let mut payload = vec![0u8; length + 2];
        if let Err(e) = self.reader.read_exact(&mut payload).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => DecodeError::Protocol(format!(
                    "truncated bulk string: expected {} bytes",
                    length
                )),
                _ => DecodeError::Io(e),
            });
        }
        if &payload[length..] != b"\r\n" {
            return Err(DecodeError::Framing(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }
        payload.truncate(length);
        Ok(RespValue::BulkString(Bytes::from(payload)))
    }

    /// Reads one line including its CRLF. `Ok(None)` on a clean end of stream.
    async fn read_line(&mut self) -> DecodeResult<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = self.reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            return Err(DecodeError::Protocol(format!(
                "unexpected end of stream after {} bytes of a line",
                n
            )));
        }
        if n < 3 {
            return Err(DecodeError::Framing(format!(
                "line too short: {} bytes",
                n
            )));
        }
        if line[n - 2] != b'\r' {
            return Err(DecodeError::Framing("bad line terminator".to_string()));
        }
        Ok(Some(line))
    }
}

/// Wraps an error once for every array it interrupted, innermost first.
fn wrap_element_error(stack: &[PendingArray], mut err: DecodeError) -> DecodeError {
    for pending in stack.iter().rev() {
        err = DecodeError::Element {
            index: pending.items.len(),
            source: Box::new(err),
        };
    }
    err
}

/// Parses a decimal field, accepting only the canonical spelling so that
/// every decoded value re-encodes to the bytes it came from. A leading `+`,
/// leading zeros and `-0` are rejected.
fn parse_i64(field: &[u8], what: &str) -> DecodeResult<i64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| n.to_string().as_bytes() == field)
        .ok_or_else(|| {
            DecodeError::Protocol(format!(
                "invalid {}: {:?}",
                what,
                String::from_utf8_lossy(field)
            ))
        })
}

/// Decodes a single value from an in-memory buffer.
///
/// This is a convenience function for tests and simple use cases.
pub async fn decode_one(buf: &[u8]) -> DecodeResult<Option<RespValue>> {
    ValueReader::new(buf).read_value().await
}

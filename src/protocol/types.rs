//! RESP (Redis Serialization Protocol) Data Types
//!
//! This module defines the values that travel over the wire in both
//! directions: the commands we load and the replies the server sends back.
//!
//! ## Protocol Format
//!
//! Each RESP type starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All types are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null Bulk String: `$-1\r\n`
//! Null Array: `*-1\r\n`

use bytes::Bytes;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Represents a value in the RESP protocol.
///
/// Simple strings and errors keep their raw bytes: servers are free to put
/// non UTF-8 data in them and the loader never needs to interpret it.
///
/// The two null forms are separate variants so that a decoded value always
/// re-encodes to the exact frame it came from. The decoder likewise accepts
/// only canonical integers and lengths, since `:007` could not be re-encoded
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Format: `+<string>\r\n`
    SimpleString(Bytes),

    /// Format: `-<error message>\r\n`
    Error(Bytes),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe strings; the payload may contain CR and LF.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string: `$-1\r\n`
    Null,

    /// Arrays can contain any RESP type, including nested arrays and nulls.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// Null array: `*-1\r\n`
    NullArray,
}

impl RespValue {
    /// Creates a new simple string value.
    ///
    /// # Example
    /// ```
    /// use rsload::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// assert!(ok.is_ok());
    /// ```
    pub fn simple_string(s: impl Into<Bytes>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error value.
    pub fn error(s: impl Into<Bytes>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use rsload::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates a null bulk string.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Creates a null array.
    pub fn null_array() -> Self {
        RespValue::NullArray
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Builds a multi-bulk command, the form every request takes on the wire.
    ///
    /// # Example
    /// ```
    /// use rsload::protocol::types::RespValue;
    /// let cmd = RespValue::command(["SET", "name", "Ariz"]);
    /// assert_eq!(cmd.serialize(), b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n");
    /// ```
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p.as_ref())))
                .collect(),
        )
    }

    /// Serializes the RESP value to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the RESP value into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when you want to reuse a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::NullArray => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Encodes the value onto an async byte sink and returns the number of
    /// bytes written.
    ///
    /// The frame is assembled in memory first, so a failing sink aborts the
    /// rest of this value and the error is returned as-is.
    pub async fn write_to<W>(&self, w: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let buf = self.serialize();
        w.write_all(&buf).await?;
        Ok(buf.len())
    }

    /// Exact size of the encoded frame in bytes.
    pub fn encoded_len(&self) -> usize {
        fn digits(n: usize) -> usize {
            n.to_string().len()
        }
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => 1 + s.len() + 2,
            RespValue::Integer(n) => 1 + n.to_string().len() + 2,
            RespValue::BulkString(data) => 1 + digits(data.len()) + 2 + data.len() + 2,
            RespValue::Null | RespValue::NullArray => 5,
            RespValue::Array(values) => {
                1 + digits(values.len())
                    + 2
                    + values.iter().map(RespValue::encoded_len).sum::<usize>()
            }
        }
    }

    /// Returns true for either null form.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns true for the `+OK` acknowledgement.
    pub fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s.as_ref() == b"OK")
    }

    /// Attempts to extract the inner bytes from SimpleString, Error or BulkString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::SimpleString(b) | RespValue::Error(b) | RespValue::BulkString(b) => Some(&b[..]),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Debug-style quoting used in log lines, so binary payloads stay on one line.
fn write_quoted(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "\"{}\"", bytes.escape_ascii())
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write_quoted(f, s),
            RespValue::Error(s) => write!(f, "(error) {}", s.escape_ascii()),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => write_quoted(f, data),
            RespValue::Null => write!(f, "(nil)"),
            RespValue::NullArray => write!(f, "(nil array)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string_serialize() {
        let value = RespValue::simple_string("OK");
        assert_eq!(value.serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error("ERR unknown command");
        assert_eq!(value.serialize(), b"-ERR unknown command\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
        assert_eq!(
            RespValue::integer(i64::MIN).serialize(),
            b":-9223372036854775808\r\n"
        );
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_binary_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from_static(b"a\r\nb"));
        assert_eq!(value.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn test_null_forms_serialize() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
        assert_eq!(RespValue::null_array().serialize(), b"*-1\r\n");
        assert_eq!(RespValue::array(vec![]).serialize(), b"*0\r\n");
        assert_eq!(RespValue::bulk_string("").serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::integer(2), RespValue::null()]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n$-1\r\n");
    }

    #[test]
    fn test_command_builder() {
        let cmd = RespValue::command(["echo", "hello"]);
        assert_eq!(cmd.serialize(), b"*2\r\n$4\r\necho\r\n$5\r\nhello\r\n");
    }

    #[test]
    fn test_encoded_len_matches_serialize() {
        let value = RespValue::array(vec![
            RespValue::simple_string("OK"),
            RespValue::error("ERR x"),
            RespValue::integer(-12345),
            RespValue::bulk_string(Bytes::from(vec![b'x'; 123])),
            RespValue::null(),
            RespValue::null_array(),
            RespValue::array(vec![]),
        ]);
        assert_eq!(value.encoded_len(), value.serialize().len());
    }

    #[test]
    fn test_is_ok() {
        assert!(RespValue::simple_string("OK").is_ok());
        assert!(!RespValue::simple_string("QUEUED").is_ok());
        assert!(!RespValue::bulk_string("OK").is_ok());
    }

    #[test]
    fn test_display_escapes_binary() {
        let value = RespValue::bulk_string(Bytes::from_static(b"a\r\n"));
        assert_eq!(value.to_string(), "\"a\\r\\n\"");
        assert_eq!(RespValue::error("ERR nope").to_string(), "(error) ERR nope");
    }

    #[tokio::test]
    async fn test_write_to_reports_length() {
        let value = RespValue::command(["GET", "name"]);
        let mut sink: Vec<u8> = Vec::new();
        let n = value.write_to(&mut sink).await.unwrap();
        assert_eq!(n, 23);
        assert_eq!(sink, b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }
}

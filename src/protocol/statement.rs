//! Statement Splitter
//!
//! Groups raw, already-encoded protocol lines into statements without decoding
//! them. A statement starts at a line beginning with `*` and runs until the
//! next such line or the end of input:
//!
//! ```text
//! *2\r\n        ┐
//! $3\r\n        │ statement 1
//! foo\r\n       │
//! ...           ┘
//! *2\r\n        ┐ statement 2
//! ...           ┘
//! ```
//!
//! This is line-oriented on purpose: it is only used for raw replay, where the
//! bytes are forwarded untouched. A bulk payload whose first byte is `*` would
//! be mistaken for a new statement, so inputs with such payloads must go
//! through the decoding path instead.

use crate::protocol::types::prefix;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Errors that stop the splitter.
#[derive(Debug, Error)]
pub enum SplitError {
    /// A line did not end in CRLF
    #[error("bad line terminator on line {line}")]
    Framing { line: u64 },

    /// A non-array line appeared before any array header
    #[error("line {line} is not inside any multi-bulk command")]
    OrphanLine { line: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One command's worth of raw protocol lines, each including its CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    lines: Vec<Bytes>,
}

impl Statement {
    fn new(header: Bytes) -> Self {
        Self {
            lines: vec![header],
        }
    }

    fn push(&mut self, line: Bytes) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[Bytes] {
        &self.lines
    }

    /// Total encoded size of the statement.
    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(Bytes::len).sum()
    }

    /// Writes the raw lines to `w` and returns the number of bytes written.
    pub async fn write_to<W>(&self, w: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        for line in &self.lines {
            w.write_all(line).await?;
        }
        Ok(self.byte_len())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            write!(f, "{}", line.escape_ascii())?;
        }
        Ok(())
    }
}

/// A line made only of CR and LF bytes.
fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| matches!(b, b'\r' | b'\n'))
}

/// Splits `reader` into statements and sends them on `tx` in input order.
///
/// Returns the number of statements emitted. The channel is closed when this
/// returns, because `tx` is dropped, which tells the consumer the input is
/// over. A statement already open when a fatal error is hit is not emitted.
pub async fn split<R>(mut reader: R, tx: mpsc::Sender<Statement>) -> Result<u64, SplitError>
where
    R: AsyncBufRead + Unpin,
{
    let mut current: Option<Statement> = None;
    let mut emitted = 0u64;
    let mut line_no = 0u64;

    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        line_no += 1;

        if is_blank(&line) {
            continue;
        }
        if line.len() < 2 || line[line.len() - 2] != b'\r' || line[line.len() - 1] != b'\n' {
            return Err(SplitError::Framing { line: line_no });
        }

        let line = Bytes::from(line);
        if line[0] == prefix::ARRAY {
            if let Some(done) = current.replace(Statement::new(line)) {
                if tx.send(done).await.is_err() {
                    return Ok(emitted);
                }
                emitted += 1;
            }
        } else {
            match current.as_mut() {
                Some(statement) => statement.push(line),
                None => return Err(SplitError::OrphanLine { line: line_no }),
            }
        }
    }

    if let Some(done) = current {
        if tx.send(done).await.is_ok() {
            emitted += 1;
        }
    }
    debug!(statements = emitted, lines = line_no, "Splitter reached end of input");
    Ok(emitted)
}

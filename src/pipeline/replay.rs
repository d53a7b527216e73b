//! Raw replay: forward split statements untouched.
//!
//! This mode skips value decoding on the input side. The Statement Splitter
//! feeds a writer task that streams raw lines to the server, while the
//! calling task drains responses concurrently. Once the input is exhausted
//! the writer sends `ECHO <token>`. The run ends when the server echoes that
//! token back, which proves every earlier reply has been read.
//!
//! ```text
//! input ──> split ──> [Statement channel] ──> writer task ──> server
//!                                                               │
//!                          responses <── decoder task <─────────┘
//! ```

use crate::config::{LoaderConfig, DEFAULT_CHANNEL_CAPACITY};
use crate::pipeline::stats::{SendResult, Totals};
use crate::pipeline::{Aborted, PipelineError};
use crate::protocol::{split, RespValue, Statement, ValueStream};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// A token unlikely to appear in any reply the loaded data can produce.
fn sentinel_token() -> Bytes {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    Bytes::from(format!("rsload-{}-{:x}", std::process::id(), nanos))
}

/// Writes every statement from `rx`, then the sentinel ECHO, then flushes.
/// Returns the number of bytes written.
async fn write_statements<W>(
    mut rx: mpsc::Receiver<Statement>,
    writer: W,
    token: Bytes,
    sent: Arc<AtomicU64>,
) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    let mut bytes = 0u64;

    while let Some(statement) = rx.recv().await {
        bytes += statement.write_to(&mut writer).await? as u64;
        sent.fetch_add(1, Ordering::Relaxed);
    }

    let echo = RespValue::command([&b"ECHO"[..], &token[..]]);
    bytes += echo.write_to(&mut writer).await? as u64;
    writer.flush().await?;
    debug!(statements = sent.load(Ordering::Relaxed), bytes, "Replay input fully written");
    Ok(bytes)
}

/// Replays raw statements from `input` over `writer`, reading replies from
/// `responses`, which must be decoded from the same connection.
pub async fn replay<R, W>(
    input: R,
    writer: W,
    mut responses: ValueStream,
    config: &LoaderConfig,
) -> Result<Totals, Aborted>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let started = Instant::now();
    let token = sentinel_token();
    let sent = Arc::new(AtomicU64::new(0));
    let capacity = config
        .channel_capacity
        .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
        .max(1);

    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        match split(input, tx).await {
            Ok(n) => debug!(statements = n, "Splitter finished"),
            Err(e) => error!(error = %e, "Splitter stopped, replaying what was read so far"),
        }
    });
    let mut writer_task = tokio::spawn(write_statements(
        rx,
        writer,
        token.clone(),
        Arc::clone(&sent),
    ));

    let mut stats = SendResult::default();
    let mut writer_done = false;
    let outcome: Result<(), PipelineError> = loop {
        tokio::select! {
            joined = &mut writer_task, if !writer_done => {
                writer_done = true;
                match joined {
                    Ok(Ok(bytes)) => stats.byte_size = bytes as usize,
                    Ok(Err(e)) => break Err(PipelineError::Io(e)),
                    Err(e) => break Err(PipelineError::Io(std::io::Error::other(e))),
                }
            }
            item = responses.next() => {
                let expected = sent.load(Ordering::Relaxed) as usize;
                match item {
                    None => {
                        break Err(PipelineError::ResponseStreamClosed {
                            expected,
                            received: stats.read,
                        })
                    }
                    Some(Err(e)) => {
                        break Err(PipelineError::ResponseDecode {
                            expected,
                            received: stats.read,
                            source: e,
                        })
                    }
                    Some(Ok(RespValue::BulkString(b))) if b == token => break Ok(()),
                    Some(Ok(response)) => record(&mut stats, &response, config.verbose),
                }
            }
        }
    };

    if !writer_done {
        if outcome.is_ok() {
            // The sentinel came back, so the writer has already flushed.
            if let Ok(Ok(bytes)) = writer_task.await {
                stats.byte_size = bytes as usize;
            }
        } else {
            writer_task.abort();
        }
    }
    stats.elapsed = started.elapsed();

    let mut totals = Totals::new();
    totals.accumulate(&stats);
    match outcome {
        Ok(()) => {
            info!(
                statements = totals.statements,
                errors = totals.errors,
                replies = totals.replies,
                bytes = totals.bytes,
                wall = ?stats.elapsed,
                "Replay complete"
            );
            Ok(totals)
        }
        Err(cause) => {
            error!(error = %cause, "Stopping replay");
            Err(Aborted { totals, cause })
        }
    }
}

/// Counts one reply. Raw statements are not kept, so only the reply is logged.
fn record(stats: &mut SendResult, response: &RespValue, verbose: bool) {
    stats.read += 1;
    if response.is_error() {
        stats.errors += 1;
        warn!("{}", response);
    } else {
        stats.replies += 1;
        if verbose {
            info!("{}", response);
        } else {
            trace!("{}", response);
        }
    }
}

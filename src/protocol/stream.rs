//! Channel-backed value streams.
//!
//! Each byte source the loader reads (the input file and the server
//! connection) gets its own producer task that decodes values and pushes the
//! outcomes into a channel. The consumer sees a `ValueStream` and never
//! touches the underlying reader.
//!
//! ```text
//!  ┌──────────────┐   DecodeResult   ┌─────────────┐
//!  │ decoder task │ ───────────────> │ ValueStream │ ──> driver
//!  │ (ValueReader)│   mpsc channel   └─────────────┘
//!  └──────────────┘
//! ```
//!
//! The channel capacity is the backpressure valve: `Some(n)` lets the
//! producer run at most `n` values ahead, `None` lets it run arbitrarily far.

use crate::protocol::decoder::{DecodeResult, ValueReader};
use crate::protocol::types::RespValue;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// One element of a value stream.
pub type StreamItem = DecodeResult<RespValue>;

/// Producer half of a value stream.
#[derive(Debug, Clone)]
pub enum ValueSink {
    Bounded(mpsc::Sender<StreamItem>),
    Unbounded(mpsc::UnboundedSender<StreamItem>),
}

impl ValueSink {
    /// Pushes one item. Returns false once the consumer is gone.
    pub async fn send(&self, item: StreamItem) -> bool {
        match self {
            ValueSink::Bounded(tx) => tx.send(item).await.is_ok(),
            ValueSink::Unbounded(tx) => tx.send(item).is_ok(),
        }
    }
}

/// Consumer half of a value stream: a finite, one-pass sequence of decode
/// outcomes that ends when the producer closes the channel.
#[derive(Debug)]
pub enum ValueStream {
    Bounded(mpsc::Receiver<StreamItem>),
    Unbounded(mpsc::UnboundedReceiver<StreamItem>),
}

impl ValueStream {
    /// Creates a connected sink/stream pair.
    ///
    /// `Some(0)` is treated as `Some(1)`, the closest a tokio channel gets
    /// to a lock-step exchange.
    pub fn channel(capacity: Option<usize>) -> (ValueSink, ValueStream) {
        match capacity {
            Some(n) => {
                let (tx, rx) = mpsc::channel(n.max(1));
                (ValueSink::Bounded(tx), ValueStream::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (ValueSink::Unbounded(tx), ValueStream::Unbounded(rx))
            }
        }
    }

    /// Receives the next outcome, or `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<StreamItem> {
        match self {
            ValueStream::Bounded(rx) => rx.recv().await,
            ValueStream::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Builds a stream over a fixed list of outcomes.
    pub fn from_items(items: Vec<StreamItem>) -> ValueStream {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            // The receiver is alive, so this cannot fail.
            let _ = tx.send(item);
        }
        ValueStream::Unbounded(rx)
    }
}

/// Decodes `reader` on a background task until it is exhausted, feeding the
/// outcomes into a fresh channel.
///
/// The task ends (closing the stream) at end of input, after an I/O error,
/// or as soon as the consumer drops its `ValueStream`.
pub fn spawn_decoder<R>(
    reader: ValueReader<R>,
    capacity: Option<usize>,
    label: &'static str,
) -> (ValueStream, JoinHandle<()>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (sink, stream) = ValueStream::channel(capacity);
    let handle = tokio::spawn(stream_values(reader, sink, label));
    (stream, handle)
}

/// Producer loop behind `spawn_decoder`.
pub async fn stream_values<R>(mut reader: ValueReader<R>, sink: ValueSink, label: &'static str)
where
    R: AsyncBufRead + Unpin,
{
    let mut produced = 0u64;
    while let Some(item) = reader.next().await {
        produced += 1;
        trace!(stream = label, ok = item.is_ok(), "Decoded value");
        if !sink.send(item).await {
            debug!(stream = label, produced, "Consumer went away, stopping decoder");
            return;
        }
    }
    debug!(stream = label, produced, "Decoder reached end of stream");
}

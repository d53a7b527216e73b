//! Chunks and the pipelined send/drain cycle.
//!
//! A chunk is written in full, flushed once, and then exactly as many
//! responses as it held are read back. The protocol has no request ids, so
//! the Nth response after a flush belongs to the Nth request of that chunk.
//! That only holds while one chunk at a time owns both the writer and the
//! response stream, which `send` enforces by taking both by `&mut`.

use crate::pipeline::stats::SendResult;
use crate::pipeline::PipelineError;
use crate::protocol::{RespValue, ValueStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, trace, warn};

/// Hands out monotonically increasing chunk ids. Safe to share between tasks.
#[derive(Debug, Default)]
pub struct ChunkIds {
    last: AtomicU64,
}

impl ChunkIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id; the first id is 1.
    pub fn allocate(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A bounded batch of requests sent and drained as a unit.
#[derive(Debug)]
pub struct Chunk {
    id: u64,
    vals: Vec<RespValue>,
    capacity: usize,
    created: Instant,
}

impl Chunk {
    /// Creates an empty chunk that will hold `capacity` values.
    pub fn new(ids: &ChunkIds, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id: ids.allocate(),
            vals: Vec::with_capacity(capacity),
            capacity,
            created: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.vals.len() >= self.capacity
    }

    pub fn push(&mut self, value: RespValue) {
        self.vals.push(value);
    }

    /// Writes every request, flushes once, then reads one response per
    /// request.
    ///
    /// Write and flush failures are logged and the drain is still attempted,
    /// since the server may already hold a prefix of the batch. A response
    /// stream that ends or yields undecodable bytes is unrecoverable: the
    /// partial result is returned with `failure` set.
    pub async fn send<W>(
        self,
        writer: &mut W,
        responses: &mut ValueStream,
        verbose: bool,
    ) -> SendResult
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let start = Instant::now();
        let mut stats = SendResult {
            chunk: self.id,
            ..Default::default()
        };
        trace!(
            chunk = self.id,
            statements = self.vals.len(),
            age = ?self.created.elapsed(),
            "Sending chunk"
        );

        for (i, value) in self.vals.iter().enumerate() {
            match value.write_to(writer).await {
                Ok(n) => stats.byte_size += n,
                Err(e) => {
                    error!(chunk = self.id, statement = i, error = %e, "Error writing a statement")
                }
            }
        }
        if let Err(e) = writer.flush().await {
            error!(chunk = self.id, error = %e, "Error flushing statement buffer");
        }

        let expected = self.vals.len();
        for request in &self.vals {
            match responses.next().await {
                None => {
                    error!(
                        chunk = self.id,
                        expected,
                        received = stats.read,
                        "Response stream closed early"
                    );
                    stats.failure = Some(PipelineError::ResponseStreamClosed {
                        expected,
                        received: stats.read,
                    });
                    break;
                }
                Some(Err(e)) => {
                    error!(chunk = self.id, error = %e, "Undecodable response from server");
                    stats.failure = Some(PipelineError::ResponseDecode {
                        expected,
                        received: stats.read,
                        source: e,
                    });
                    break;
                }
                Some(Ok(response)) => {
                    stats.read += 1;
                    classify(&mut stats, request, &response, verbose);
                }
            }
        }

        stats.elapsed = start.elapsed();
        stats
    }
}

/// Counts one response as an error or a reply and logs it.
fn classify(stats: &mut SendResult, request: &RespValue, response: &RespValue, verbose: bool) {
    match response {
        RespValue::Error(_) => {
            stats.errors += 1;
            if verbose {
                warn!(chunk = stats.chunk, "{} -> {}", request, response);
            } else {
                warn!(chunk = stats.chunk, "{}", response);
            }
        }
        _ => {
            stats.replies += 1;
            if verbose {
                info!(chunk = stats.chunk, "{} -> {}", request, response);
            } else {
                trace!(chunk = stats.chunk, "{} -> {}", request, response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DecodeError;

    fn chunk_of(ids: &ChunkIds, n: usize) -> Chunk {
        let mut chunk = Chunk::new(ids, n);
        for i in 0..n {
            let key = format!("key:{}", i);
            chunk.push(RespValue::command(["SET", key.as_str(), "v"]));
        }
        chunk
    }

    fn scripted(n: usize) -> ValueStream {
        let mut items = vec![Ok(RespValue::error("ERR wrong type"))];
        items.extend((1..n).map(|_| Ok(RespValue::simple_string("OK"))));
        ValueStream::from_items(items)
    }

    #[test]
    fn test_chunk_ids_increase() {
        let ids = ChunkIds::new();
        let a = Chunk::new(&ids, 1);
        let b = Chunk::new(&ids, 1);
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
    }

    #[test]
    fn test_chunk_ids_are_unique_across_threads() {
        let ids = std::sync::Arc::new(ChunkIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = std::sync::Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(all.last(), Some(&1000));
    }

    #[test]
    fn test_chunk_fills_to_capacity() {
        let ids = ChunkIds::new();
        let mut chunk = Chunk::new(&ids, 2);
        assert!(chunk.is_empty());
        chunk.push(RespValue::command(["PING"]));
        assert!(!chunk.is_full());
        chunk.push(RespValue::command(["PING"]));
        assert!(chunk.is_full());
        assert_eq!(chunk.len(), 2);
    }

    #[tokio::test]
    async fn test_send_writes_everything_in_order() {
        let ids = ChunkIds::new();
        let chunk = chunk_of(&ids, 2);
        let mut sink: Vec<u8> = Vec::new();
        let mut responses = scripted(2);

        let result = chunk.send(&mut sink, &mut responses, false).await;

        let mut expected = RespValue::command(["SET", "key:0", "v"]).serialize();
        expected.extend(RespValue::command(["SET", "key:1", "v"]).serialize());
        assert_eq!(sink, expected);
        assert_eq!(result.byte_size, expected.len());
    }

    #[tokio::test]
    async fn test_send_counts_errors_and_replies() {
        for n in [1usize, 2, 7, 64] {
            let ids = ChunkIds::new();
            let chunk = chunk_of(&ids, n);
            let mut sink: Vec<u8> = Vec::new();
            let mut responses = scripted(n);

            let result = chunk.send(&mut sink, &mut responses, true).await;
            assert_eq!(result.read, n);
            assert_eq!(result.errors, 1);
            assert_eq!(result.replies, n - 1);
            assert!(result.failure.is_none());
        }
    }

    #[tokio::test]
    async fn test_send_stops_when_responses_run_out() {
        let ids = ChunkIds::new();
        let chunk = chunk_of(&ids, 5);
        let mut sink: Vec<u8> = Vec::new();
        let mut responses = scripted(3);

        let result = chunk.send(&mut sink, &mut responses, false).await;
        assert_eq!(result.read, 3);
        assert!(result.read < 5);
        assert!(matches!(
            result.failure,
            Some(PipelineError::ResponseStreamClosed {
                expected: 5,
                received: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_send_stops_on_undecodable_response() {
        let ids = ChunkIds::new();
        let chunk = chunk_of(&ids, 3);
        let mut sink: Vec<u8> = Vec::new();
        let mut responses = ValueStream::from_items(vec![
            Ok(RespValue::simple_string("OK")),
            Err(DecodeError::Protocol("illegal start character".to_string())),
            Ok(RespValue::simple_string("OK")),
        ]);

        let result = chunk.send(&mut sink, &mut responses, false).await;
        assert_eq!(result.read, 1);
        assert!(matches!(
            result.failure,
            Some(PipelineError::ResponseDecode { received: 1, .. })
        ));
        // Nothing past the bad frame was consumed.
        assert!(matches!(responses.next().await, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_flush_failure_still_drains() {
        let ids = ChunkIds::new();
        let chunk = chunk_of(&ids, 2);
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut writer = tokio::io::BufWriter::new(mock);
        let mut responses = scripted(2);

        let result = chunk.send(&mut writer, &mut responses, false).await;
        assert_eq!(result.read, 2);
        assert_eq!(result.errors + result.replies, 2);
    }

    #[tokio::test]
    async fn test_write_failure_excluded_from_byte_count() {
        let ids = ChunkIds::new();
        let chunk = chunk_of(&ids, 2);
        let first = RespValue::command(["SET", "key:0", "v"]).serialize();
        let mock = tokio_test::io::Builder::new()
            .write(&first)
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut writer = mock;
        let mut responses = scripted(2);

        let result = chunk.send(&mut writer, &mut responses, false).await;
        assert_eq!(result.byte_size, first.len());
        assert_eq!(result.read, 2);
    }
}

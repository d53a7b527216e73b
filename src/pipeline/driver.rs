//! The Loader control loop.
//!
//! The loader is the only consumer of the input stream, the only consumer of
//! the response stream and the only writer to the connection. It alternates
//! between two states:
//!
//! - **Filling**: push decoded input values into the current chunk. Values
//!   that failed to decode are logged and skipped.
//! - **Draining**: once the chunk is full, send it, fold its result into the
//!   totals, pause, and start a new chunk sized by the controller.
//!
//! The first chunk always holds a single statement so the first round trip
//! measures plain request latency before the pipeline deepens.

use crate::config::LoaderConfig;
use crate::pipeline::chunk::{Chunk, ChunkIds};
use crate::pipeline::stats::{SendResult, SizingController, Totals};
use crate::pipeline::Aborted;
use crate::protocol::ValueStream;
use std::time::Instant;
use tokio::io::AsyncWrite;
use tracing::{error, info, warn};

/// Pipelines decoded commands to a server connection.
pub struct Loader<W> {
    writer: W,
    responses: ValueStream,
    controller: SizingController,
    ids: ChunkIds,
    verbose: bool,
    chunk_info: bool,
}

impl<W: AsyncWrite + Unpin> Loader<W> {
    /// Creates a loader over an already buffered writer and the response
    /// stream decoded from the same connection.
    pub fn new(writer: W, responses: ValueStream, config: LoaderConfig) -> Self {
        Self {
            writer,
            responses,
            controller: SizingController::new(config.sizing),
            ids: ChunkIds::new(),
            verbose: config.verbose,
            chunk_info: config.chunk_info,
        }
    }

    /// Runs until the input stream ends.
    ///
    /// Returns the totals, or the totals gathered so far if the response
    /// stream broke.
    pub async fn run(mut self, mut input: ValueStream) -> Result<Totals, Aborted> {
        let started = Instant::now();
        let mut totals = Totals::new();
        let mut chunk = Chunk::new(&self.ids, 1);

        while let Some(item) = input.next().await {
            match item {
                Ok(value) => chunk.push(value),
                Err(e) => {
                    totals.input_errors += 1;
                    warn!(error = %e, "Skipping undecodable input statement");
                    continue;
                }
            }
            if !chunk.is_full() {
                continue;
            }

            let capacity = chunk.capacity();
            let mut result = self.drain(chunk, &mut totals).await?;
            result.paused = self.controller.pause_for(result.elapsed);
            let next = self.controller.next_size(&result, capacity);
            result.log(next, self.controller.config().fallback_average, self.chunk_info);
            if !result.paused.is_zero() {
                tokio::time::sleep(result.paused).await;
            }
            chunk = Chunk::new(&self.ids, next);
        }

        if !chunk.is_empty() {
            let capacity = chunk.capacity();
            let result = self.drain(chunk, &mut totals).await?;
            result.log(capacity, self.controller.config().fallback_average, self.chunk_info);
        }

        info!(
            chunks = totals.chunks,
            statements = totals.statements,
            errors = totals.errors,
            replies = totals.replies,
            bytes = totals.bytes,
            input_errors = totals.input_errors,
            wall = ?started.elapsed(),
            "Load complete"
        );
        Ok(totals)
    }

    /// Sends one chunk and folds its result into `totals`.
    async fn drain(&mut self, chunk: Chunk, totals: &mut Totals) -> Result<SendResult, Aborted> {
        let mut result = chunk
            .send(&mut self.writer, &mut self.responses, self.verbose)
            .await;
        totals.accumulate(&result);

        match result.failure.take() {
            None => Ok(result),
            Some(cause) => {
                error!(chunk = result.chunk, error = %cause, "Stopping load");
                Err(Aborted {
                    totals: totals.clone(),
                    cause,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizingConfig;
    use crate::pipeline::PipelineError;
    use crate::protocol::{spawn_decoder, RespValue, ValueReader};
    use std::net::SocketAddr;
    use tokio::io::BufWriter;
    use tokio::net::{TcpListener, TcpStream};

    fn test_config() -> LoaderConfig {
        LoaderConfig {
            sizing: SizingConfig {
                pause_fraction: 0.0,
                ..Default::default()
            },
            channel_capacity: Some(16),
            ..Default::default()
        }
    }

    fn set_commands(n: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for i in 0..n {
            let key = format!("key:{}", i);
            RespValue::command(["SET", key.as_str(), "value"]).serialize_into(&mut buf);
        }
        buf
    }

    /// Answers `-ERR` to commands named BAD and `+OK` to everything else.
    /// Closes the connection after `limit` replies when a limit is given.
    async fn create_test_server(limit: Option<usize>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut requests = ValueReader::new(read);
            let mut answered = 0;
            while let Some(Ok(request)) = requests.next().await {
                if limit == Some(answered) {
                    return;
                }
                let is_bad = request
                    .as_array()
                    .and_then(|parts| parts.first())
                    .and_then(RespValue::as_bytes)
                    == Some(&b"BAD"[..]);
                let reply = if is_bad {
                    RespValue::error("ERR bad command")
                } else {
                    RespValue::simple_string("OK")
                };
                if reply.write_to(&mut write).await.is_err() {
                    return;
                }
                answered += 1;
            }
        });

        addr
    }

    async fn connect(addr: SocketAddr) -> (BufWriter<tokio::net::tcp::OwnedWriteHalf>, ValueStream) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        let (responses, _) = spawn_decoder(ValueReader::new(read), Some(16), "responses");
        (BufWriter::new(write), responses)
    }

    #[tokio::test]
    async fn test_chunk_sizes_ramp_from_one() {
        let mut responses = Vec::new();
        for _ in 0..10 {
            responses.push(Ok(RespValue::simple_string("OK")));
        }
        let mut input = Vec::new();
        for _ in 0..10 {
            input.push(Ok(RespValue::command(["PING"])));
        }

        let mut sink: Vec<u8> = Vec::new();
        let loader = Loader::new(&mut sink, ValueStream::from_items(responses), test_config());
        let totals = loader.run(ValueStream::from_items(input)).await.unwrap();

        // 1 + 2 + 4, then the partial chunk of 3
        assert_eq!(totals.chunks, 4);
        assert_eq!(totals.statements, 10);
        assert_eq!(totals.replies, 10);
        assert_eq!(totals.errors, 0);
        assert_eq!(sink.len(), 10 * b"*1\r\n$4\r\nPING\r\n".len());
    }

    #[tokio::test]
    async fn test_input_errors_are_skipped() {
        let input = vec![
            Ok(RespValue::command(["PING"])),
            Err(crate::protocol::DecodeError::Protocol("illegal start character".to_string())),
            Ok(RespValue::command(["PING"])),
        ];
        let responses = vec![
            Ok(RespValue::simple_string("PONG")),
            Ok(RespValue::simple_string("PONG")),
        ];

        let mut sink: Vec<u8> = Vec::new();
        let loader = Loader::new(&mut sink, ValueStream::from_items(responses), test_config());
        let totals = loader.run(ValueStream::from_items(input)).await.unwrap();

        assert_eq!(totals.input_errors, 1);
        assert_eq!(totals.replies, 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut sink: Vec<u8> = Vec::new();
        let loader = Loader::new(&mut sink, ValueStream::from_items(vec![]), test_config());
        let totals = loader.run(ValueStream::from_items(vec![])).await.unwrap();
        assert_eq!(totals, Totals::new());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_load_against_server() {
        let addr = create_test_server(None).await;
        let (writer, responses) = connect(addr).await;

        let mut input = set_commands(50);
        RespValue::command(["BAD", "one"]).serialize_into(&mut input);
        input.extend_from_slice(b"?junk\r\n");
        RespValue::command(["BAD", "two"]).serialize_into(&mut input);

        let (input, _) = spawn_decoder(ValueReader::new(std::io::Cursor::new(input)), Some(16), "input");
        let totals = Loader::new(writer, responses, test_config())
            .run(input)
            .await
            .unwrap();

        assert_eq!(totals.statements, 52);
        assert_eq!(totals.errors, 2);
        assert_eq!(totals.replies, 50);
        assert_eq!(totals.input_errors, 1);
        assert_eq!(totals.to_string(), "errors: 2 replies: 50");
    }

    #[tokio::test]
    async fn test_server_hangup_aborts_with_partial_totals() {
        let addr = create_test_server(Some(3)).await;
        let (writer, responses) = connect(addr).await;

        let (input, _) = spawn_decoder(
            ValueReader::new(std::io::Cursor::new(set_commands(20))),
            Some(16),
            "input",
        );
        let aborted = Loader::new(writer, responses, test_config())
            .run(input)
            .await
            .unwrap_err();

        // Chunks of 1 and 2 succeed; the chunk of 4 finds the stream closed.
        assert_eq!(aborted.totals.replies, 3);
        assert_eq!(aborted.totals.chunks, 3);
        // Depending on timing the peer's close shows up as EOF or as a reset.
        assert!(matches!(
            aborted.cause,
            PipelineError::ResponseStreamClosed {
                expected: 4,
                received: 0
            } | PipelineError::ResponseDecode {
                expected: 4,
                received: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_writer_is_flushed_per_chunk() {
        let addr = create_test_server(None).await;
        let (writer, responses) = connect(addr).await;

        let (input, _) = spawn_decoder(
            ValueReader::new(std::io::Cursor::new(set_commands(1))),
            None,
            "input",
        );
        // A single statement must reach the server without any later write.
        let totals = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            Loader::new(writer, responses, test_config()).run(input),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(totals.replies, 1);
    }
}

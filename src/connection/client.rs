//! Client Connection
//!
//! Opens the TCP connection to the server, runs the optional AUTH handshake
//! and then splits the socket into the two halves the loader needs:
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  Loader ──────> │ BufWriter<OwnedWriteHalf>    │ ──> server
//!                 └──────────────────────────────┘
//!                 ┌──────────────────────────────┐
//!  Loader <────── │ ValueStream <- decoder task  │ <── server
//!                 │  (BufReader<OwnedReadHalf>)  │
//!                 └──────────────────────────────┘
//! ```
//!
//! The handshake reads through the same `BufReader` the decoder task takes
//! over, so bytes it has already buffered are not lost.

use crate::pipeline::PipelineError;
use crate::protocol::{spawn_decoder, RespValue, ValueReader, ValueStream};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A connected, not yet streaming, server connection.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    addr: SocketAddr,
}

impl Connection {
    /// Connects to the server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, PipelineError> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, PipelineError> {
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        info!(server = %addr, "Connected");
        Ok(Self {
            reader: BufReader::new(read),
            writer: BufWriter::new(write),
            addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends `AUTH <password>` and waits for the `+OK` acknowledgement.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), PipelineError> {
        RespValue::command(["AUTH", password])
            .write_to(&mut self.writer)
            .await?;
        self.writer.flush().await?;

        let mut reader = ValueReader::from_buffered(&mut self.reader);
        match reader.read_value().await {
            Ok(Some(reply)) if reply.is_ok() => {
                debug!(server = %self.addr, "Authenticated");
                Ok(())
            }
            Ok(Some(reply)) => {
                warn!(server = %self.addr, reply = %reply, "AUTH rejected");
                Err(PipelineError::Auth(reply.to_string()))
            }
            Ok(None) => Err(PipelineError::Auth(
                "connection closed during handshake".to_string(),
            )),
            Err(e) => Err(PipelineError::Auth(e.to_string())),
        }
    }

    /// Hands the connection over to the streaming loop: the buffered writer,
    /// and the response stream decoded on a background task.
    pub fn into_parts(
        self,
        capacity: Option<usize>,
        max_depth: usize,
    ) -> (BufWriter<OwnedWriteHalf>, ValueStream, JoinHandle<()>) {
        let reader = ValueReader::from_buffered(self.reader).with_max_depth(max_depth);
        let (responses, handle) = spawn_decoder(reader, capacity, "responses");
        (self.writer, responses, handle)
    }
}

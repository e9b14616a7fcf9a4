//! I/O traits and TCP implementations for the PHD2 client
//!
//! The line reader, message writer, and connection factory are trait
//! seams so tests can drive the client without a socket. The default
//! implementations wrap the two halves of a `tokio::net::TcpStream`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Phd2Error, Result};

/// Connection pair containing a reader and writer
pub struct ConnectionPair {
    /// Reader for receiving messages
    pub reader: Box<dyn LineReader>,
    /// Writer for sending messages
    pub writer: Box<dyn MessageWriter>,
}

/// Trait for reading lines from a connection
///
/// Returns `Ok(Some(line))` for a line, `Ok(None)` at end of stream.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait LineReader: Send {
    async fn read_line(&mut self) -> Result<Option<String>>;
}

/// TCP implementation of LineReader using a buffered reader
pub struct TcpLineReader {
    reader: BufReader<ReadHalf<TcpStream>>,
    buffer: String,
}

impl TcpLineReader {
    /// Create a new TCP line reader from a read half of a TCP stream
    pub fn new(reader: ReadHalf<TcpStream>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
        }
    }
}

#[async_trait]
impl LineReader for TcpLineReader {
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        match self.reader.read_line(&mut self.buffer).await {
            Ok(0) => Ok(None), // EOF
            Ok(_) => Ok(Some(self.buffer.trim().to_string())),
            Err(e) => Err(Phd2Error::Io(e)),
        }
    }
}

/// Trait for writing messages to a connection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MessageWriter: Send {
    /// Write a message to the connection
    ///
    /// The message is written with a CRLF terminator and flushed.
    async fn write_message(&mut self, message: &str) -> Result<()>;

    /// Shutdown the writer
    async fn shutdown(&mut self) -> Result<()>;
}

/// TCP implementation of MessageWriter
pub struct TcpMessageWriter {
    writer: WriteHalf<TcpStream>,
}

impl TcpMessageWriter {
    /// Create a new TCP message writer from a write half of a TCP stream
    pub fn new(writer: WriteHalf<TcpStream>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl MessageWriter for TcpMessageWriter {
    async fn write_message(&mut self, message: &str) -> Result<()> {
        self.writer
            .write_all(format!("{}\r\n", message).as_bytes())
            .await
            .map_err(|e| Phd2Error::SendError(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Phd2Error::SendError(e.to_string()))?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Phd2Error::Io)
    }
}

/// Trait for creating connections
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionFactory: Send + Sync {
    /// Attempt to connect to the specified address
    ///
    /// Returns a connection pair (reader and writer) on success. A
    /// failed attempt leaves nothing behind; the caller can retry with
    /// the same factory.
    async fn connect(&self, addr: &str, timeout: Duration) -> Result<ConnectionPair>;
}

/// TCP implementation of ConnectionFactory
#[derive(Default, Clone)]
pub struct TcpConnectionFactory;

impl TcpConnectionFactory {
    /// Create a new TCP connection factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    async fn connect(&self, addr: &str, timeout: Duration) -> Result<ConnectionPair> {
        debug!("Connecting to {} with timeout {:?}", addr, timeout);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Phd2Error::Timeout(format!("Connection to {} timed out", addr)))?
            .map_err(|e| {
                Phd2Error::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;

        debug!("TCP connection established to {}", addr);

        let (reader, writer) = tokio::io::split(stream);

        Ok(ConnectionPair {
            reader: Box::new(TcpLineReader::new(reader)),
            writer: Box::new(TcpMessageWriter::new(writer)),
        })
    }
}

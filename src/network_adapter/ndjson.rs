// src/network_adapter/ndjson.rs
use super::r#trait::NetworkAdapter;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Newline-delimited JSON over any byte stream pair.
///
/// This is the framing MCP uses for stdio, and what the TCP endpoint speaks.
pub struct NdjsonAdapter<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
}

pub type TcpAdapter = NdjsonAdapter<OwnedReadHalf, OwnedWriteHalf>;
pub type StdioAdapter = NdjsonAdapter<Stdin, Stdout>;

impl<R, W> NdjsonAdapter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Pops the next complete line out of the read buffer, if there is one.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

impl NdjsonAdapter<OwnedReadHalf, OwnedWriteHalf> {
    /// Connects to a TCP endpoint speaking NDJSON.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from(stream))
    }
}

impl From<TcpStream> for NdjsonAdapter<OwnedReadHalf, OwnedWriteHalf> {
    fn from(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(read_half, write_half)
    }
}

impl NdjsonAdapter<Stdin, Stdout> {
    /// The process's stdin/stdout, as used by single-session servers.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

fn decode(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line).map_err(|e| Error::InvalidFrame(format!("invalid UTF-8: {}", e)))
}

#[async_trait]
impl<R, W> NetworkAdapter for NdjsonAdapter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, msg: &str) -> Result<()> {
        self.writer.write_all(msg.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return decode(line).map(Some);
            }
            // `read_buf` is cancel-safe, and partial lines stay in `buffer`.
            let read = self.reader.read_buf(&mut self.buffer).await?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                return decode(rest).map(Some);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

//! Frame transport
//!
//! Blocking-style framed I/O over any byte stream. Every call either moves the
//! full requested amount or fails; callers never see a partial field.
//!
//! Field encodings:
//! - text (command line, status, name): 4-byte big-endian length + UTF-8 bytes
//! - size: 4-byte big-endian `u32`
//! - payload: raw bytes, exactly as many as the preceding size announced
//!
//! Every single read or write moves at most [`CHUNK_SIZE`] bytes and is bounded
//! by the stream's I/O timeout. A read or write of zero bytes means the remote
//! end is gone.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use scatter_core::{CHUNK_SIZE, MAX_TEXT_FRAME};

/// Socket-level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection closed by remote")]
    Closed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("text frame is not valid UTF-8")]
    InvalidText,
}

impl TransportError {
    /// Remote hung up cleanly between frames
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// A byte stream speaking the scatter field encodings
pub struct FrameStream<S> {
    inner: S,
    io_timeout: Duration,
}

impl FrameStream<TcpStream> {
    /// Open a TCP connection, bounded by `connect_timeout`
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))??;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", addr);
        Ok(Self::new(stream, io_timeout))
    }
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S, io_timeout: Duration) -> Self {
        Self { inner, io_timeout }
    }

    async fn write_some(&mut self, chunk: &[u8]) -> Result<usize, TransportError> {
        let written = timeout(self.io_timeout, self.inner.write(chunk))
            .await
            .map_err(|_| TransportError::Timeout(self.io_timeout))??;
        if written == 0 {
            return Err(TransportError::Closed);
        }
        Ok(written)
    }

    async fn read_some_within(
        &mut self,
        buf: &mut [u8],
        limit: Duration,
    ) -> Result<usize, TransportError> {
        let read = timeout(limit, self.inner.read(buf))
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        Ok(read)
    }

    /// Read at least one and at most `buf.len()` (capped at one chunk) bytes
    pub async fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let len = buf.len().min(CHUNK_SIZE);
        let limit = self.io_timeout;
        self.read_some_within(&mut buf[..len], limit).await
    }

    /// Write the whole buffer, one chunk per call
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut total_sent = 0;
        while total_sent < data.len() {
            let end = (total_sent + CHUNK_SIZE).min(data.len());
            total_sent += self.write_some(&data[total_sent..end]).await?;
        }
        timeout(self.io_timeout, self.inner.flush())
            .await
            .map_err(|_| TransportError::Timeout(self.io_timeout))??;
        Ok(())
    }

    async fn recv_exact_within(
        &mut self,
        buf: &mut [u8],
        first_read_limit: Duration,
    ) -> Result<(), TransportError> {
        let mut total_received = 0;
        let mut limit = first_read_limit;
        while total_received < buf.len() {
            let end = (total_received + CHUNK_SIZE).min(buf.len());
            total_received += self
                .read_some_within(&mut buf[total_received..end], limit)
                .await?;
            limit = self.io_timeout;
        }
        Ok(())
    }

    /// Fill `buf` completely
    pub async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let limit = self.io_timeout;
        self.recv_exact_within(buf, limit).await
    }

    /// Receive exactly `len` bytes
    ///
    /// Callers validate `len` against the size ceiling first; this allocates it.
    pub async fn recv_all(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        self.recv_exact(&mut buf).await?;
        Ok(buf)
    }

    pub async fn send_size(&mut self, size: u32) -> Result<(), TransportError> {
        self.send_all(&size.to_be_bytes()).await
    }

    pub async fn recv_size(&mut self) -> Result<u32, TransportError> {
        let mut len_buf = [0u8; 4];
        self.recv_exact(&mut len_buf).await?;
        Ok(u32::from_be_bytes(len_buf))
    }

    /// Send a status line, name or command line
    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if text.len() > MAX_TEXT_FRAME {
            return Err(TransportError::FrameTooLarge {
                size: text.len(),
                max: MAX_TEXT_FRAME,
            });
        }
        let mut frame = Vec::with_capacity(4 + text.len());
        frame.extend_from_slice(&(text.len() as u32).to_be_bytes());
        frame.extend_from_slice(text.as_bytes());
        self.send_all(&frame).await
    }

    pub async fn recv_text(&mut self) -> Result<String, TransportError> {
        let limit = self.io_timeout;
        self.recv_text_within(limit).await
    }

    /// Like [`recv_text`](Self::recv_text), but the first byte may take up to
    /// `idle` to arrive. Used while a session waits for its next command.
    pub async fn recv_text_within(&mut self, idle: Duration) -> Result<String, TransportError> {
        let mut len_buf = [0u8; 4];
        self.recv_exact_within(&mut len_buf, idle).await?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_TEXT_FRAME {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_TEXT_FRAME,
            });
        }

        let bytes = self.recv_all(len).await?;
        String::from_utf8(bytes).map_err(|_| TransportError::InvalidText)
    }

    /// Stream `len` bytes from a local reader to the remote end
    pub async fn send_from<R>(&mut self, reader: &mut R, len: u64) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let read = reader.read(&mut buf[..want]).await?;
            if read == 0 {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "source ended before announced size",
                )));
            }
            self.send_all(&buf[..read]).await?;
            remaining -= read as u64;
        }
        Ok(())
    }

    /// Forward `len` payload bytes from this stream to `to` in bounded chunks
    ///
    /// Nothing beyond one chunk is ever held in memory.
    pub async fn relay_to<T>(
        &mut self,
        to: &mut FrameStream<T>,
        len: u64,
    ) -> Result<(), TransportError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let read = self.recv_some(&mut buf[..want]).await?;
            to.send_all(&buf[..read]).await?;
            remaining -= read as u64;
        }
        Ok(())
    }

    /// Read and drop `len` payload bytes to stay in step with the sender
    pub async fn discard(&mut self, len: u64) -> Result<(), TransportError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            remaining -= self.recv_some(&mut buf[..want]).await? as u64;
        }
        Ok(())
    }
}

//! Buffered I/O streams for RFB protocol communication.
//!
//! [`RfbInStream`] and [`RfbOutStream`] wrap a duplex byte stream's halves
//! with internal buffers and typed big-endian accessors. All RFB integers
//! are network byte order.
//!
//! Writes are buffered locally and become visible to the peer only on
//! [`RfbOutStream::flush`]; every message-level write ends with a flush.
//! Reads that hit end-of-stream before the requested width fail with
//! [`std::io::ErrorKind::UnexpectedEof`].

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Buffered input stream with big-endian primitive readers.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Fill the buffer until at least `n` bytes are available.
    async fn ensure_bytes(&mut self, n: usize) -> std::io::Result<()> {
        while self.buffer.len() < n {
            let bytes_read = self.reader.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", n, self.buffer.len()),
                ));
            }
        }
        Ok(())
    }

    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        self.ensure_bytes(1).await?;
        Ok(self.buffer.get_u8())
    }

    pub async fn read_u16(&mut self) -> std::io::Result<u16> {
        self.ensure_bytes(2).await?;
        Ok(self.buffer.get_u16())
    }

    pub async fn read_u32(&mut self) -> std::io::Result<u32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_u32())
    }

    pub async fn read_i32(&mut self) -> std::io::Result<i32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_i32())
    }

    pub async fn read_u64(&mut self) -> std::io::Result<u64> {
        self.ensure_bytes(8).await?;
        Ok(self.buffer.get_u64())
    }

    /// Read exactly `buf.len()` bytes.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.ensure_bytes(buf.len()).await?;
        self.buffer.copy_to_slice(buf);
        Ok(())
    }

    /// Read exactly `n` bytes into a fresh vector.
    pub async fn read_exact_vec(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_bytes(&mut buf).await?;
        Ok(buf)
    }

    /// Discard `n` bytes (padding, unused capability blocks).
    pub async fn skip(&mut self, n: usize) -> std::io::Result<()> {
        self.ensure_bytes(n).await?;
        self.buffer.advance(n);
        Ok(())
    }

    /// Bytes currently readable without touching the transport.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Buffered output stream with big-endian primitive writers.
///
/// Nothing reaches the peer until [`RfbOutStream::flush`] is called.
pub struct RfbOutStream<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> RfbOutStream<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64(value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write `n` zero bytes of padding.
    pub fn write_padding(&mut self, n: usize) {
        for _ in 0..n {
            self.buffer.put_u8(0);
        }
    }

    /// Push all buffered data to the transport and flush it.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.flush().await
    }

    /// Bytes buffered and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

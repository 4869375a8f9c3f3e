//! FBS session-file reader.
//!
//! An FBS file starts with the 12-byte banner `FBS 001.000\n`, followed by
//! a sequence of blocks:
//!
//! ```text
//! +--------------+----------------------------+-------------------+
//! | length (u32) | payload, padded to 4 bytes | timestamp_ms (u32)|
//! +--------------+----------------------------+-------------------+
//! ```
//!
//! All integers are big-endian. The payloads, concatenated with padding and
//! timestamps stripped, form the byte stream a live server would have sent:
//! the recorded RFB banner, a security result word, the ServerInit tail and
//! then ordinary server messages.
//!
//! [`FbsReader`] exposes that logical stream through [`AsyncRead`], so the
//! regular client machinery can run on top of it unchanged, and tracks the
//! timestamp of the most recently loaded block for replay pacing.

use crate::error::{ProtocolError, Result};
use crate::handshake::parse_version;
use crate::messages::{pixel_format_from_bytes, ServerInit};
use bytes::BytesMut;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub const FBS_BANNER: &[u8; 12] = b"FBS 001.000\n";

/// Progress through one `{length, payload, timestamp}` block.
#[derive(Debug)]
enum FillState {
    Length {
        buf: [u8; 4],
        filled: usize,
    },
    Payload {
        length: usize,
        padded: Vec<u8>,
        filled: usize,
    },
    Timestamp {
        length: usize,
        payload: Vec<u8>,
        buf: [u8; 4],
        filled: usize,
    },
}

impl FillState {
    fn start() -> Self {
        Self::Length {
            buf: [0; 4],
            filled: 0,
        }
    }
}

/// Reader presenting a recorded FBS session as a server-side byte stream.
#[derive(Debug)]
pub struct FbsReader<R> {
    reader: R,
    buffer: BytesMut,
    state: FillState,
    current_timestamp: u32,
}

impl<R: AsyncRead + Unpin> FbsReader<R> {
    /// Validate the file banner and wrap the reader.
    pub async fn open(mut reader: R) -> Result<Self> {
        let mut banner = [0u8; 12];
        reader.read_exact(&mut banner).await?;
        if &banner != FBS_BANNER {
            return Err(ProtocolError::malformed(format!(
                "not an FBS file (banner {:?})",
                String::from_utf8_lossy(&banner)
            )));
        }
        Ok(Self {
            reader,
            buffer: BytesMut::new(),
            state: FillState::start(),
            current_timestamp: 0,
        })
    }

    /// Timestamp (milliseconds since session start) of the last block whose
    /// bytes have been made available.
    pub fn current_timestamp(&self) -> u32 {
        self.current_timestamp
    }

    /// Parse the recorded session prologue: the RFB banner the server sent,
    /// the security result word and the ServerInit fields.
    ///
    /// Must be called once, directly after [`FbsReader::open`], before the
    /// stream is handed to the message layer.
    pub async fn read_start_session(&mut self) -> Result<ServerInit> {
        let mut banner = [0u8; 12];
        self.read_exact(&mut banner).await?;
        parse_version(&banner)?;

        // Security result word recorded after the (None) negotiation.
        let _security_result = AsyncReadExt::read_u32(self).await?;

        let width = AsyncReadExt::read_u16(self).await?;
        let height = AsyncReadExt::read_u16(self).await?;

        let mut pf_bytes = [0u8; 16];
        self.read_exact(&mut pf_bytes).await?;
        let pixel_format = pixel_format_from_bytes(&pf_bytes)?;

        let name_len = AsyncReadExt::read_u32(self).await? as usize;
        let mut name = vec![0u8; name_len];
        self.read_exact(&mut name).await?;

        Ok(ServerInit {
            width,
            height,
            pixel_format,
            name: String::from_utf8_lossy(&name).into_owned(),
        })
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for FbsReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            // Serve buffered payload first.
            if !this.buffer.is_empty() {
                let n = buf.remaining().min(this.buffer.len());
                buf.put_slice(&this.buffer.split_to(n));
                return Poll::Ready(Ok(()));
            }

            match &mut this.state {
                FillState::Length { buf: header, filled } => {
                    while *filled < 4 {
                        let mut read_buf = ReadBuf::new(&mut header[*filled..]);
                        ready!(Pin::new(&mut this.reader).poll_read(cx, &mut read_buf))?;
                        let n = read_buf.filled().len();
                        if n == 0 {
                            if *filled == 0 {
                                // Clean end of file at a block boundary.
                                return Poll::Ready(Ok(()));
                            }
                            return Poll::Ready(Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "FBS file truncated inside a block header",
                            )));
                        }
                        *filled += n;
                    }
                    let length = u32::from_be_bytes(*header) as usize;
                    let padded = (length + 3) & !3;
                    this.state = FillState::Payload {
                        length,
                        padded: vec![0; padded],
                        filled: 0,
                    };
                }
                FillState::Payload {
                    length,
                    padded,
                    filled,
                } => {
                    while *filled < padded.len() {
                        let mut read_buf = ReadBuf::new(&mut padded[*filled..]);
                        ready!(Pin::new(&mut this.reader).poll_read(cx, &mut read_buf))?;
                        let n = read_buf.filled().len();
                        if n == 0 {
                            return Poll::Ready(Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "FBS file truncated inside a block payload",
                            )));
                        }
                        *filled += n;
                    }
                    let length = *length;
                    let payload = std::mem::take(padded);
                    this.state = FillState::Timestamp {
                        length,
                        payload,
                        buf: [0; 4],
                        filled: 0,
                    };
                }
                FillState::Timestamp {
                    length,
                    payload,
                    buf: ts_buf,
                    filled,
                } => {
                    while *filled < 4 {
                        let mut read_buf = ReadBuf::new(&mut ts_buf[*filled..]);
                        ready!(Pin::new(&mut this.reader).poll_read(cx, &mut read_buf))?;
                        let n = read_buf.filled().len();
                        if n == 0 {
                            return Poll::Ready(Err(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "FBS file truncated inside a block timestamp",
                            )));
                        }
                        *filled += n;
                    }
                    this.current_timestamp = u32::from_be_bytes(*ts_buf);
                    let length = *length;
                    let payload = std::mem::take(payload);
                    this.buffer.extend_from_slice(&payload[..length]);
                    this.state = FillState::start();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RfbInStream, RfbOutStream};
    use crate::messages::write_pixel_format;
    use rfb_canvas::PixelFormat;
    use std::io::Cursor;

    fn block(payload: &[u8], timestamp: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        let padded = (payload.len() + 3) & !3;
        out.resize(4 + padded, 0);
        out.extend_from_slice(&timestamp.to_be_bytes());
        out
    }

    fn fbs_file(blocks: &[(Vec<u8>, u32)]) -> Vec<u8> {
        let mut file = FBS_BANNER.to_vec();
        for (payload, ts) in blocks {
            file.extend_from_slice(&block(payload, *ts));
        }
        file
    }

    #[tokio::test]
    async fn rejects_wrong_banner() {
        let err = FbsReader::open(Cursor::new(b"RFB 003.008\n".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }

    /// A minimal recording: one block holding the RFB banner at timestamp 0.
    #[tokio::test]
    async fn single_block_stream() {
        let file = fbs_file(&[(b"RFB 003.008\n".to_vec(), 0)]);
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();

        let mut banner = [0u8; 12];
        fbs.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"RFB 003.008\n");
        assert_eq!(fbs.current_timestamp(), 0);
    }

    #[tokio::test]
    async fn padding_is_stripped_and_timestamps_advance() {
        let file = fbs_file(&[
            (vec![1, 2, 3, 4, 5], 100), // padded to 8 bytes on disk
            (vec![6, 7], 250),
        ]);
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();

        let mut first = [0u8; 5];
        fbs.read_exact(&mut first).await.unwrap();
        assert_eq!(first, [1, 2, 3, 4, 5]);
        assert_eq!(fbs.current_timestamp(), 100);

        let mut second = [0u8; 2];
        fbs.read_exact(&mut second).await.unwrap();
        assert_eq!(second, [6, 7]);
        assert_eq!(fbs.current_timestamp(), 250);
    }

    #[tokio::test]
    async fn reads_spanning_blocks() {
        let file = fbs_file(&[(vec![1, 2, 3], 10), (vec![4, 5, 6], 20)]);
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();

        let mut all = [0u8; 6];
        fbs.read_exact(&mut all).await.unwrap();
        assert_eq!(all, [1, 2, 3, 4, 5, 6]);
        assert_eq!(fbs.current_timestamp(), 20);
    }

    #[tokio::test]
    async fn clean_eof_at_block_boundary() {
        let file = fbs_file(&[(vec![9], 5)]);
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();

        let mut byte = [0u8; 1];
        fbs.read_exact(&mut byte).await.unwrap();
        let mut more = [0u8; 1];
        let err = fbs.read_exact(&mut more).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn truncated_block_is_an_error() {
        let mut file = fbs_file(&[]);
        file.extend_from_slice(&8u32.to_be_bytes());
        file.extend_from_slice(&[1, 2, 3]); // payload cut short
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();

        let mut buf = [0u8; 1];
        let err = fbs.read_exact(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn start_session_parses_server_init() {
        // Second block: security result, then the ServerInit fields.
        let mut init_block = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut init_block);
            out.write_u32(0); // security result
            out.write_u16(1024);
            out.write_u16(768);
            write_pixel_format(&mut out, &PixelFormat::rgb32());
            out.write_u32(8);
            out.write_bytes(b"recorded");
            out.flush().await.unwrap();
        }

        let file = fbs_file(&[(b"RFB 003.008\n".to_vec(), 0), (init_block, 0)]);
        let mut fbs = FbsReader::open(Cursor::new(file)).await.unwrap();
        let init = fbs.read_start_session().await.unwrap();

        assert_eq!(init.width, 1024);
        assert_eq!(init.height, 768);
        assert_eq!(init.pixel_format, PixelFormat::rgb32());
        assert_eq!(init.name, "recorded");
    }

    /// The logical stream feeds the regular buffered message reader.
    #[tokio::test]
    async fn composes_with_rfb_in_stream() {
        let file = fbs_file(&[(vec![0x12, 0x34, 0x56, 0x78], 7)]);
        let fbs = FbsReader::open(Cursor::new(file)).await.unwrap();
        let mut stream = RfbInStream::new(fbs);
        assert_eq!(stream.read_u32().await.unwrap(), 0x12345678);
        assert_eq!(stream.get_mut().current_timestamp(), 7);
    }
}

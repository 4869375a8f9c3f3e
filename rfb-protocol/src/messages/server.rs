//! Server-to-client RFB messages.
//!
//! `FramebufferUpdate` is split into a header plus per-rectangle payloads:
//! the payload bytes are parsed by the codec the rectangle's encoding type
//! selects, so full parsing lives with the connection runtime that owns the
//! decoder registry. Everything else is self-contained here.

use super::types::{self, read_pixel_format, write_pixel_format};
use crate::error::Result;
use crate::io::{RfbInStream, RfbOutStream};
use rfb_canvas::{PixelFormat, Rgb16};
use tokio::io::{AsyncRead, AsyncWrite};

/// ServerInit: sent once after the security phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        let width = stream.read_u16().await?;
        let height = stream.read_u16().await?;
        let pixel_format = read_pixel_format(stream).await?;
        let name_len = stream.read_u32().await? as usize;
        let name_bytes = stream.read_exact_vec(name_len).await?;
        Ok(Self {
            width,
            height,
            pixel_format,
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.width);
        stream.write_u16(self.height);
        write_pixel_format(stream, &self.pixel_format);
        stream.write_u32(self.name.len() as u32);
        stream.write_bytes(self.name.as_bytes());
    }
}

/// FramebufferUpdate (0) header: 1 pad byte plus the rectangle count.
///
/// `num_rects` rectangle headers, each followed by its encoded payload,
/// come next on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateHeader {
    pub num_rects: u16,
}

impl FramebufferUpdateHeader {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(1).await?;
        Ok(Self {
            num_rects: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::SERVER_MSG_FRAMEBUFFER_UPDATE);
        stream.write_padding(1);
        stream.write_u16(self.num_rects);
    }
}

/// SetColorMapEntries (1): colormap update for non-true-color formats.
///
/// Each entry is three u16 intensities (6 bytes), per RFB §7.6.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetColorMapEntries {
    pub first_color: u16,
    pub colors: Vec<Rgb16>,
}

impl SetColorMapEntries {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(1).await?;
        let first_color = stream.read_u16().await?;
        let count = stream.read_u16().await? as usize;
        let mut colors = Vec::with_capacity(count);
        for _ in 0..count {
            colors.push(Rgb16::new(
                stream.read_u16().await?,
                stream.read_u16().await?,
                stream.read_u16().await?,
            ));
        }
        Ok(Self {
            first_color,
            colors,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::SERVER_MSG_SET_COLOR_MAP_ENTRIES);
        stream.write_padding(1);
        stream.write_u16(self.first_color);
        stream.write_u16(self.colors.len() as u16);
        for color in &self.colors {
            stream.write_u16(color.r);
            stream.write_u16(color.g);
            stream.write_u16(color.b);
        }
    }
}

/// Bell (2): no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bell;

impl Bell {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::SERVER_MSG_BELL);
    }
}

/// ServerCutText (3): clipboard bytes from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCutText {
    pub text: Vec<u8>,
}

impl ServerCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(3).await?;
        let length = stream.read_u32().await? as usize;
        let text = stream.read_exact_vec(length).await?;
        Ok(Self { text })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::SERVER_MSG_SERVER_CUT_TEXT);
        stream.write_padding(3);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(&self.text);
    }
}

/// Tagged union of the self-contained server messages.
///
/// `FramebufferUpdate` appears here as its header only; rectangle payloads
/// are decoded in-stream by the connection runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    FramebufferUpdate(FramebufferUpdateHeader),
    SetColorMapEntries(SetColorMapEntries),
    Bell,
    ServerCutText(ServerCutText),
}

impl ServerMessage {
    /// Serialize the message and flush it to the peer.
    pub async fn write<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) -> Result<()> {
        match self {
            Self::FramebufferUpdate(header) => header.write_to(stream),
            Self::SetColorMapEntries(msg) => msg.write_to(stream),
            Self::Bell => Bell.write_to(stream),
            Self::ServerCutText(msg) => msg.write_to(stream),
        }
        stream.flush().await?;
        Ok(())
    }
}

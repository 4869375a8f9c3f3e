//! Client-to-server RFB messages.

use super::types::{self, read_pixel_format, write_pixel_format};
use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use rfb_canvas::PixelFormat;
use tokio::io::{AsyncRead, AsyncWrite};

/// ClientInit: one shared-flag byte, sent after the security phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInit {
    pub shared: bool,
}

impl ClientInit {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        let flag = stream.read_u8().await?;
        if flag > 1 {
            return Err(ProtocolError::malformed(format!(
                "shared flag must be 0 or 1, got {}",
                flag
            )));
        }
        Ok(Self { shared: flag == 1 })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(u8::from(self.shared));
    }
}

/// SetPixelFormat (0): 3 pad bytes then the 16-byte pixel format.
///
/// When the new format has true-color off, the receiver must invalidate its
/// colormap; the stale entries belong to the previous format.
#[derive(Debug, Clone, PartialEq)]
pub struct SetPixelFormat {
    pub pixel_format: PixelFormat,
}

impl SetPixelFormat {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(3).await?;
        let pixel_format = read_pixel_format(stream).await?;
        Ok(Self { pixel_format })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_SET_PIXEL_FORMAT);
        stream.write_padding(3);
        write_pixel_format(stream, &self.pixel_format);
    }
}

/// SetEncodings (2): encoding type codes in client preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(1).await?;
        let count = stream.read_u16().await? as usize;
        let mut encodings = Vec::with_capacity(count);
        for _ in 0..count {
            encodings.push(stream.read_i32().await?);
        }
        Ok(Self { encodings })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_SET_ENCODINGS);
        stream.write_padding(1);
        stream.write_u16(self.encodings.len() as u16);
        for encoding in &self.encodings {
            stream.write_i32(*encoding);
        }
    }
}

/// FramebufferUpdateRequest (3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        let incremental = stream.read_u8().await?;
        if incremental > 1 {
            return Err(ProtocolError::malformed(format!(
                "incremental flag must be 0 or 1, got {}",
                incremental
            )));
        }
        Ok(Self {
            incremental: incremental == 1,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
        stream.write_u8(u8::from(self.incremental));
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
    }
}

/// KeyEvent (4): X11 keysym press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: bool,
    pub key: u32,
}

impl KeyEvent {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        let down = stream.read_u8().await?;
        if down > 1 {
            return Err(ProtocolError::malformed(format!(
                "down flag must be 0 or 1, got {}",
                down
            )));
        }
        stream.skip(2).await?;
        Ok(Self {
            down: down == 1,
            key: stream.read_u32().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_KEY_EVENT);
        stream.write_u8(u8::from(self.down));
        stream.write_padding(2);
        stream.write_u32(self.key);
    }
}

/// PointerEvent (5): pointer position and button mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        Ok(Self {
            button_mask: stream.read_u8().await?,
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_POINTER_EVENT);
        stream.write_u8(self.button_mask);
        stream.write_u16(self.x);
        stream.write_u16(self.y);
    }
}

/// ClientCutText (6): clipboard bytes from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCutText {
    pub text: Vec<u8>,
}

impl ClientCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        stream.skip(3).await?;
        let length = stream.read_u32().await? as usize;
        let text = stream.read_exact_vec(length).await?;
        Ok(Self { text })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(types::CLIENT_MSG_CLIENT_CUT_TEXT);
        stream.write_padding(3);
        stream.write_u32(self.text.len() as u32);
        stream.write_bytes(&self.text);
    }
}

/// Tagged union of the client-to-server messages, dispatched on the wire
/// type code.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SetPixelFormat(SetPixelFormat),
    SetEncodings(SetEncodings),
    FramebufferUpdateRequest(FramebufferUpdateRequest),
    KeyEvent(KeyEvent),
    PointerEvent(PointerEvent),
    ClientCutText(ClientCutText),
}

impl ClientMessage {
    /// Parse a message whose type byte has already been read.
    pub async fn read_from<R: AsyncRead + Unpin>(
        message_type: u8,
        stream: &mut RfbInStream<R>,
    ) -> Result<Self> {
        match message_type {
            types::CLIENT_MSG_SET_PIXEL_FORMAT => {
                Ok(Self::SetPixelFormat(SetPixelFormat::read_from(stream).await?))
            }
            types::CLIENT_MSG_SET_ENCODINGS => {
                Ok(Self::SetEncodings(SetEncodings::read_from(stream).await?))
            }
            types::CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST => Ok(Self::FramebufferUpdateRequest(
                FramebufferUpdateRequest::read_from(stream).await?,
            )),
            types::CLIENT_MSG_KEY_EVENT => Ok(Self::KeyEvent(KeyEvent::read_from(stream).await?)),
            types::CLIENT_MSG_POINTER_EVENT => {
                Ok(Self::PointerEvent(PointerEvent::read_from(stream).await?))
            }
            types::CLIENT_MSG_CLIENT_CUT_TEXT => {
                Ok(Self::ClientCutText(ClientCutText::read_from(stream).await?))
            }
            other => Err(ProtocolError::UnsupportedMessage(other)),
        }
    }

    /// Serialize the message and flush it to the peer.
    pub async fn write<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) -> Result<()> {
        match self {
            Self::SetPixelFormat(msg) => msg.write_to(stream),
            Self::SetEncodings(msg) => msg.write_to(stream),
            Self::FramebufferUpdateRequest(msg) => msg.write_to(stream),
            Self::KeyEvent(msg) => msg.write_to(stream),
            Self::PointerEvent(msg) => msg.write_to(stream),
            Self::ClientCutText(msg) => msg.write_to(stream),
        }
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn round_trip(msg: ClientMessage) {
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        msg.write(&mut out).await.unwrap();

        let mut inp = RfbInStream::new(Cursor::new(wire));
        let type_byte = inp.read_u8().await.unwrap();
        let read_back = ClientMessage::read_from(type_byte, &mut inp).await.unwrap();
        assert_eq!(read_back, msg);
    }

    #[tokio::test]
    async fn set_pixel_format_round_trip() {
        round_trip(ClientMessage::SetPixelFormat(SetPixelFormat {
            pixel_format: PixelFormat::rgb32(),
        }))
        .await;
    }

    #[tokio::test]
    async fn set_encodings_round_trip() {
        round_trip(ClientMessage::SetEncodings(SetEncodings {
            encodings: vec![
                types::ENCODING_TIGHT,
                types::ENCODING_ZRLE,
                types::ENCODING_RAW,
                types::ENCODING_DESKTOP_SIZE,
            ],
        }))
        .await;
    }

    #[tokio::test]
    async fn update_request_round_trip() {
        round_trip(ClientMessage::FramebufferUpdateRequest(
            FramebufferUpdateRequest {
                incremental: true,
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
        ))
        .await;
    }

    #[tokio::test]
    async fn key_event_round_trip() {
        round_trip(ClientMessage::KeyEvent(KeyEvent {
            down: true,
            key: 0xFF0D,
        }))
        .await;
    }

    #[tokio::test]
    async fn pointer_event_round_trip() {
        round_trip(ClientMessage::PointerEvent(PointerEvent {
            button_mask: 0b101,
            x: 512,
            y: 384,
        }))
        .await;
    }

    #[tokio::test]
    async fn cut_text_round_trip() {
        round_trip(ClientMessage::ClientCutText(ClientCutText {
            text: b"copied".to_vec(),
        }))
        .await;
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let mut inp = RfbInStream::new(Cursor::new(vec![0u8; 16]));
        let err = ClientMessage::read_from(99, &mut inp).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedMessage(99)));
    }

    #[tokio::test]
    async fn client_init_layout() {
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        ClientInit { shared: true }.write_to(&mut out);
        out.flush().await.unwrap();
        assert_eq!(wire, vec![1]);

        let mut inp = RfbInStream::new(Cursor::new(vec![2u8]));
        assert!(ClientInit::read_from(&mut inp).await.is_err());
    }
}

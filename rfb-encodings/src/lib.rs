//! Rectangle codecs for the RFB protocol.
//!
//! Each encoding decodes one framebuffer-update rectangle from the network
//! stream into the connection's [`Canvas`]. Decoders are a tagged union
//! ([`Decoder`]) dispatched on the i32 encoding type from the rectangle
//! header; the connection owns one instance of each enabled decoder in a
//! [`DecoderRegistry`].
//!
//! Stateful codecs (Zlib, Tight's four sub-streams, ZRLE) keep their
//! decompressor across rectangles on the same connection. Decoding runs
//! exclusively on the connection's reader task, so decoders take
//! `&mut self` and need no interior locking. A desktop-size change must be
//! followed by [`DecoderRegistry::reset_all`] before the next rectangle is
//! decoded; the next compressed block then starts a fresh stream.
//!
//! The lossless codecs also have a write side ([`Encoder`]) used by the
//! server role to serialize canvas regions.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

pub use rfb_canvas::{Canvas, ColorMap, PixelFormat, Rgb};
pub use rfb_protocol::io::{RfbInStream, RfbOutStream};
pub use rfb_protocol::messages::types::{
    ENCODING_ATEN_HERMON, ENCODING_COPY_RECT, ENCODING_CORRE, ENCODING_CURSOR,
    ENCODING_DESKTOP_NAME, ENCODING_DESKTOP_SIZE, ENCODING_HEXTILE, ENCODING_LAST_RECT,
    ENCODING_POINTER_POS, ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_TIGHT_PNG,
    ENCODING_X_CURSOR, ENCODING_ZLIB, ENCODING_ZRLE,
};
pub use rfb_protocol::messages::Rectangle;

pub mod aten;
pub mod color;
pub mod copyrect;
pub mod corre;
pub mod cursor;
pub mod desktop;
pub mod hextile;
pub mod raw;
pub mod rre;
pub mod tight;
pub mod tightpng;
pub mod zlib;
pub mod zrle;
pub(crate) mod zstream;

pub use aten::AtenHermonDecoder;
pub use copyrect::{CopyRectDecoder, CopyRectEncoder};
pub use corre::CoRreDecoder;
pub use cursor::{CursorDecoder, PointerPosDecoder, XCursorDecoder};
pub use hextile::{HextileDecoder, HextileEncoder};
pub use raw::{RawDecoder, RawEncoder};
pub use rre::{RreDecoder, RreEncoder};
pub use tight::{read_tight_length, write_tight_length, TightDecoder, TightEncoder};
pub use tightpng::{TightPngDecoder, TightPngEncoder};
pub use zlib::{ZlibDecoder, ZlibEncoder};
pub use zrle::{ZrleDecoder, ZrleEncoder};

/// Shared mutable state a decoder works against.
///
/// The pixel format and colormap describe the wire data; decoded pixels
/// land in the canvas. The ATEN protocol-variant flag lives on the
/// connection, not the pixel format, and is surfaced here for the codecs
/// that branch on it.
pub struct DecodeContext<'a> {
    pub pixel_format: &'a PixelFormat,
    pub color_map: Option<&'a ColorMap>,
    pub canvas: &'a mut Canvas,
    pub aten_variant: bool,
}

/// Tagged union of the rectangle decoders.
///
/// Pseudo-encodings with connection-level side effects (DesktopSize,
/// DesktopName) are handled by the rectangle dispatcher before the registry
/// is consulted; cursor pseudo-encodings decode here because their state
/// lives on the canvas.
pub enum Decoder {
    Raw(RawDecoder),
    CopyRect(CopyRectDecoder),
    Rre(RreDecoder),
    CoRre(CoRreDecoder),
    Hextile(HextileDecoder),
    Zlib(ZlibDecoder),
    Tight(TightDecoder),
    TightPng(TightPngDecoder),
    Zrle(ZrleDecoder),
    AtenHermon(AtenHermonDecoder),
    Cursor(CursorDecoder),
    XCursor(XCursorDecoder),
    PointerPos(PointerPosDecoder),
}

impl Decoder {
    /// Build the decoder for an encoding type code.
    ///
    /// Returns `None` for pseudo-encodings the dispatcher handles itself
    /// and for unknown codes.
    pub fn for_encoding(code: i32) -> Option<Self> {
        match code {
            ENCODING_RAW => Some(Self::Raw(RawDecoder)),
            ENCODING_COPY_RECT => Some(Self::CopyRect(CopyRectDecoder)),
            ENCODING_RRE => Some(Self::Rre(RreDecoder)),
            ENCODING_CORRE => Some(Self::CoRre(CoRreDecoder)),
            ENCODING_HEXTILE => Some(Self::Hextile(HextileDecoder::new())),
            ENCODING_ZLIB => Some(Self::Zlib(ZlibDecoder::new())),
            ENCODING_TIGHT => Some(Self::Tight(TightDecoder::new())),
            ENCODING_TIGHT_PNG => Some(Self::TightPng(TightPngDecoder::new())),
            ENCODING_ZRLE => Some(Self::Zrle(ZrleDecoder::new())),
            ENCODING_ATEN_HERMON => Some(Self::AtenHermon(AtenHermonDecoder)),
            ENCODING_CURSOR => Some(Self::Cursor(CursorDecoder)),
            ENCODING_X_CURSOR => Some(Self::XCursor(XCursorDecoder)),
            ENCODING_POINTER_POS => Some(Self::PointerPos(PointerPosDecoder)),
            _ => None,
        }
    }

    /// The encoding type code this decoder handles.
    pub fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw(_) => ENCODING_RAW,
            Self::CopyRect(_) => ENCODING_COPY_RECT,
            Self::Rre(_) => ENCODING_RRE,
            Self::CoRre(_) => ENCODING_CORRE,
            Self::Hextile(_) => ENCODING_HEXTILE,
            Self::Zlib(_) => ENCODING_ZLIB,
            Self::Tight(_) => ENCODING_TIGHT,
            Self::TightPng(_) => ENCODING_TIGHT_PNG,
            Self::Zrle(_) => ENCODING_ZRLE,
            Self::AtenHermon(_) => ENCODING_ATEN_HERMON,
            Self::Cursor(_) => ENCODING_CURSOR,
            Self::XCursor(_) => ENCODING_X_CURSOR,
            Self::PointerPos(_) => ENCODING_POINTER_POS,
        }
    }

    /// Decode one rectangle's payload into the context's canvas.
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        match self {
            Self::Raw(d) => d.decode(stream, rect, ctx).await,
            Self::CopyRect(d) => d.decode(stream, rect, ctx).await,
            Self::Rre(d) => d.decode(stream, rect, ctx).await,
            Self::CoRre(d) => d.decode(stream, rect, ctx).await,
            Self::Hextile(d) => d.decode(stream, rect, ctx).await,
            Self::Zlib(d) => d.decode(stream, rect, ctx).await,
            Self::Tight(d) => d.decode(stream, rect, ctx).await,
            Self::TightPng(d) => d.decode(stream, rect, ctx).await,
            Self::Zrle(d) => d.decode(stream, rect, ctx).await,
            Self::AtenHermon(d) => d.decode(stream, rect, ctx).await,
            Self::Cursor(d) => d.decode(stream, rect, ctx).await,
            Self::XCursor(d) => d.decode(stream, rect, ctx).await,
            Self::PointerPos(d) => d.decode(stream, rect, ctx).await,
        }
    }

    /// Drop any persistent compression state.
    ///
    /// Invoked on every enabled decoder when a DesktopSize pseudo-rectangle
    /// arrives; the next compressed block starts a new stream.
    pub fn reset(&mut self) {
        match self {
            Self::Zlib(d) => d.reset(),
            Self::Tight(d) => d.reset(),
            Self::Zrle(d) => d.reset(),
            _ => {}
        }
    }
}

/// The connection's table of enabled decoders, built once at connect time.
pub struct DecoderRegistry {
    decoders: Vec<Decoder>,
}

impl DecoderRegistry {
    /// Build decoder instances for `encodings`, in order. Pseudo-encoding
    /// codes without a decoder (DesktopSize, DesktopName, LastRect) and
    /// unknown codes are skipped; the dispatcher deals with them.
    pub fn from_encodings(encodings: &[i32]) -> Self {
        let mut decoders = Vec::new();
        for &code in encodings {
            if decoders.iter().any(|d: &Decoder| d.encoding_type() == code) {
                continue;
            }
            if let Some(decoder) = Decoder::for_encoding(code) {
                decoders.push(decoder);
            }
        }
        Self { decoders }
    }

    pub fn get_mut(&mut self, code: i32) -> Option<&mut Decoder> {
        self.decoders.iter_mut().find(|d| d.encoding_type() == code)
    }

    pub fn contains(&self, code: i32) -> bool {
        self.decoders.iter().any(|d| d.encoding_type() == code)
    }

    /// Reset every stateful decoder.
    pub fn reset_all(&mut self) {
        for decoder in &mut self.decoders {
            decoder.reset();
        }
    }
}

/// Write-side codecs, used by the server role to serialize canvas regions.
pub enum Encoder {
    Raw(RawEncoder),
    CopyRect(CopyRectEncoder),
    Rre(RreEncoder),
    Hextile(HextileEncoder),
    Zlib(ZlibEncoder),
    Tight(TightEncoder),
    TightPng(TightPngEncoder),
    Zrle(ZrleEncoder),
}

impl Encoder {
    /// Build the encoder for an encoding type code, when one exists.
    pub fn for_encoding(code: i32) -> Option<Self> {
        match code {
            ENCODING_RAW => Some(Self::Raw(RawEncoder)),
            ENCODING_COPY_RECT => Some(Self::CopyRect(CopyRectEncoder::default())),
            ENCODING_RRE => Some(Self::Rre(RreEncoder)),
            ENCODING_HEXTILE => Some(Self::Hextile(HextileEncoder)),
            ENCODING_ZLIB => Some(Self::Zlib(ZlibEncoder::new())),
            ENCODING_TIGHT => Some(Self::Tight(TightEncoder::new())),
            ENCODING_TIGHT_PNG => Some(Self::TightPng(TightPngEncoder)),
            ENCODING_ZRLE => Some(Self::Zrle(ZrleEncoder::new())),
            _ => None,
        }
    }

    pub fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw(_) => ENCODING_RAW,
            Self::CopyRect(_) => ENCODING_COPY_RECT,
            Self::Rre(_) => ENCODING_RRE,
            Self::Hextile(_) => ENCODING_HEXTILE,
            Self::Zlib(_) => ENCODING_ZLIB,
            Self::Tight(_) => ENCODING_TIGHT,
            Self::TightPng(_) => ENCODING_TIGHT_PNG,
            Self::Zrle(_) => ENCODING_ZRLE,
        }
    }

    /// Serialize the canvas content of `rect` as this encoding's payload.
    ///
    /// The rectangle header is the caller's job; only the payload is
    /// buffered here. CopyRect ignores the canvas and emits the source
    /// position configured on the encoder.
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        match self {
            Self::Raw(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::CopyRect(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::Rre(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::Hextile(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::Zlib(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::Tight(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::TightPng(e) => e.encode(stream, rect, pixel_format, canvas),
            Self::Zrle(e) => e.encode(stream, rect, pixel_format, canvas),
        }
    }

    /// Drop any persistent compression state.
    pub fn reset(&mut self) {
        match self {
            Self::Zlib(e) => e.reset(),
            Self::Tight(e) => e.reset(),
            Self::Zrle(e) => e.reset(),
            _ => {}
        }
    }
}

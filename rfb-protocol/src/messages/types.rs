//! Core wire types: pixel format serialization, rectangle headers, and the
//! protocol's type-code constants.

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use rfb_canvas::PixelFormat;
use tokio::io::{AsyncRead, AsyncWrite};

//
// Encoding type constants
//

/// Raw encoding: uncompressed pixel data.
pub const ENCODING_RAW: i32 = 0;
/// CopyRect encoding: copy from another screen region.
pub const ENCODING_COPY_RECT: i32 = 1;
/// RRE (Rise-and-Run-length Encoding).
pub const ENCODING_RRE: i32 = 2;
/// CoRRE: RRE with compact (u8) subrectangle coordinates.
pub const ENCODING_CORRE: i32 = 4;
/// Hextile encoding: 16x16 tiles with per-tile sub-encodings.
pub const ENCODING_HEXTILE: i32 = 5;
/// Zlib encoding: zlib-compressed raw pixels.
pub const ENCODING_ZLIB: i32 = 6;
/// Tight encoding: palette/gradient filters, zlib sub-streams and JPEG.
pub const ENCODING_TIGHT: i32 = 7;
/// ZRLE (Zlib Run-Length Encoding): zlib + RLE in 64x64 tiles.
pub const ENCODING_ZRLE: i32 = 16;
/// ATEN iKVM "Hermon" vendor encoding.
pub const ENCODING_ATEN_HERMON: i32 = 0x59;
/// TightPNG: Tight with the Basic path replaced by PNG images.
pub const ENCODING_TIGHT_PNG: i32 = -260;

//
// Pseudo-encodings
//

/// Cursor shape update.
pub const ENCODING_CURSOR: i32 = -239;
/// X-style cursor shape update (two-color bitmap).
pub const ENCODING_X_CURSOR: i32 = -240;
/// Cursor position update.
pub const ENCODING_POINTER_POS: i32 = -232;
/// Desktop resize notification.
pub const ENCODING_DESKTOP_SIZE: i32 = -223;
/// Last rectangle marker.
pub const ENCODING_LAST_RECT: i32 = -224;
/// Desktop name change notification.
pub const ENCODING_DESKTOP_NAME: i32 = -307;

//
// Security type constants
//

pub const SECURITY_TYPE_NONE: u8 = 1;
pub const SECURITY_TYPE_VNC: u8 = 2;
/// Shared by the Tight security extension and ATEN iKVM firmware; the two
/// are told apart by the tunnels-word quirk during the handshake.
pub const SECURITY_TYPE_ATEN: u8 = 16;
pub const SECURITY_TYPE_VENCRYPT: u8 = 19;
pub const SECURITY_TYPE_ULTRA_MS_LOGON2: u8 = 113;

//
// Message type constants
//

pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const SERVER_MSG_SET_COLOR_MAP_ENTRIES: u8 = 1;
pub const SERVER_MSG_BELL: u8 = 2;
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

/// Rectangle header for framebuffer updates: 12 bytes on the wire
/// (x, y, width, height as u16; encoding as i32). The encoded payload
/// follows and is parsed by the codec the encoding type selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    pub async fn read_from<R: AsyncRead + Unpin>(stream: &mut RfbInStream<R>) -> Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
            encoding: stream.read_i32().await?,
        })
    }

    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
        stream.write_i32(self.encoding);
    }

    /// Pixel area of the rectangle.
    pub fn area(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

/// Parse the 16-byte pixel format structure from raw bytes.
///
/// Boolean fields are validated strictly; the trailing 3 padding bytes are
/// ignored (some firmwares fill them with garbage).
pub fn pixel_format_from_bytes(bytes: &[u8; 16]) -> Result<PixelFormat> {
    let big_endian = bytes[2];
    let true_color = bytes[3];
    if big_endian > 1 {
        return Err(ProtocolError::malformed(format!(
            "big_endian flag must be 0 or 1, got {}",
            big_endian
        )));
    }
    if true_color > 1 {
        return Err(ProtocolError::malformed(format!(
            "true_color flag must be 0 or 1, got {}",
            true_color
        )));
    }

    Ok(PixelFormat {
        bits_per_pixel: bytes[0],
        depth: bytes[1],
        big_endian: big_endian == 1,
        true_color: true_color == 1,
        red_max: u16::from_be_bytes([bytes[4], bytes[5]]),
        green_max: u16::from_be_bytes([bytes[6], bytes[7]]),
        blue_max: u16::from_be_bytes([bytes[8], bytes[9]]),
        red_shift: bytes[10],
        green_shift: bytes[11],
        blue_shift: bytes[12],
    })
}

/// Read the 16-byte pixel format structure from a stream.
pub async fn read_pixel_format<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
) -> Result<PixelFormat> {
    let mut bytes = [0u8; 16];
    stream.read_bytes(&mut bytes).await?;
    pixel_format_from_bytes(&bytes)
}

/// Write the 16-byte pixel format structure.
pub fn write_pixel_format<W: AsyncWrite + Unpin>(
    stream: &mut RfbOutStream<W>,
    pf: &PixelFormat,
) {
    stream.write_u8(pf.bits_per_pixel);
    stream.write_u8(pf.depth);
    stream.write_u8(u8::from(pf.big_endian));
    stream.write_u8(u8::from(pf.true_color));
    stream.write_u16(pf.red_max);
    stream.write_u16(pf.green_max);
    stream.write_u16(pf.blue_max);
    stream.write_u8(pf.red_shift);
    stream.write_u8(pf.green_shift);
    stream.write_u8(pf.blue_shift);
    stream.write_padding(3);
}

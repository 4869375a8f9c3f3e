//! Wire-pixel readers and writers shared by the codecs.
//!
//! A "color" here is one pixel in the connection's pixel format. Compact
//! colors are the 3-byte form Tight and ZRLE use when the format is
//! 32bpp/24-depth with 8-bit channels; all other formats fall back to the
//! full pixel width.

use anyhow::Result;
use rfb_canvas::{ColorMap, PixelFormat, Rgb};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};

/// Convert one wire pixel already sitting in `bytes` to RGB.
pub fn rgb_from_wire(
    pixel_format: &PixelFormat,
    bytes: &[u8],
    color_map: Option<&ColorMap>,
) -> Result<Rgb> {
    let pixel = pixel_format.pixel_from_bytes(bytes);
    pixel_format.rgb_from_pixel(pixel, color_map).ok_or_else(|| {
        ProtocolError::UnsupportedFormat(
            "non-true-color pixel format without a colormap".into(),
        )
        .into()
    })
}

/// Read one full-width pixel and convert it to RGB.
pub async fn read_color<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    pixel_format: &PixelFormat,
    color_map: Option<&ColorMap>,
) -> Result<Rgb> {
    let mut bytes = [0u8; 4];
    let bpp = pixel_format.bytes_per_pixel();
    stream.read_bytes(&mut bytes[..bpp]).await?;
    rgb_from_wire(pixel_format, &bytes[..bpp], color_map)
}

/// Read one compact (3-byte) pixel, falling back to the full width when the
/// format is not compact.
pub async fn read_compact_color<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    pixel_format: &PixelFormat,
    color_map: Option<&ColorMap>,
) -> Result<Rgb> {
    if pixel_format.is_compact() {
        let mut bytes = [0u8; 3];
        stream.read_bytes(&mut bytes).await?;
        Ok(pixel_format.rgb_from_compact(bytes))
    } else {
        read_color(stream, pixel_format, color_map).await
    }
}

/// Buffer one full-width pixel.
pub fn write_color<W: AsyncWrite + Unpin>(
    stream: &mut RfbOutStream<W>,
    pixel_format: &PixelFormat,
    color: Rgb,
) {
    let pixel = pixel_format.pixel_from_rgb(color);
    let mut bytes = [0u8; 4];
    pixel_format.pixel_to_bytes(pixel, &mut bytes);
    stream.write_bytes(&bytes[..pixel_format.bytes_per_pixel()]);
}

/// Buffer one compact pixel (or a full-width one for non-compact formats).
pub fn write_compact_color<W: AsyncWrite + Unpin>(
    stream: &mut RfbOutStream<W>,
    pixel_format: &PixelFormat,
    color: Rgb,
) {
    if pixel_format.is_compact() {
        stream.write_bytes(&pixel_format.compact_from_rgb(color));
    } else {
        write_color(stream, pixel_format, color);
    }
}

/// Append one compact pixel to a byte vector (for pre-compression buffers).
pub fn push_compact_color(out: &mut Vec<u8>, pixel_format: &PixelFormat, color: Rgb) {
    if pixel_format.is_compact() {
        out.extend_from_slice(&pixel_format.compact_from_rgb(color));
    } else {
        let pixel = pixel_format.pixel_from_rgb(color);
        let mut bytes = [0u8; 4];
        pixel_format.pixel_to_bytes(pixel, &mut bytes);
        out.extend_from_slice(&bytes[..pixel_format.bytes_per_pixel()]);
    }
}

/// Append one full-width pixel to a byte vector.
pub fn push_color(out: &mut Vec<u8>, pixel_format: &PixelFormat, color: Rgb) {
    let pixel = pixel_format.pixel_from_rgb(color);
    let mut bytes = [0u8; 4];
    pixel_format.pixel_to_bytes(pixel, &mut bytes);
    out.extend_from_slice(&bytes[..pixel_format.bytes_per_pixel()]);
}

/// Parse a compact pixel out of a decompressed buffer.
pub fn rgb_from_compact_slice(
    pixel_format: &PixelFormat,
    bytes: &[u8],
    color_map: Option<&ColorMap>,
) -> Result<Rgb> {
    if pixel_format.is_compact() {
        Ok(pixel_format.rgb_from_compact([bytes[0], bytes[1], bytes[2]]))
    } else {
        rgb_from_wire(pixel_format, bytes, color_map)
    }
}

/// Convert a buffer of wire pixels into packed RGB rows.
pub fn rgb_buffer_from_wire(
    pixel_format: &PixelFormat,
    data: &[u8],
    color_map: Option<&ColorMap>,
) -> Result<Vec<u8>> {
    let bpp = pixel_format.bytes_per_pixel();
    anyhow::ensure!(
        data.len() % bpp == 0,
        "pixel buffer length {} is not a multiple of {}",
        data.len(),
        bpp
    );
    let mut out = Vec::with_capacity(data.len() / bpp * 3);
    for chunk in data.chunks_exact(bpp) {
        let rgb = rgb_from_wire(pixel_format, chunk, color_map)?;
        out.push(rgb.r);
        out.push(rgb.g);
        out.push(rgb.b);
    }
    Ok(out)
}

//! Tight encoding (type 7).
//!
//! The first byte of every rectangle is the compression control byte:
//!
//! ```text
//! bit 7 set, bits 4-6 clear    Fill: one compact pixel, whole rectangle
//! bits 7 and 4 set (0x9X)      JPEG: Tight-length + JFIF image
//! bit 7 clear                  Basic: low nibble resets zlib sub-streams
//!                              (bits 0-3), bits 4-5 select the sub-stream,
//!                              bit 6 means a filter id byte follows
//! ```
//!
//! Basic filters: Copy (0) is a stream of compact pixels; Palette (1)
//! carries up to 256 compact entries with 1-bit packed indices when the
//! palette has two entries and one byte per pixel otherwise; Gradient (2)
//! carries per-channel prediction residuals against
//! `clamp(left + above - diagonal)`.
//!
//! Payloads shorter than 12 bytes are sent uncompressed with no length
//! prefix. Longer payloads carry a Tight-length (1-3 bytes, 7 bits per
//! byte, high bit continues) and a zlib block from one of four persistent
//! sub-streams. Sub-stream state survives across rectangles and resets only
//! when the control byte requests it (or on desktop-size changes).

use crate::color::{read_compact_color, rgb_from_compact_slice};
use crate::zstream::{Deflater, Inflater};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{bail, Context, Result};
use rfb_common::Rect;
use rfb_protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};

const COMP_FILL: u8 = 8;
const COMP_JPEG: u8 = 9;

const FILTER_COPY: u8 = 0;
const FILTER_PALETTE: u8 = 1;
const FILTER_GRADIENT: u8 = 2;

/// Payloads below this size skip compression and the length prefix.
const MIN_BYTES_TO_COMPRESS: usize = 12;

/// Read a Tight variable-width length: 1-3 bytes, 7 bits each, the high
/// bit of the first two bytes signalling continuation.
pub async fn read_tight_length<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
) -> std::io::Result<usize> {
    let b0 = stream.read_u8().await?;
    let mut length = usize::from(b0 & 0x7F);
    if b0 & 0x80 == 0 {
        return Ok(length);
    }
    let b1 = stream.read_u8().await?;
    length |= usize::from(b1 & 0x7F) << 7;
    if b1 & 0x80 == 0 {
        return Ok(length);
    }
    let b2 = stream.read_u8().await?;
    length |= usize::from(b2) << 14;
    Ok(length)
}

/// Write a Tight variable-width length.
pub fn write_tight_length<W: AsyncWrite + Unpin>(stream: &mut RfbOutStream<W>, length: usize) {
    debug_assert!(length < 1 << 22);
    if length <= 0x7F {
        stream.write_u8(length as u8);
    } else if length <= 0x3FFF {
        stream.write_u8((length & 0x7F) as u8 | 0x80);
        stream.write_u8((length >> 7) as u8);
    } else {
        stream.write_u8((length & 0x7F) as u8 | 0x80);
        stream.write_u8(((length >> 7) & 0x7F) as u8 | 0x80);
        stream.write_u8((length >> 14) as u8);
    }
}

/// Decoder for Tight.
pub struct TightDecoder {
    streams: [Inflater; 4],
}

impl Default for TightDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TightDecoder {
    pub fn new() -> Self {
        Self {
            streams: [
                Inflater::new(),
                Inflater::new(),
                Inflater::new(),
                Inflater::new(),
            ],
        }
    }

    /// Drop all four sub-stream states.
    pub fn reset(&mut self) {
        for stream in &mut self.streams {
            stream.reset();
        }
    }

    fn reset_requested(&mut self, control: u8) {
        for (i, stream) in self.streams.iter_mut().enumerate() {
            if control & (1 << i) != 0 {
                tracing::trace!(stream = i, "Tight: sub-stream reset requested");
                stream.reset();
            }
        }
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let control = stream.read_u8().await?;
        self.reset_requested(control & 0x0F);

        match control >> 4 {
            COMP_FILL => {
                let color = read_compact_color(stream, ctx.pixel_format, ctx.color_map)
                    .await
                    .context("Tight: failed to read fill color")?;
                ctx.canvas.fill_rect(
                    &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
                    color,
                );
                Ok(())
            }
            COMP_JPEG => {
                if ctx.pixel_format.bits_per_pixel == 8 {
                    bail!(ProtocolError::MalformedPayload(
                        "Tight: JPEG is not valid in 8 bpp mode".into()
                    ));
                }
                let length = read_tight_length(stream).await?;
                let jpeg = stream
                    .read_exact_vec(length)
                    .await
                    .context("Tight: failed to read JPEG data")?;
                self.draw_jpeg(&jpeg, rect, ctx)
            }
            comp if comp > COMP_JPEG => bail!(ProtocolError::MalformedPayload(format!(
                "Tight: invalid compression control {:#04x}",
                control
            ))),
            _ => self.decode_basic(stream, rect, ctx, control).await,
        }
    }

    fn draw_jpeg(&self, jpeg: &[u8], rect: &Rectangle, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let mut decoder = jpeg_decoder::Decoder::new(std::io::Cursor::new(jpeg));
        let pixels = decoder.decode().context("Tight: JPEG decode failed")?;
        let info = decoder
            .info()
            .ok_or_else(|| anyhow::anyhow!("Tight: JPEG carries no image info"))?;

        let rgb = match info.pixel_format {
            jpeg_decoder::PixelFormat::RGB24 => pixels,
            jpeg_decoder::PixelFormat::L8 => {
                pixels.iter().flat_map(|&l| [l, l, l]).collect()
            }
            other => bail!("Tight: unsupported JPEG pixel format {:?}", other),
        };
        ctx.canvas.image_rect(
            &Rect::new(
                i32::from(rect.x),
                i32::from(rect.y),
                u32::from(info.width),
                u32::from(info.height),
            ),
            &rgb,
        );
        Ok(())
    }

    async fn decode_basic<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
        control: u8,
    ) -> Result<()> {
        let stream_id = usize::from((control >> 4) & 0x03);
        let filter = if control & 0x40 != 0 {
            stream.read_u8().await?
        } else {
            FILTER_COPY
        };
        let compact_bpp = ctx.pixel_format.compact_bytes_per_pixel();

        match filter {
            FILTER_COPY => {
                let data = self
                    .read_tight_data(stream, stream_id, rect.area() * compact_bpp)
                    .await
                    .context("Tight: Copy filter data")?;
                self.draw_compact(&data, rect, ctx)
            }
            FILTER_PALETTE => {
                let palette_len = usize::from(stream.read_u8().await?) + 1;
                let mut palette = Vec::with_capacity(palette_len);
                for _ in 0..palette_len {
                    palette
                        .push(read_compact_color(stream, ctx.pixel_format, ctx.color_map).await?);
                }
                let data_len = if palette_len == 2 {
                    (usize::from(rect.width) + 7) / 8 * usize::from(rect.height)
                } else {
                    rect.area()
                };
                let data = self
                    .read_tight_data(stream, stream_id, data_len)
                    .await
                    .context("Tight: Palette filter data")?;
                self.draw_palette(&palette, &data, rect, ctx)
            }
            FILTER_GRADIENT => {
                let data = self
                    .read_tight_data(stream, stream_id, rect.area() * 3)
                    .await
                    .context("Tight: Gradient filter data")?;
                self.draw_gradient(&data, rect, ctx);
                Ok(())
            }
            other => bail!(ProtocolError::MalformedPayload(format!(
                "Tight: bad filter id {}",
                other
            ))),
        }
    }

    /// Read `expected` bytes of filter data: raw when below the compression
    /// threshold, otherwise a Tight-length plus a zlib block from the
    /// selected sub-stream.
    async fn read_tight_data<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        stream_id: usize,
        expected: usize,
    ) -> Result<Vec<u8>> {
        if expected < MIN_BYTES_TO_COMPRESS {
            return Ok(stream.read_exact_vec(expected).await?);
        }
        let compressed_len = read_tight_length(stream).await?;
        let compressed = stream.read_exact_vec(compressed_len).await?;
        self.streams[stream_id]
            .inflate(&compressed, Some(expected))
            .with_context(|| format!("Tight: sub-stream {} inflate failed", stream_id))
    }

    fn draw_compact(&self, data: &[u8], rect: &Rectangle, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let compact_bpp = ctx.pixel_format.compact_bytes_per_pixel();
        let mut rgb = Vec::with_capacity(rect.area() * 3);
        for chunk in data.chunks_exact(compact_bpp) {
            let color = rgb_from_compact_slice(ctx.pixel_format, chunk, ctx.color_map)?;
            rgb.extend_from_slice(&[color.r, color.g, color.b]);
        }
        ctx.canvas.image_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            &rgb,
        );
        Ok(())
    }

    fn draw_palette(
        &self,
        palette: &[Rgb],
        data: &[u8],
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let width = usize::from(rect.width);
        let height = usize::from(rect.height);
        let mut rgb = Vec::with_capacity(width * height * 3);

        if palette.len() == 2 {
            let row_bytes = (width + 7) / 8;
            for y in 0..height {
                for x in 0..width {
                    let byte = data[y * row_bytes + x / 8];
                    let bit = byte >> (7 - (x % 8)) & 1;
                    let color = palette[usize::from(bit)];
                    rgb.extend_from_slice(&[color.r, color.g, color.b]);
                }
            }
        } else {
            for (i, &index) in data.iter().take(width * height).enumerate() {
                let color = *palette.get(usize::from(index)).ok_or_else(|| {
                    ProtocolError::MalformedPayload(format!(
                        "Tight: palette index {} out of range at pixel {}",
                        index, i
                    ))
                })?;
                rgb.extend_from_slice(&[color.r, color.g, color.b]);
            }
        }
        ctx.canvas.image_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            &rgb,
        );
        Ok(())
    }

    fn draw_gradient(&self, residuals: &[u8], rect: &Rectangle, ctx: &mut DecodeContext<'_>) {
        let width = usize::from(rect.width);
        let mut prev_row = vec![0u8; width * 3];
        let mut this_row = vec![0u8; width * 3];

        for y in 0..usize::from(rect.height) {
            for x in 0..width {
                for c in 0..3 {
                    let above = i32::from(prev_row[x * 3 + c]);
                    let (left, diagonal) = if x > 0 {
                        (
                            i32::from(this_row[(x - 1) * 3 + c]),
                            i32::from(prev_row[(x - 1) * 3 + c]),
                        )
                    } else {
                        (0, 0)
                    };
                    let predicted = (above + left - diagonal).clamp(0, 255) as u8;
                    this_row[x * 3 + c] =
                        predicted.wrapping_add(residuals[(y * width + x) * 3 + c]);
                }
                ctx.canvas.set_pixel(
                    u32::from(rect.x) + x as u32,
                    u32::from(rect.y) + y as u32,
                    Rgb::new(this_row[x * 3], this_row[x * 3 + 1], this_row[x * 3 + 2]),
                );
            }
            std::mem::swap(&mut prev_row, &mut this_row);
        }
        ctx.canvas.set_changed(&Rect::from_wire(
            rect.x,
            rect.y,
            rect.width,
            rect.height,
        ));
    }
}

/// Encoder for Tight: Fill for solid rectangles, otherwise Basic with the
/// Copy filter over sub-stream 0. Each rectangle requests a reset of
/// sub-stream 0 so the emitted block is a self-contained stream head.
pub struct TightEncoder {
    deflater: Deflater,
}

impl Default for TightEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TightEncoder {
    pub fn new() -> Self {
        Self {
            deflater: Deflater::new(),
        }
    }

    pub fn reset(&mut self) {
        self.deflater.reset();
    }

    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let rgb = canvas.read_rect(&Rect::from_wire(rect.x, rect.y, rect.width, rect.height));

        let solid = rgb
            .chunks_exact(3)
            .all(|pixel| pixel == &rgb[..3.min(rgb.len())]);
        if solid && !rgb.is_empty() {
            stream.write_u8(0x80);
            let mut buf = Vec::with_capacity(4);
            crate::color::push_compact_color(
                &mut buf,
                pixel_format,
                Rgb::new(rgb[0], rgb[1], rgb[2]),
            );
            stream.write_bytes(&buf);
            return Ok(());
        }

        let mut data = Vec::with_capacity(rect.area() * pixel_format.compact_bytes_per_pixel());
        for pixel in rgb.chunks_exact(3) {
            crate::color::push_compact_color(
                &mut data,
                pixel_format,
                Rgb::new(pixel[0], pixel[1], pixel[2]),
            );
        }

        // Basic, Copy filter, sub-stream 0, reset bit 0.
        stream.write_u8(0x01);
        if data.len() < MIN_BYTES_TO_COMPRESS {
            stream.write_bytes(&data);
        } else {
            self.deflater.reset();
            let compressed = self.deflater.deflate(&data)?;
            write_tight_length(stream, compressed.len());
            stream.write_bytes(&compressed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn ctx_for<'a>(pf: &'a PixelFormat, canvas: &'a mut Canvas) -> DecodeContext<'a> {
        DecodeContext {
            pixel_format: pf,
            color_map: None,
            canvas,
            aten_variant: false,
        }
    }

    fn rect(x: u16, y: u16, w: u16, h: u16) -> Rectangle {
        Rectangle {
            x,
            y,
            width: w,
            height: h,
            encoding: crate::ENCODING_TIGHT,
        }
    }

    #[tokio::test]
    async fn tight_length_widths() {
        for (value, width) in [(0usize, 1usize), (0x7F, 1), (0x80, 2), (0x3FFF, 2), (0x4000, 3)] {
            let mut wire = Vec::new();
            let mut out = RfbOutStream::new(&mut wire);
            write_tight_length(&mut out, value);
            out.flush().await.unwrap();
            assert_eq!(wire.len(), width, "value {:#x}", value);

            let mut inp = RfbInStream::new(Cursor::new(wire));
            assert_eq!(read_tight_length(&mut inp).await.unwrap(), value);
        }
    }

    proptest! {
        #[test]
        fn tight_length_round_trip(value in 0usize..(1 << 22)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut wire = Vec::new();
                let mut out = RfbOutStream::new(&mut wire);
                write_tight_length(&mut out, value);
                out.flush().await.unwrap();
                let mut inp = RfbInStream::new(Cursor::new(wire));
                assert_eq!(read_tight_length(&mut inp).await.unwrap(), value);
            });
        }
    }

    #[tokio::test]
    async fn fill_paints_solid_rectangle() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x80);
            out.write_bytes(&pf.compact_from_rgb(Rgb::new(7, 8, 9)));
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(8, 8);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder
            .decode(&mut stream, &rect(1, 1, 4, 4), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(1, 1), Rgb::new(7, 8, 9));
        assert_eq!(canvas.pixel(4, 4), Rgb::new(7, 8, 9));
        assert_eq!(canvas.pixel(5, 5), Rgb::BLACK);
    }

    #[tokio::test]
    async fn short_copy_payload_is_uncompressed() {
        // 2x1 compact pixels = 6 bytes < 12: no length, no zlib.
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x00); // Basic, stream 0, Copy
            out.write_bytes(&pf.compact_from_rgb(Rgb::new(255, 0, 0)));
            out.write_bytes(&pf.compact_from_rgb(Rgb::new(0, 255, 0)));
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(4, 4);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder
            .decode(&mut stream, &rect(0, 0, 2, 1), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(0, 0), Rgb::new(255, 0, 0));
        assert_eq!(canvas.pixel(1, 0), Rgb::new(0, 255, 0));
    }

    #[tokio::test]
    async fn two_color_palette_is_bit_packed() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x41); // Basic, filter follows, reset stream 0
            out.write_u8(FILTER_PALETTE);
            out.write_u8(1); // palette size - 1
            out.write_bytes(&pf.compact_from_rgb(Rgb::BLACK));
            out.write_bytes(&pf.compact_from_rgb(Rgb::new(255, 255, 255)));
            // 10x1 pixels, alternating: 0b10101010 0b10______
            out.write_bytes(&[0b1010_1010, 0b1000_0000]);
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(10, 1);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder
            .decode(&mut stream, &rect(0, 0, 10, 1), &mut ctx)
            .await
            .unwrap();

        for x in 0..10u32 {
            let expected = if x % 2 == 0 {
                Rgb::new(255, 255, 255)
            } else {
                Rgb::BLACK
            };
            assert_eq!(canvas.pixel(x, 0), expected, "pixel {}", x);
        }
    }

    #[tokio::test]
    async fn indexed_palette_with_compression() {
        let pf = PixelFormat::rgb32();
        let colors = [
            Rgb::new(10, 0, 0),
            Rgb::new(0, 10, 0),
            Rgb::new(0, 0, 10),
        ];
        // 8x4 indices cycling through the palette.
        let indices: Vec<u8> = (0..32u8).map(|i| i % 3).collect();
        let mut deflater = Deflater::new();
        let compressed = deflater.deflate(&indices).unwrap();

        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x41); // Basic, stream 0 (bits 4-5 = 0), filter byte, reset 0
            out.write_u8(FILTER_PALETTE);
            out.write_u8(colors.len() as u8 - 1);
            for color in colors {
                out.write_bytes(&pf.compact_from_rgb(color));
            }
            write_tight_length(&mut out, compressed.len());
            out.write_bytes(&compressed);
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(8, 4);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder
            .decode(&mut stream, &rect(0, 0, 8, 4), &mut ctx)
            .await
            .unwrap();

        for (i, &index) in indices.iter().enumerate() {
            let (x, y) = (i as u32 % 8, i as u32 / 8);
            assert_eq!(canvas.pixel(x, y), colors[usize::from(index)]);
        }
    }

    #[tokio::test]
    async fn gradient_reconstructs_ramp() {
        let pf = PixelFormat::rgb32();
        // 3x2 image: horizontal ramp r = 10*x, g = b = 0.
        let width = 3usize;
        let height = 2usize;
        let mut image = vec![0u8; width * height * 3];
        for y in 0..height {
            for x in 0..width {
                image[(y * width + x) * 3] = (10 * x) as u8;
            }
        }
        // Compute residuals per the predictor.
        let mut residuals = vec![0u8; width * height * 3];
        let mut prev_row = vec![0u8; width * 3];
        for y in 0..height {
            let mut this_row = vec![0u8; width * 3];
            for x in 0..width {
                for c in 0..3 {
                    let above = i32::from(prev_row[x * 3 + c]);
                    let (left, diag) = if x > 0 {
                        (
                            i32::from(this_row[(x - 1) * 3 + c]),
                            i32::from(prev_row[(x - 1) * 3 + c]),
                        )
                    } else {
                        (0, 0)
                    };
                    let predicted = (above + left - diag).clamp(0, 255) as u8;
                    let actual = image[(y * width + x) * 3 + c];
                    this_row[x * 3 + c] = actual;
                    residuals[(y * width + x) * 3 + c] = actual.wrapping_sub(predicted);
                }
            }
            prev_row = this_row;
        }

        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x41);
            out.write_u8(FILTER_GRADIENT);
            write_tight_length_or_raw(&mut out, &residuals);
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(3, 2);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder
            .decode(&mut stream, &rect(0, 0, 3, 2), &mut ctx)
            .await
            .unwrap();

        for y in 0..2u32 {
            for x in 0..3u32 {
                assert_eq!(canvas.pixel(x, y), Rgb::new((10 * x) as u8, 0, 0));
            }
        }
    }

    fn write_tight_length_or_raw(out: &mut RfbOutStream<&mut Vec<u8>>, data: &[u8]) {
        if data.len() < MIN_BYTES_TO_COMPRESS {
            out.write_bytes(data);
        } else {
            let mut deflater = Deflater::new();
            let compressed = deflater.deflate(data).unwrap();
            write_tight_length(out, compressed.len());
            out.write_bytes(&compressed);
        }
    }

    #[tokio::test]
    async fn bad_filter_id_is_rejected() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(4, 4);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x40, 9]));
        let err = decoder
            .decode(&mut stream, &rect(0, 0, 2, 2), &mut ctx)
            .await
            .unwrap_err();
        assert!(err
            .downcast_ref::<ProtocolError>()
            .is_some_and(|e| matches!(e, ProtocolError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn jpeg_rejected_at_8bpp() {
        let pf = PixelFormat::indexed8();
        let mut canvas = Canvas::new(4, 4);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x90]));
        assert!(decoder
            .decode(&mut stream, &rect(0, 0, 2, 2), &mut ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let pf = PixelFormat::rgb32();
        let mut source = Canvas::new(24, 16);
        for y in 0..16u32 {
            for x in 0..24u32 {
                source.set_pixel(x, y, Rgb::new((x * 10) as u8, (y * 14) as u8, 33));
            }
        }

        let r = rect(0, 0, 24, 16);
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        let mut encoder = TightEncoder::new();
        encoder.encode(&mut out, &r, &pf, &source).unwrap();
        out.flush().await.unwrap();

        let mut dest = Canvas::new(24, 16);
        let mut decoder = TightDecoder::new();
        let mut ctx = ctx_for(&pf, &mut dest);
        let mut stream = RfbInStream::new(Cursor::new(wire));
        decoder.decode(&mut stream, &r, &mut ctx).await.unwrap();

        assert_eq!(source.data(), dest.data());
    }

    #[tokio::test]
    async fn encode_solid_uses_fill() {
        let pf = PixelFormat::rgb32();
        let mut source = Canvas::new(8, 8);
        source.fill_rect(&Rect::new(0, 0, 8, 8), Rgb::new(5, 6, 7));

        let r = rect(0, 0, 8, 8);
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        TightEncoder::new().encode(&mut out, &r, &pf, &source).unwrap();
        out.flush().await.unwrap();

        assert_eq!(wire.len(), 4); // control + 3-byte compact pixel
        assert_eq!(wire[0], 0x80);
    }
}

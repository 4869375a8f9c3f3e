//! ZRLE encoding (type 16): zlib-wrapped run-length encoding over 64x64
//! tiles.
//!
//! The rectangle payload is a u32 length plus one zlib block from the
//! connection's continuous ZRLE stream. The decompressed data is a
//! sequence of tiles in row-major order (edge tiles are smaller), each
//! starting with a sub-encoding byte:
//!
//! ```text
//! 0         raw compact pixels
//! 1         solid tile, one compact pixel
//! 2..=16    packed palette: N entries, then 1/2/4-bit indices
//!           (1 bit for 2 entries, 2 bits for 3-4, 4 bits for 5-16),
//!           rows padded to a byte boundary
//! 17..=127  reserved, rejected
//! 128       plain RLE: (compact pixel, run length) until full
//! 129       reserved, rejected
//! 130..=255 palette RLE: (N - 128) entries, then indexed runs; an index
//!           with bit 7 set is followed by a run length
//! ```
//!
//! Run lengths are `1 + sum(bytes)` where the run of 0xFF bytes ends at
//! the first byte below 0xFF.

use crate::color::{push_compact_color, rgb_from_compact_slice};
use crate::zstream::{Deflater, Inflater};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{bail, Context, Result};
use rfb_common::Rect;
use rfb_protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};

const TILE_SIZE: u16 = 64;

/// Cursor over the decompressed tile data.
struct TileCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TileCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| ProtocolError::MalformedPayload("ZRLE: tile data truncated".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            bail!(ProtocolError::MalformedPayload(
                "ZRLE: tile data truncated".into()
            ));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Run length: 1 + sum of bytes, stopping at the first byte < 0xFF.
    fn read_run_length(&mut self) -> Result<usize> {
        let mut run = 1usize;
        loop {
            let byte = self.read_u8()?;
            run += usize::from(byte);
            if byte != 0xFF {
                return Ok(run);
            }
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Decoder for ZRLE.
pub struct ZrleDecoder {
    inflater: Inflater,
}

impl Default for ZrleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleDecoder {
    pub fn new() -> Self {
        Self {
            inflater: Inflater::new(),
        }
    }

    /// Drop the inflater; the next rectangle starts a new zlib stream.
    pub fn reset(&mut self) {
        self.inflater.reset();
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let compressed_len = stream.read_u32().await? as usize;
        let compressed = stream
            .read_exact_vec(compressed_len)
            .await
            .context("ZRLE: failed to read compressed block")?;
        if rect.area() == 0 {
            return Ok(());
        }

        let data = self
            .inflater
            .inflate(&compressed, None)
            .context("ZRLE: decompression failed")?;
        let mut cursor = TileCursor::new(&data);

        let mut ty = 0u16;
        while ty < rect.height {
            let tile_h = TILE_SIZE.min(rect.height - ty);
            let mut tx = 0u16;
            while tx < rect.width {
                let tile_w = TILE_SIZE.min(rect.width - tx);
                let tile = Rect::from_wire(rect.x + tx, rect.y + ty, tile_w, tile_h);
                decode_tile(&mut cursor, &tile, ctx)
                    .with_context(|| format!("ZRLE: tile at ({}, {}) failed", tx, ty))?;
                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }

        if cursor.remaining() > 0 {
            bail!(ProtocolError::MalformedPayload(format!(
                "ZRLE: {} trailing bytes after the last tile",
                cursor.remaining()
            )));
        }
        Ok(())
    }
}

fn compact_bpp(pixel_format: &PixelFormat) -> usize {
    pixel_format.compact_bytes_per_pixel()
}

fn decode_tile(cursor: &mut TileCursor, tile: &Rect, ctx: &mut DecodeContext<'_>) -> Result<()> {
    let sub_encoding = cursor.read_u8()?;
    let width = tile.width as usize;
    let height = tile.height as usize;
    let bpp = compact_bpp(ctx.pixel_format);

    match sub_encoding {
        0 => {
            // Raw compact pixels.
            let data = cursor.read_slice(width * height * bpp)?;
            let mut rgb = Vec::with_capacity(width * height * 3);
            for chunk in data.chunks_exact(bpp) {
                let color = rgb_from_compact_slice(ctx.pixel_format, chunk, ctx.color_map)?;
                rgb.extend_from_slice(&[color.r, color.g, color.b]);
            }
            ctx.canvas.image_rect(tile, &rgb);
        }
        1 => {
            let color =
                rgb_from_compact_slice(ctx.pixel_format, cursor.read_slice(bpp)?, ctx.color_map)?;
            ctx.canvas.fill_rect(tile, color);
        }
        2..=16 => {
            let palette = read_palette(cursor, usize::from(sub_encoding), ctx)?;
            let bits = palette_index_bits(palette.len());
            let row_bytes = (width * bits + 7) / 8;
            let mut rgb = Vec::with_capacity(width * height * 3);
            for _ in 0..height {
                let row = cursor.read_slice(row_bytes)?;
                for x in 0..width {
                    let bit_offset = x * bits;
                    let byte = row[bit_offset / 8];
                    let shift = 8 - bits - (bit_offset % 8);
                    let index = usize::from(byte >> shift) & ((1 << bits) - 1);
                    let color = *palette.get(index).ok_or_else(|| {
                        ProtocolError::MalformedPayload(format!(
                            "ZRLE: packed palette index {} out of range",
                            index
                        ))
                    })?;
                    rgb.extend_from_slice(&[color.r, color.g, color.b]);
                }
            }
            ctx.canvas.image_rect(tile, &rgb);
        }
        17..=127 => bail!(ProtocolError::MalformedPayload(format!(
            "ZRLE: reserved sub-encoding {}",
            sub_encoding
        ))),
        128 => {
            // Plain RLE.
            let mut filled = 0usize;
            let total = width * height;
            let mut rgb = vec![0u8; total * 3];
            while filled < total {
                let color =
                    rgb_from_compact_slice(ctx.pixel_format, cursor.read_slice(bpp)?, ctx.color_map)?;
                let run = cursor.read_run_length()?;
                if filled + run > total {
                    bail!(ProtocolError::MalformedPayload(format!(
                        "ZRLE: run of {} overflows tile at pixel {}",
                        run, filled
                    )));
                }
                for i in filled..filled + run {
                    rgb[i * 3] = color.r;
                    rgb[i * 3 + 1] = color.g;
                    rgb[i * 3 + 2] = color.b;
                }
                filled += run;
            }
            ctx.canvas.image_rect(tile, &rgb);
        }
        129 => bail!(ProtocolError::MalformedPayload(
            "ZRLE: reserved sub-encoding 129".into()
        )),
        130..=255 => {
            // Palette RLE.
            let palette = read_palette(cursor, usize::from(sub_encoding - 128), ctx)?;
            let mut filled = 0usize;
            let total = width * height;
            let mut rgb = vec![0u8; total * 3];
            while filled < total {
                let index_byte = cursor.read_u8()?;
                let index = usize::from(index_byte & 0x7F);
                let run = if index_byte & 0x80 != 0 {
                    cursor.read_run_length()?
                } else {
                    1
                };
                let color = *palette.get(index).ok_or_else(|| {
                    ProtocolError::MalformedPayload(format!(
                        "ZRLE: palette RLE index {} out of range",
                        index
                    ))
                })?;
                if filled + run > total {
                    bail!(ProtocolError::MalformedPayload(format!(
                        "ZRLE: run of {} overflows tile at pixel {}",
                        run, filled
                    )));
                }
                for i in filled..filled + run {
                    rgb[i * 3] = color.r;
                    rgb[i * 3 + 1] = color.g;
                    rgb[i * 3 + 2] = color.b;
                }
                filled += run;
            }
            ctx.canvas.image_rect(tile, &rgb);
        }
    }
    Ok(())
}

fn read_palette(
    cursor: &mut TileCursor,
    len: usize,
    ctx: &mut DecodeContext<'_>,
) -> Result<Vec<Rgb>> {
    let bpp = compact_bpp(ctx.pixel_format);
    let mut palette = Vec::with_capacity(len);
    for _ in 0..len {
        palette.push(rgb_from_compact_slice(
            ctx.pixel_format,
            cursor.read_slice(bpp)?,
            ctx.color_map,
        )?);
    }
    Ok(palette)
}

/// Index width for a packed palette: 1 bit for 2 entries, 2 for 3-4,
/// 4 for 5-16.
fn palette_index_bits(palette_len: usize) -> usize {
    match palette_len {
        2 => 1,
        3..=4 => 2,
        _ => 4,
    }
}

/// Encoder for ZRLE: solid tiles as sub-encoding 1, everything else as
/// raw compact pixels, all through the connection's continuous deflater.
pub struct ZrleEncoder {
    deflater: Deflater,
}

impl Default for ZrleEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleEncoder {
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
        let mut tiles = Vec::new();

        let mut ty = 0u16;
        while ty < rect.height {
            let tile_h = TILE_SIZE.min(rect.height - ty);
            let mut tx = 0u16;
            while tx < rect.width {
                let tile_w = TILE_SIZE.min(rect.width - tx);
                let tile = Rect::from_wire(rect.x + tx, rect.y + ty, tile_w, tile_h);
                encode_tile(&mut tiles, &tile, pixel_format, canvas);
                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }

        let compressed = self.deflater.deflate(&tiles)?;
        stream.write_u32(compressed.len() as u32);
        stream.write_bytes(&compressed);
        Ok(())
    }
}

fn encode_tile(out: &mut Vec<u8>, tile: &Rect, pixel_format: &PixelFormat, canvas: &Canvas) {
    let rgb = canvas.read_rect(tile);
    let solid = rgb.chunks_exact(3).all(|pixel| pixel == &rgb[..3]);

    if solid && !rgb.is_empty() {
        out.push(1);
        push_compact_color(
            out,
            pixel_format,
            Rgb::new(rgb[0], rgb[1], rgb[2]),
        );
        return;
    }

    out.push(0);
    for pixel in rgb.chunks_exact(3) {
        push_compact_color(
            out,
            pixel_format,
            Rgb::new(pixel[0], pixel[1], pixel[2]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
            encoding: crate::ENCODING_ZRLE,
        }
    }

    /// Wrap raw tile bytes in the u32-length + zlib framing.
    fn wire_from_tiles(tiles: &[u8]) -> Vec<u8> {
        let mut deflater = Deflater::new();
        let compressed = deflater.deflate(tiles).unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        wire.extend_from_slice(&compressed);
        wire
    }

    #[test]
    fn run_length_arithmetic() {
        let mut cursor = TileCursor::new(&[10]);
        assert_eq!(cursor.read_run_length().unwrap(), 11);

        let mut cursor = TileCursor::new(&[255, 100]);
        assert_eq!(cursor.read_run_length().unwrap(), 356);

        let mut cursor = TileCursor::new(&[255, 255, 0]);
        assert_eq!(cursor.read_run_length().unwrap(), 511);
    }

    #[test]
    fn packed_index_widths() {
        assert_eq!(palette_index_bits(2), 1);
        assert_eq!(palette_index_bits(3), 2);
        assert_eq!(palette_index_bits(4), 2);
        assert_eq!(palette_index_bits(5), 4);
        assert_eq!(palette_index_bits(16), 4);
    }

    /// A 4x4 tile with sub-encoding 1 and compact pixel
    /// (10, 20, 30) fills the region solid.
    #[tokio::test]
    async fn solid_tile() {
        let pf = PixelFormat::rgb32();
        let mut tiles = vec![1u8];
        tiles.extend_from_slice(&pf.compact_from_rgb(Rgb::new(10, 20, 30)));

        let mut canvas = Canvas::new(4, 4);
        let mut decoder = ZrleDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(wire_from_tiles(&tiles)));
        decoder
            .decode(&mut stream, &rect(0, 0, 4, 4), &mut ctx)
            .await
            .unwrap();

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(canvas.pixel(x, y), Rgb::new(10, 20, 30));
            }
        }
    }

    #[tokio::test]
    async fn plain_rle_tile() {
        let pf = PixelFormat::rgb32();
        let mut tiles = vec![128u8];
        // 4x2 tile: 5 red then 3 blue.
        tiles.extend_from_slice(&pf.compact_from_rgb(Rgb::new(255, 0, 0)));
        tiles.push(4); // run of 5
        tiles.extend_from_slice(&pf.compact_from_rgb(Rgb::new(0, 0, 255)));
        tiles.push(2); // run of 3

        let mut canvas = Canvas::new(4, 2);
        let mut decoder = ZrleDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(wire_from_tiles(&tiles)));
        decoder
            .decode(&mut stream, &rect(0, 0, 4, 2), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(0, 0), Rgb::new(255, 0, 0));
        assert_eq!(canvas.pixel(0, 1), Rgb::new(255, 0, 0)); // 5th pixel wraps
        assert_eq!(canvas.pixel(1, 1), Rgb::new(0, 0, 255));
        assert_eq!(canvas.pixel(3, 1), Rgb::new(0, 0, 255));
    }

    #[tokio::test]
    async fn packed_palette_tile() {
        let pf = PixelFormat::rgb32();
        let black = Rgb::BLACK;
        let white = Rgb::new(255, 255, 255);
        let mut tiles = vec![2u8]; // 2-entry packed palette
        tiles.extend_from_slice(&pf.compact_from_rgb(black));
        tiles.extend_from_slice(&pf.compact_from_rgb(white));
        // 4x2, 1-bit indices, each row one byte: 0b1010_0000, 0b0101_0000.
        tiles.push(0b1010_0000);
        tiles.push(0b0101_0000);

        let mut canvas = Canvas::new(4, 2);
        let mut decoder = ZrleDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(wire_from_tiles(&tiles)));
        decoder
            .decode(&mut stream, &rect(0, 0, 4, 2), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(0, 0), white);
        assert_eq!(canvas.pixel(1, 0), black);
        assert_eq!(canvas.pixel(0, 1), black);
        assert_eq!(canvas.pixel(1, 1), white);
    }

    #[tokio::test]
    async fn palette_rle_tile() {
        let pf = PixelFormat::rgb32();
        let red = Rgb::new(200, 0, 0);
        let green = Rgb::new(0, 200, 0);
        let mut tiles = vec![130u8]; // palette RLE, 2 entries
        tiles.extend_from_slice(&pf.compact_from_rgb(red));
        tiles.extend_from_slice(&pf.compact_from_rgb(green));
        tiles.push(0x80); // index 0 with run
        tiles.push(5); // run of 6
        tiles.push(1); // single pixel, index 1
        tiles.push(0x81); // index 1 with run
        tiles.push(0); // run of 1

        let mut canvas = Canvas::new(4, 2);
        let mut decoder = ZrleDecoder::new();
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(wire_from_tiles(&tiles)));
        decoder
            .decode(&mut stream, &rect(0, 0, 4, 2), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(0, 0), red);
        assert_eq!(canvas.pixel(1, 1), red); // 6 red pixels
        assert_eq!(canvas.pixel(2, 1), green);
        assert_eq!(canvas.pixel(3, 1), green);
    }

    #[tokio::test]
    async fn reserved_sub_encoding_rejected() {
        let pf = PixelFormat::rgb32();
        for sub in [17u8, 127, 129] {
            let mut canvas = Canvas::new(4, 4);
            let mut decoder = ZrleDecoder::new();
            let mut ctx = ctx_for(&pf, &mut canvas);
            let mut stream = RfbInStream::new(Cursor::new(wire_from_tiles(&[sub])));
            let err = decoder
                .decode(&mut stream, &rect(0, 0, 4, 4), &mut ctx)
                .await
                .unwrap_err();
            assert!(
                err.chain().any(|cause| cause
                    .downcast_ref::<ProtocolError>()
                    .is_some_and(|e| matches!(e, ProtocolError::MalformedPayload(_)))),
                "sub-encoding {} must be rejected",
                sub
            );
        }
    }

    #[tokio::test]
    async fn encode_decode_round_trip_multi_tile() {
        let pf = PixelFormat::rgb32();
        // 100x70 spans a 2x2 grid of tiles with ragged edges.
        let mut source = Canvas::new(100, 70);
        for y in 0..70u32 {
            for x in 0..100u32 {
                source.set_pixel(x, y, Rgb::new((x * 2) as u8, (y * 3) as u8, 99));
            }
        }
        // A solid tile region too.
        source.fill_rect(&Rect::new(0, 0, 64, 64), Rgb::new(1, 2, 3));

        let r = rect(0, 0, 100, 70);
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        let mut encoder = ZrleEncoder::new();
        encoder.encode(&mut out, &r, &pf, &source).unwrap();
        out.flush().await.unwrap();

        let mut dest = Canvas::new(100, 70);
        let mut decoder = ZrleDecoder::new();
        let mut ctx = ctx_for(&pf, &mut dest);
        let mut stream = RfbInStream::new(Cursor::new(wire));
        decoder.decode(&mut stream, &r, &mut ctx).await.unwrap();

        assert_eq!(source.data(), dest.data());
    }
}

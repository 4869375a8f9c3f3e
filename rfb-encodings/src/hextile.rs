//! Hextile encoding (type 5): 16x16 tiles with per-tile sub-encodings.
//!
//! Each tile starts with a flags byte:
//!
//! ```text
//! bit 0  Raw                  remaining tile bytes are raw pixels
//! bit 1  BackgroundSpecified  one pixel follows, updates the background
//! bit 2  ForegroundSpecified  one pixel follows, updates the foreground
//! bit 3  AnySubrects          a u8 subrect count follows
//! bit 4  SubrectsColoured     each subrect carries its own pixel
//! ```
//!
//! The background persists across tiles until respecified; so does the
//! foreground, except that a raw tile invalidates neither. Subrects are two
//! bytes: `(x << 4) | y` and `((w - 1) << 4) | (h - 1)`, relative to the
//! tile origin.

use crate::color::{push_color, read_color, rgb_buffer_from_wire};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{Context, Result};
use bitflags::bitflags;
use rfb_common::Rect;
use tokio::io::{AsyncRead, AsyncWrite};

const TILE_SIZE: u16 = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TileFlags: u8 {
        const RAW                  = 1 << 0;
        const BACKGROUND_SPECIFIED = 1 << 1;
        const FOREGROUND_SPECIFIED = 1 << 2;
        const ANY_SUBRECTS         = 1 << 3;
        const SUBRECTS_COLOURED    = 1 << 4;
    }
}

/// Decoder for Hextile.
pub struct HextileDecoder {
    background: Rgb,
    foreground: Rgb,
}

impl Default for HextileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HextileDecoder {
    pub fn new() -> Self {
        Self {
            background: Rgb::BLACK,
            foreground: Rgb::BLACK,
        }
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let mut ty = 0u16;
        while ty < rect.height {
            let tile_h = TILE_SIZE.min(rect.height - ty);
            let mut tx = 0u16;
            while tx < rect.width {
                let tile_w = TILE_SIZE.min(rect.width - tx);
                let tile = Rect::from_wire(rect.x + tx, rect.y + ty, tile_w, tile_h);
                self.decode_tile(stream, &tile, ctx)
                    .await
                    .with_context(|| {
                        format!("Hextile: tile at ({}, {}) failed", tx, ty)
                    })?;
                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }
        Ok(())
    }

    async fn decode_tile<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        tile: &Rect,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let flags = TileFlags::from_bits_retain(stream.read_u8().await?);

        if flags.contains(TileFlags::RAW) {
            let bpp = ctx.pixel_format.bytes_per_pixel();
            let data = stream
                .read_exact_vec(tile.area() as usize * bpp)
                .await
                .context("raw tile pixels")?;
            let rgb = rgb_buffer_from_wire(ctx.pixel_format, &data, ctx.color_map)?;
            ctx.canvas.image_rect(tile, &rgb);
            return Ok(());
        }

        if flags.contains(TileFlags::BACKGROUND_SPECIFIED) {
            self.background = read_color(stream, ctx.pixel_format, ctx.color_map).await?;
        }
        if flags.contains(TileFlags::FOREGROUND_SPECIFIED) {
            self.foreground = read_color(stream, ctx.pixel_format, ctx.color_map).await?;
        }
        ctx.canvas.fill_rect(tile, self.background);

        if flags.contains(TileFlags::ANY_SUBRECTS) {
            let count = stream.read_u8().await?;
            for _ in 0..count {
                let color = if flags.contains(TileFlags::SUBRECTS_COLOURED) {
                    read_color(stream, ctx.pixel_format, ctx.color_map).await?
                } else {
                    self.foreground
                };
                let position = stream.read_u8().await?;
                let size = stream.read_u8().await?;
                let x = u32::from(position >> 4);
                let y = u32::from(position & 0x0F);
                let w = u32::from(size >> 4) + 1;
                let h = u32::from(size & 0x0F) + 1;
                ctx.canvas.fill_rect(
                    &Rect::new(tile.x + x as i32, tile.y + y as i32, w, h),
                    color,
                );
            }
        }
        Ok(())
    }
}

/// Encoder for Hextile.
///
/// Solid tiles become a background fill; two-color tiles become background
/// plus foreground subrects; anything busier is sent raw. The background
/// and foreground are respecified per tile rather than tracked.
pub struct HextileEncoder;

impl HextileEncoder {
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let mut ty = 0u16;
        while ty < rect.height {
            let tile_h = TILE_SIZE.min(rect.height - ty);
            let mut tx = 0u16;
            while tx < rect.width {
                let tile_w = TILE_SIZE.min(rect.width - tx);
                let tile = Rect::from_wire(rect.x + tx, rect.y + ty, tile_w, tile_h);
                self.encode_tile(stream, &tile, pixel_format, canvas)?;
                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }
        Ok(())
    }

    fn encode_tile<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        tile: &Rect,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let rgb = canvas.read_rect(tile);
        let width = tile.width as usize;
        let height = tile.height as usize;

        let mut colors: Vec<Rgb> = Vec::new();
        for pixel in rgb.chunks_exact(3) {
            let color = Rgb::new(pixel[0], pixel[1], pixel[2]);
            if !colors.contains(&color) {
                colors.push(color);
            }
            if colors.len() > 2 {
                break;
            }
        }

        match colors.len() {
            0 | 1 => {
                let background = colors.first().copied().unwrap_or(Rgb::BLACK);
                stream.write_u8(TileFlags::BACKGROUND_SPECIFIED.bits());
                push_tile_color(stream, pixel_format, background);
            }
            2 => {
                let background = crate::rre::background_color(&rgb);
                let foreground = if colors[0] == background {
                    colors[1]
                } else {
                    colors[0]
                };
                let subrects = crate::rre::find_subrects(&rgb, width, height, background);

                stream.write_u8(
                    (TileFlags::BACKGROUND_SPECIFIED
                        | TileFlags::FOREGROUND_SPECIFIED
                        | TileFlags::ANY_SUBRECTS)
                        .bits(),
                );
                push_tile_color(stream, pixel_format, background);
                push_tile_color(stream, pixel_format, foreground);
                stream.write_u8(subrects.len() as u8);
                for sub in subrects {
                    stream.write_u8((sub.x as u8) << 4 | sub.y as u8);
                    stream.write_u8(((sub.w - 1) as u8) << 4 | (sub.h - 1) as u8);
                }
            }
            _ => {
                stream.write_u8(TileFlags::RAW.bits());
                let mut wire = Vec::with_capacity(rgb.len() / 3 * pixel_format.bytes_per_pixel());
                for pixel in rgb.chunks_exact(3) {
                    push_color(
                        &mut wire,
                        pixel_format,
                        Rgb::new(pixel[0], pixel[1], pixel[2]),
                    );
                }
                stream.write_bytes(&wire);
            }
        }
        Ok(())
    }
}

fn push_tile_color<W: AsyncWrite + Unpin>(
    stream: &mut RfbOutStream<W>,
    pixel_format: &PixelFormat,
    color: Rgb,
) {
    let mut buf = Vec::with_capacity(4);
    push_color(&mut buf, pixel_format, color);
    stream.write_bytes(&buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::write_color;
    use std::io::Cursor;

    fn ctx_for<'a>(pf: &'a PixelFormat, canvas: &'a mut Canvas) -> DecodeContext<'a> {
        DecodeContext {
            pixel_format: pf,
            color_map: None,
            canvas,
            aten_variant: false,
        }
    }

    /// One 16x16 tile, flags 0x06 (background + foreground
    /// specified), background blue, foreground white, no subrects. The tile
    /// ends up solid blue; the foreground is retained for later tiles.
    #[tokio::test]
    async fn background_and_foreground_only() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(0x06);
            write_color(&mut out, &pf, Rgb::new(0, 0, 255));
            write_color(&mut out, &pf, Rgb::new(255, 255, 255));
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(16, 16);
        let mut decoder = HextileDecoder::new();
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 16,
            height: 16,
            encoding: crate::ENCODING_HEXTILE,
        };
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder.decode(&mut stream, &rect, &mut ctx).await.unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(canvas.pixel(x, y), Rgb::new(0, 0, 255));
            }
        }
        assert_eq!(decoder.foreground, Rgb::new(255, 255, 255));
        assert_eq!(decoder.background, Rgb::new(0, 0, 255));
    }

    #[tokio::test]
    async fn background_persists_across_tiles() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            // First tile sets the background; second tile reuses it.
            out.write_u8(TileFlags::BACKGROUND_SPECIFIED.bits());
            write_color(&mut out, &pf, Rgb::new(40, 50, 60));
            out.write_u8(0); // empty flags: background fill only
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(32, 16);
        let mut decoder = HextileDecoder::new();
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 32,
            height: 16,
            encoding: crate::ENCODING_HEXTILE,
        };
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder.decode(&mut stream, &rect, &mut ctx).await.unwrap();

        assert_eq!(canvas.pixel(0, 0), Rgb::new(40, 50, 60));
        assert_eq!(canvas.pixel(31, 15), Rgb::new(40, 50, 60));
    }

    #[tokio::test]
    async fn coloured_subrects() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u8(
                (TileFlags::BACKGROUND_SPECIFIED
                    | TileFlags::ANY_SUBRECTS
                    | TileFlags::SUBRECTS_COLOURED)
                    .bits(),
            );
            write_color(&mut out, &pf, Rgb::BLACK);
            out.write_u8(1); // one subrect
            write_color(&mut out, &pf, Rgb::new(200, 100, 50));
            out.write_u8(0x21); // x=2 y=1
            out.write_u8(0x30); // w=4 h=1
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(8, 8);
        let mut decoder = HextileDecoder::new();
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
            encoding: crate::ENCODING_HEXTILE,
        };
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        decoder.decode(&mut stream, &rect, &mut ctx).await.unwrap();

        assert_eq!(canvas.pixel(2, 1), Rgb::new(200, 100, 50));
        assert_eq!(canvas.pixel(5, 1), Rgb::new(200, 100, 50));
        assert_eq!(canvas.pixel(6, 1), Rgb::BLACK);
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let pf = PixelFormat::rgb32();
        let mut source = Canvas::new(40, 24);
        source.fill_rect(&Rect::new(0, 0, 40, 24), Rgb::new(10, 10, 10));
        // A two-color tile region.
        source.fill_rect(&Rect::new(3, 3, 6, 4), Rgb::new(200, 0, 0));
        // A busy region that forces a raw tile.
        for x in 0..16u32 {
            for y in 0..8u32 {
                source.set_pixel(16 + x, 16 + y % 8, Rgb::new(x as u8 * 3, y as u8 * 9, 77));
            }
        }

        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 40,
            height: 24,
            encoding: crate::ENCODING_HEXTILE,
        };
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        HextileEncoder.encode(&mut out, &rect, &pf, &source).unwrap();
        out.flush().await.unwrap();

        let mut dest = Canvas::new(40, 24);
        let mut decoder = HextileDecoder::new();
        let mut ctx = ctx_for(&pf, &mut dest);
        let mut stream = RfbInStream::new(Cursor::new(wire));
        decoder.decode(&mut stream, &rect, &mut ctx).await.unwrap();

        assert_eq!(source.data(), dest.data());
    }
}

//! Raw encoding (type 0): uncompressed pixels in row-major order.

use crate::color::{push_color, rgb_buffer_from_wire};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, RfbInStream, RfbOutStream};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decoder for Raw.
pub struct RawDecoder;

impl RawDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        if rect.area() == 0 {
            return Ok(());
        }
        let bpp = ctx.pixel_format.bytes_per_pixel();
        let data = stream
            .read_exact_vec(rect.area() * bpp)
            .await
            .context("Raw: failed to read pixel data")?;
        let rgb = rgb_buffer_from_wire(ctx.pixel_format, &data, ctx.color_map)
            .context("Raw: pixel conversion failed")?;
        ctx.canvas.image_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            &rgb,
        );
        Ok(())
    }
}

/// Encoder for Raw.
pub struct RawEncoder;

impl RawEncoder {
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let rgb = canvas.read_rect(&Rect::from_wire(rect.x, rect.y, rect.width, rect.height));
        let mut wire = Vec::with_capacity(rect.area() * pixel_format.bytes_per_pixel());
        for pixel in rgb.chunks_exact(3) {
            push_color(
                &mut wire,
                pixel_format,
                crate::Rgb::new(pixel[0], pixel[1], pixel[2]),
            );
        }
        stream.write_bytes(&wire);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rgb;
    use std::io::Cursor;

    fn rect(x: u16, y: u16, w: u16, h: u16) -> Rectangle {
        Rectangle {
            x,
            y,
            width: w,
            height: h,
            encoding: crate::ENCODING_RAW,
        }
    }

    /// A 2x1 rectangle at (5,7) under rgb32; bytes
    /// 00 00 FF 00 | 00 FF 00 00 decode to red then green.
    #[tokio::test]
    async fn decodes_spec_scenario_pixels() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(16, 16);
        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut canvas,
            aten_variant: false,
        };

        let payload = vec![0x00, 0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00];
        let mut stream = RfbInStream::new(Cursor::new(payload));
        RawDecoder
            .decode(&mut stream, &rect(5, 7, 2, 1), &mut ctx)
            .await
            .unwrap();

        assert_eq!(canvas.pixel(5, 7), Rgb::new(255, 0, 0));
        assert_eq!(canvas.pixel(6, 7), Rgb::new(0, 255, 0));
        assert_eq!(canvas.pixel(7, 7), Rgb::BLACK);
    }

    #[tokio::test]
    async fn empty_rectangle_reads_nothing() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(4, 4);
        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut canvas,
            aten_variant: false,
        };
        let mut stream = RfbInStream::new(Cursor::new(Vec::new()));
        RawDecoder
            .decode(&mut stream, &rect(0, 0, 0, 5), &mut ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn truncated_payload_fails() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(4, 4);
        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut canvas,
            aten_variant: false,
        };
        let mut stream = RfbInStream::new(Cursor::new(vec![0u8; 7]));
        assert!(RawDecoder
            .decode(&mut stream, &rect(0, 0, 2, 1), &mut ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let pf = PixelFormat::rgb32();
        let mut source = Canvas::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                source.set_pixel(x, y, Rgb::new(x as u8 * 30, y as u8 * 30, 7));
            }
        }

        let r = rect(0, 0, 8, 8);
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        RawEncoder.encode(&mut out, &r, &pf, &source).unwrap();
        out.flush().await.unwrap();

        let mut dest = Canvas::new(8, 8);
        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut dest,
            aten_variant: false,
        };
        let mut stream = RfbInStream::new(Cursor::new(wire));
        RawDecoder.decode(&mut stream, &r, &mut ctx).await.unwrap();

        assert_eq!(source.data(), dest.data());
    }
}

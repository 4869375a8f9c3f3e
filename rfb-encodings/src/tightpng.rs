//! TightPNG encoding (type -260): Tight with the Basic path replaced by
//! PNG images. Only the Fill and PNG compression selectors are valid.

use crate::color::read_compact_color;
use crate::tight::{read_tight_length, write_tight_length};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{bail, Context, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use rfb_common::Rect;
use rfb_protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};

const COMP_FILL: u8 = 8;
const COMP_PNG: u8 = 10;

/// Decoder for TightPNG.
pub struct TightPngDecoder;

impl Default for TightPngDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TightPngDecoder {
    pub fn new() -> Self {
        Self
    }

    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let control = stream.read_u8().await?;
        match control >> 4 {
            COMP_FILL => {
                let color = read_compact_color(stream, ctx.pixel_format, ctx.color_map)
                    .await
                    .context("TightPNG: failed to read fill color")?;
                ctx.canvas.fill_rect(
                    &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
                    color,
                );
                Ok(())
            }
            COMP_PNG => {
                let length = read_tight_length(stream).await?;
                let png = stream
                    .read_exact_vec(length)
                    .await
                    .context("TightPNG: failed to read PNG data")?;
                let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
                    .context("TightPNG: PNG decode failed")?
                    .to_rgb8();
                ctx.canvas.image_rect(
                    &Rect::new(
                        i32::from(rect.x),
                        i32::from(rect.y),
                        decoded.width(),
                        decoded.height(),
                    ),
                    decoded.as_raw(),
                );
                Ok(())
            }
            other => bail!(ProtocolError::MalformedPayload(format!(
                "TightPNG: invalid compression selector {:#x}",
                other
            ))),
        }
    }
}

/// Encoder for TightPNG: Fill for solid rectangles, PNG otherwise.
pub struct TightPngEncoder;

impl TightPngEncoder {
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let rgb = canvas.read_rect(&Rect::from_wire(rect.x, rect.y, rect.width, rect.height));

        let solid = rgb.chunks_exact(3).all(|pixel| pixel == &rgb[..3]);
        if solid && !rgb.is_empty() {
            stream.write_u8((COMP_FILL) << 4);
            let mut buf = Vec::with_capacity(4);
            crate::color::push_compact_color(
                &mut buf,
                pixel_format,
                Rgb::new(rgb[0], rgb[1], rgb[2]),
            );
            stream.write_bytes(&buf);
            return Ok(());
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(
                &rgb,
                u32::from(rect.width),
                u32::from(rect.height),
                ColorType::Rgb8,
            )
            .context("TightPNG: PNG encode failed")?;
        stream.write_u8((COMP_PNG) << 4);
        write_tight_length(stream, png.len());
        stream.write_bytes(&png);
        Ok(())
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

    fn rect(w: u16, h: u16) -> Rectangle {
        Rectangle {
            x: 0,
            y: 0,
            width: w,
            height: h,
            encoding: crate::ENCODING_TIGHT_PNG,
        }
    }

    #[tokio::test]
    async fn fill_path() {
        let pf = PixelFormat::rgb32();
        let mut payload = vec![0x80u8];
        payload.extend_from_slice(&pf.compact_from_rgb(Rgb::new(9, 9, 9)));

        let mut canvas = Canvas::new(4, 4);
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(payload));
        TightPngDecoder::new()
            .decode(&mut stream, &rect(4, 4), &mut ctx)
            .await
            .unwrap();
        assert_eq!(canvas.pixel(3, 3), Rgb::new(9, 9, 9));
    }

    #[tokio::test]
    async fn basic_selector_is_rejected() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(4, 4);
        let mut ctx = ctx_for(&pf, &mut canvas);
        let mut stream = RfbInStream::new(Cursor::new(vec![0x00u8]));
        let err = TightPngDecoder::new()
            .decode(&mut stream, &rect(2, 2), &mut ctx)
            .await
            .unwrap_err();
        assert!(err
            .downcast_ref::<ProtocolError>()
            .is_some_and(|e| matches!(e, ProtocolError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let pf = PixelFormat::rgb32();
        let mut source = Canvas::new(12, 9);
        for y in 0..9u32 {
            for x in 0..12u32 {
                source.set_pixel(x, y, Rgb::new((x * 20) as u8, (y * 25) as u8, 128));
            }
        }

        let r = rect(12, 9);
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        TightPngEncoder.encode(&mut out, &r, &pf, &source).unwrap();
        out.flush().await.unwrap();
        assert_eq!(wire[0] >> 4, COMP_PNG);

        let mut dest = Canvas::new(12, 9);
        let mut ctx = ctx_for(&pf, &mut dest);
        let mut stream = RfbInStream::new(Cursor::new(wire));
        TightPngDecoder::new()
            .decode(&mut stream, &r, &mut ctx)
            .await
            .unwrap();

        assert_eq!(source.data(), dest.data());
    }
}

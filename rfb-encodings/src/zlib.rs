//! Zlib encoding (type 6): a u32 length followed by a zlib-compressed
//! block of Raw pixels. The zlib stream is continuous across rectangles on
//! the same connection.

use crate::color::{push_color, rgb_buffer_from_wire};
use crate::zstream::{Deflater, Inflater};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decoder for Zlib.
pub struct ZlibDecoder {
    inflater: Inflater,
}

impl Default for ZlibDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibDecoder {
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
            .context("Zlib: failed to read compressed block")?;

        if rect.area() == 0 {
            return Ok(());
        }

        let expected = rect.area() * ctx.pixel_format.bytes_per_pixel();
        let data = self
            .inflater
            .inflate(&compressed, Some(expected))
            .context("Zlib: decompression failed")?;
        let rgb = rgb_buffer_from_wire(ctx.pixel_format, &data, ctx.color_map)?;
        ctx.canvas.image_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            &rgb,
        );
        Ok(())
    }
}

/// Encoder for Zlib.
pub struct ZlibEncoder {
    deflater: Deflater,
}

impl Default for ZlibEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibEncoder {
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
        let mut raw = Vec::with_capacity(rect.area() * pixel_format.bytes_per_pixel());
        for pixel in rgb.chunks_exact(3) {
            push_color(
                &mut raw,
                pixel_format,
                Rgb::new(pixel[0], pixel[1], pixel[2]),
            );
        }
        let compressed = self.deflater.deflate(&raw)?;
        stream.write_u32(compressed.len() as u32);
        stream.write_bytes(&compressed);
        Ok(())
    }
}

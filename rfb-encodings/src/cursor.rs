//! Cursor pseudo-encodings.
//!
//! These rectangles carry no framebuffer pixels; they update the cursor
//! state the canvas composites over the frame:
//!
//! - Cursor (-239): a full-color cursor image plus a 1-bit mask, hotspot
//!   taken from the rectangle position
//! - X-Cursor (-240): an X11-style two-color cursor bitmap plus mask
//! - CursorPos (-232): no payload, just the new cursor location

use crate::color::rgb_buffer_from_wire;
use crate::{DecodeContext, Rectangle, RfbInStream};
use anyhow::{Context, Result};
use rfb_canvas::canvas::CursorImage;
use rfb_common::Point;
use tokio::io::AsyncRead;

fn mask_row_bytes(width: u16) -> usize {
    (usize::from(width) + 7) / 8
}

/// Decoder for the rich cursor shape update.
pub struct CursorDecoder;

impl CursorDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let bpp = ctx.pixel_format.bytes_per_pixel();
        let pixels = stream
            .read_exact_vec(rect.area() * bpp)
            .await
            .context("Cursor: failed to read cursor pixels")?;
        let mask = stream
            .read_exact_vec(mask_row_bytes(rect.width) * usize::from(rect.height))
            .await
            .context("Cursor: failed to read cursor mask")?;

        let rgb = rgb_buffer_from_wire(ctx.pixel_format, &pixels, ctx.color_map)?;
        ctx.canvas.set_cursor(CursorImage {
            width: u32::from(rect.width),
            height: u32::from(rect.height),
            pixels: rgb,
            mask,
            hotspot: Point::new(i32::from(rect.x), i32::from(rect.y)),
        });
        Ok(())
    }
}

/// Decoder for the X-style two-color cursor.
pub struct XCursorDecoder;

impl XCursorDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let mut primary = [0u8; 3];
        stream.read_bytes(&mut primary).await?;
        let mut secondary = [0u8; 3];
        stream.read_bytes(&mut secondary).await?;

        let bitmap_len = mask_row_bytes(rect.width) * usize::from(rect.height);
        let bitmap = stream
            .read_exact_vec(bitmap_len)
            .await
            .context("XCursor: failed to read pixel bitmap")?;
        let mask = stream
            .read_exact_vec(bitmap_len)
            .await
            .context("XCursor: failed to read bit mask")?;

        let row_bytes = mask_row_bytes(rect.width);
        let mut rgb = Vec::with_capacity(rect.area() * 3);
        for y in 0..usize::from(rect.height) {
            for x in 0..usize::from(rect.width) {
                let bit = bitmap[y * row_bytes + x / 8] >> (7 - (x % 8)) & 1;
                let color = if bit != 0 { primary } else { secondary };
                rgb.extend_from_slice(&color);
            }
        }

        ctx.canvas.set_cursor(CursorImage {
            width: u32::from(rect.width),
            height: u32::from(rect.height),
            pixels: rgb,
            mask,
            hotspot: Point::new(i32::from(rect.x), i32::from(rect.y)),
        });
        Ok(())
    }
}

/// Decoder for cursor position updates. No payload.
pub struct PointerPosDecoder;

impl PointerPosDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        _stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        ctx.canvas
            .set_cursor_location(Point::new(i32::from(rect.x), i32::from(rect.y)));
        Ok(())
    }
}

//! RRE encoding (type 2): a background fill plus colored subrectangles.
//!
//! Payload: u32 subrect count, one background pixel, then per subrect a
//! pixel followed by x, y, w, h as u16, positions relative to the
//! rectangle's origin.

use crate::color::{push_color, read_color};
use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, Rgb, RfbInStream, RfbOutStream};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decoder for RRE.
pub struct RreDecoder;

impl RreDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let count = stream.read_u32().await?;
        let background = read_color(stream, ctx.pixel_format, ctx.color_map)
            .await
            .context("RRE: failed to read background pixel")?;
        ctx.canvas.fill_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            background,
        );

        for i in 0..count {
            let color = read_color(stream, ctx.pixel_format, ctx.color_map)
                .await
                .with_context(|| format!("RRE: failed to read subrect {} pixel", i))?;
            let x = stream.read_u16().await?;
            let y = stream.read_u16().await?;
            let w = stream.read_u16().await?;
            let h = stream.read_u16().await?;
            ctx.canvas.fill_rect(
                &Rect::new(
                    i32::from(rect.x) + i32::from(x),
                    i32::from(rect.y) + i32::from(y),
                    u32::from(w),
                    u32::from(h),
                ),
                color,
            );
        }
        Ok(())
    }
}

/// A solid run found while scanning a rectangle for subrects.
pub(crate) struct Subrect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub color: Rgb,
}

/// The most frequent color in a packed RGB buffer.
pub(crate) fn background_color(rgb: &[u8]) -> Rgb {
    let mut counts: std::collections::HashMap<[u8; 3], u32> = std::collections::HashMap::new();
    for pixel in rgb.chunks_exact(3) {
        *counts.entry([pixel[0], pixel[1], pixel[2]]).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|([r, g, b], _)| Rgb::new(r, g, b))
        .unwrap_or(Rgb::BLACK)
}

/// Scan row runs of non-background color into 1-pixel-high subrects.
pub(crate) fn find_subrects(rgb: &[u8], width: usize, height: usize, background: Rgb) -> Vec<Subrect> {
    let mut subrects = Vec::new();
    for y in 0..height {
        let mut x = 0usize;
        while x < width {
            let i = (y * width + x) * 3;
            let color = Rgb::new(rgb[i], rgb[i + 1], rgb[i + 2]);
            if color == background {
                x += 1;
                continue;
            }
            let run_start = x;
            while x < width {
                let j = (y * width + x) * 3;
                if Rgb::new(rgb[j], rgb[j + 1], rgb[j + 2]) != color {
                    break;
                }
                x += 1;
            }
            subrects.push(Subrect {
                x: run_start as u16,
                y: y as u16,
                w: (x - run_start) as u16,
                h: 1,
                color,
            });
        }
    }
    subrects
}

/// Encoder for RRE.
pub struct RreEncoder;

impl RreEncoder {
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        rect: &Rectangle,
        pixel_format: &PixelFormat,
        canvas: &Canvas,
    ) -> Result<()> {
        let rgb = canvas.read_rect(&Rect::from_wire(rect.x, rect.y, rect.width, rect.height));
        let background = background_color(&rgb);
        let subrects = find_subrects(
            &rgb,
            usize::from(rect.width),
            usize::from(rect.height),
            background,
        );

        stream.write_u32(subrects.len() as u32);
        let mut buf = Vec::new();
        push_color(&mut buf, pixel_format, background);
        for sub in &subrects {
            push_color(&mut buf, pixel_format, sub.color);
            buf.extend_from_slice(&sub.x.to_be_bytes());
            buf.extend_from_slice(&sub.y.to_be_bytes());
            buf.extend_from_slice(&sub.w.to_be_bytes());
            buf.extend_from_slice(&sub.h.to_be_bytes());
        }
        stream.write_bytes(&buf);
        Ok(())
    }
}

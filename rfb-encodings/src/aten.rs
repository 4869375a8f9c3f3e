//! ATEN iKVM "Hermon" encoding (type 0x59).
//!
//! Vendor framing used by ATEN BMC firmware:
//!
//! ```text
//! 4 bytes   padding
//! u32       aten_length   total payload length including the 10 header
//!                         bytes below
//! u8        aten_type     0 = subrect stream, 1 = raw
//! 1 byte    padding
//! u32       subrect count
//! u32       raw_length    must equal aten_length
//! ```
//!
//! A rectangle of 64896x65056 is the "screen off" sentinel: the firmware
//! reports no video signal and the payload is empty (aten_length 0, or 10
//! when the fixed header tail is still present). Subrect payloads are
//! 16x16 tiles addressed by (x, y) tile coordinates.

use crate::color::rgb_buffer_from_wire;
use crate::raw::RawDecoder;
use crate::{DecodeContext, Rectangle, RfbInStream};
use anyhow::{bail, Context, Result};
use rfb_common::Rect;
use rfb_protocol::ProtocolError;
use tokio::io::AsyncRead;

const ATEN_SUBRECT: u8 = 0;
const ATEN_RAW: u8 = 1;

/// Width/height pair the firmware sends when the remote screen is off.
pub const SCREEN_OFF_WIDTH: u16 = 64896;
pub const SCREEN_OFF_HEIGHT: u16 = 65056;

const TILE: usize = 16;

/// Decoder for ATEN Hermon.
pub struct AtenHermonDecoder;

impl AtenHermonDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        stream.skip(4).await?;
        let aten_length = stream.read_u32().await?;

        if rect.width == SCREEN_OFF_WIDTH && rect.height == SCREEN_OFF_HEIGHT {
            if aten_length != 0 && aten_length != 10 {
                bail!(ProtocolError::MalformedPayload(format!(
                    "ATEN: screen is off but length is {}",
                    aten_length
                )));
            }
            if aten_length == 10 {
                stream.skip(10).await?;
            }
            tracing::debug!("ATEN: remote screen is off");
            return Ok(());
        }

        // The firmware resizes by sending differently-sized rectangles.
        let (canvas_w, canvas_h) = ctx.canvas.dimensions();
        if canvas_w != u32::from(rect.width) || canvas_h != u32::from(rect.height) {
            ctx.canvas.resize(u32::from(rect.width), u32::from(rect.height));
        }

        let aten_type = stream.read_u8().await?;
        stream.skip(1).await?;
        let subrects = stream.read_u32().await?;
        let raw_length = stream.read_u32().await?;
        if aten_length != raw_length {
            bail!(ProtocolError::MalformedPayload(format!(
                "ATEN: aten_length {} != raw_length {}",
                aten_length, raw_length
            )));
        }

        let mut remaining = aten_length
            .checked_sub(10)
            .ok_or_else(|| {
                ProtocolError::MalformedPayload(format!(
                    "ATEN: length {} shorter than its own header",
                    aten_length
                ))
            })? as usize;

        match aten_type {
            ATEN_SUBRECT => {
                let bpp = ctx.pixel_format.bytes_per_pixel();
                let tile_bytes = TILE * TILE * bpp;
                let mut count = 0u32;
                while remaining > 0 {
                    let chunk = 6 + tile_bytes;
                    if remaining < chunk {
                        bail!(ProtocolError::MalformedPayload(format!(
                            "ATEN: {} bytes left, subrect needs {}",
                            remaining, chunk
                        )));
                    }
                    self.decode_subrect(stream, ctx)
                        .await
                        .with_context(|| format!("ATEN: subrect {} failed", count))?;
                    remaining -= chunk;
                    count += 1;
                }
                if count != subrects {
                    tracing::debug!(
                        declared = subrects,
                        decoded = count,
                        "ATEN: subrect count disagrees with payload length"
                    );
                }
            }
            ATEN_RAW => {
                RawDecoder
                    .decode(stream, rect, ctx)
                    .await
                    .context("ATEN: raw payload failed")?;
            }
            other => bail!(ProtocolError::MalformedPayload(format!(
                "ATEN: unknown payload type {}",
                other
            ))),
        }
        Ok(())
    }

    /// One 16x16 tile: two u16 fields, tile y, tile x, then pixels.
    async fn decode_subrect<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let _a = stream.read_u16().await?;
        let _b = stream.read_u16().await?;
        let tile_y = stream.read_u8().await?;
        let tile_x = stream.read_u8().await?;

        let bpp = ctx.pixel_format.bytes_per_pixel();
        let data = stream.read_exact_vec(TILE * TILE * bpp).await?;
        let rgb = rgb_buffer_from_wire(ctx.pixel_format, &data, ctx.color_map)?;
        ctx.canvas.image_rect(
            &Rect::new(
                i32::from(tile_x) * TILE as i32,
                i32::from(tile_y) * TILE as i32,
                TILE as u32,
                TILE as u32,
            ),
            &rgb,
        );
        Ok(())
    }
}

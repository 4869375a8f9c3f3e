//! CoRRE encoding (type 4): RRE with compact u8 subrectangle coordinates,
//! limiting rectangles to 255x255. Servers tile larger updates before
//! falling back to this encoding.

use crate::color::read_color;
use crate::{DecodeContext, Rectangle, RfbInStream};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Decoder for CoRRE.
pub struct CoRreDecoder;

impl CoRreDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let count = stream.read_u32().await?;
        let background = read_color(stream, ctx.pixel_format, ctx.color_map)
            .await
            .context("CoRRE: failed to read background pixel")?;
        ctx.canvas.fill_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            background,
        );

        for i in 0..count {
            let color = read_color(stream, ctx.pixel_format, ctx.color_map)
                .await
                .with_context(|| format!("CoRRE: failed to read subrect {} pixel", i))?;
            let x = stream.read_u8().await?;
            let y = stream.read_u8().await?;
            let w = stream.read_u8().await?;
            let h = stream.read_u8().await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Canvas, PixelFormat, Rgb, RfbOutStream};
    use std::io::Cursor;

    #[tokio::test]
    async fn compact_coordinates() {
        let pf = PixelFormat::rgb32();
        let mut payload = Vec::new();
        {
            let mut out = RfbOutStream::new(&mut payload);
            out.write_u32(1);
            crate::color::write_color(&mut out, &pf, Rgb::new(10, 10, 10));
            crate::color::write_color(&mut out, &pf, Rgb::new(99, 0, 0));
            out.write_bytes(&[2, 0, 1, 3]); // x=2 y=0 w=1 h=3
            out.flush().await.unwrap();
        }

        let mut canvas = Canvas::new(8, 8);
        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut canvas,
            aten_variant: false,
        };
        let rect = Rectangle {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
            encoding: crate::ENCODING_CORRE,
        };
        let mut stream = RfbInStream::new(Cursor::new(payload));
        CoRreDecoder.decode(&mut stream, &rect, &mut ctx).await.unwrap();

        assert_eq!(canvas.pixel(0, 0), Rgb::new(10, 10, 10));
        assert_eq!(canvas.pixel(2, 0), Rgb::new(99, 0, 0));
        assert_eq!(canvas.pixel(2, 2), Rgb::new(99, 0, 0));
        assert_eq!(canvas.pixel(3, 0), Rgb::new(10, 10, 10));
    }
}

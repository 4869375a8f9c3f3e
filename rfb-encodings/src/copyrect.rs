//! CopyRect encoding (type 1): copy a block from elsewhere in the
//! framebuffer. The payload is just the source position; overlap safety is
//! the canvas's job.

use crate::{Canvas, DecodeContext, PixelFormat, Rectangle, RfbInStream, RfbOutStream};
use anyhow::Result;
use rfb_common::{Point, Rect};
use tokio::io::{AsyncRead, AsyncWrite};

/// Decoder for CopyRect.
pub struct CopyRectDecoder;

impl CopyRectDecoder {
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let src_x = stream.read_u16().await?;
        let src_y = stream.read_u16().await?;
        ctx.canvas.copy_rect(
            &Rect::from_wire(rect.x, rect.y, rect.width, rect.height),
            Point::new(i32::from(src_x), i32::from(src_y)),
        );
        Ok(())
    }
}

/// Encoder for CopyRect: emits the configured source position.
#[derive(Default)]
pub struct CopyRectEncoder {
    pub src_x: u16,
    pub src_y: u16,
}

impl CopyRectEncoder {
    pub fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        stream: &mut RfbOutStream<W>,
        _rect: &Rectangle,
        _pixel_format: &PixelFormat,
        _canvas: &Canvas,
    ) -> Result<()> {
        stream.write_u16(self.src_x);
        stream.write_u16(self.src_y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rgb;
    use std::io::Cursor;

    #[tokio::test]
    async fn copies_within_framebuffer() {
        let pf = PixelFormat::rgb32();
        let mut canvas = Canvas::new(8, 8);
        canvas.fill_rect(&Rect::new(0, 0, 2, 2), Rgb::new(9, 8, 7));

        let mut ctx = DecodeContext {
            pixel_format: &pf,
            color_map: None,
            canvas: &mut canvas,
            aten_variant: false,
        };
        // Source (0,0), destination (4,4), 2x2.
        let mut stream = RfbInStream::new(Cursor::new(vec![0, 0, 0, 0]));
        CopyRectDecoder
            .decode(
                &mut stream,
                &Rectangle {
                    x: 4,
                    y: 4,
                    width: 2,
                    height: 2,
                    encoding: crate::ENCODING_COPY_RECT,
                },
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(canvas.pixel(4, 4), Rgb::new(9, 8, 7));
        assert_eq!(canvas.pixel(5, 5), Rgb::new(9, 8, 7));
        assert_eq!(canvas.pixel(3, 3), Rgb::BLACK);
    }

    #[tokio::test]
    async fn encoder_emits_source_position() {
        let mut wire = Vec::new();
        let mut out = RfbOutStream::new(&mut wire);
        let mut encoder = CopyRectEncoder { src_x: 17, src_y: 3 };
        encoder
            .encode(
                &mut out,
                &Rectangle {
                    x: 0,
                    y: 0,
                    width: 1,
                    height: 1,
                    encoding: crate::ENCODING_COPY_RECT,
                },
                &PixelFormat::rgb32(),
                &Canvas::new(1, 1),
            )
            .unwrap();
        out.flush().await.unwrap();
        assert_eq!(wire, vec![0, 17, 0, 3]);
    }
}

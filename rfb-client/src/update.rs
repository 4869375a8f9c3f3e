//! Rectangle dispatch shared by the live session and the FBS replayer.
//!
//! Reads the rectangles of one FramebufferUpdate message, applies
//! pseudo-encoding side effects to the connection state, and decodes pixel
//! payloads into the canvas. Each rectangle is bracketed by the canvas's
//! cursor save/restore protocol.

use crate::errors::RfbClientError;
use rfb_canvas::{Canvas, ColorMap, PixelFormat};
use rfb_encodings::{desktop, DecodeContext, DecoderRegistry};
use rfb_protocol::io::RfbInStream;
use rfb_protocol::messages::types::{
    ENCODING_ATEN_HERMON, ENCODING_DESKTOP_NAME, ENCODING_DESKTOP_SIZE, ENCODING_LAST_RECT,
    ENCODING_RAW,
};
use rfb_protocol::messages::{FramebufferUpdateHeader, Rectangle};
use rfb_protocol::ProtocolError;
use tokio::io::AsyncRead;

/// Mutable per-connection state owned by the reader side.
pub(crate) struct ConnectionState {
    pub pixel_format: PixelFormat,
    pub color_map: Option<ColorMap>,
    pub width: u16,
    pub height: u16,
    pub desktop_name: String,
    pub aten: bool,
    pub registry: DecoderRegistry,
}

/// Side effects a framebuffer update applied beyond pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UpdateEffect {
    Resized { width: u16, height: u16 },
    Renamed { name: String },
}

/// Read and apply one FramebufferUpdate message (the type byte has already
/// been consumed). Returns the rectangle headers in wire order plus any
/// connection-level side effects.
pub(crate) async fn apply_framebuffer_update<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    state: &mut ConnectionState,
    canvas: &mut Canvas,
) -> Result<(Vec<Rectangle>, Vec<UpdateEffect>), RfbClientError> {
    let header = FramebufferUpdateHeader::read_from(stream).await?;
    let mut rects = Vec::with_capacity(usize::from(header.num_rects));
    let mut effects = Vec::new();

    for _ in 0..header.num_rects {
        let rect = Rectangle::read_from(stream).await?;
        tracing::trace!(?rect, "framebuffer rectangle");

        match rect.encoding {
            ENCODING_LAST_RECT => break,
            ENCODING_DESKTOP_SIZE => {
                state.width = rect.width;
                state.height = rect.height;
                canvas.resize(u32::from(rect.width), u32::from(rect.height));
                state.registry.reset_all();
                effects.push(UpdateEffect::Resized {
                    width: rect.width,
                    height: rect.height,
                });
            }
            ENCODING_DESKTOP_NAME => {
                let name = desktop::read_desktop_name(stream).await?;
                state.desktop_name = name.clone();
                effects.push(UpdateEffect::Renamed { name });
            }
            code => {
                // Split the registry borrow from the rest of the state so
                // the decode context can reference both.
                let ConnectionState {
                    pixel_format,
                    color_map,
                    registry,
                    aten,
                    ..
                } = state;
                // ATEN firmware reuses the Raw type code for its Hermon
                // framing; the variant flag on the connection decides.
                let effective = if *aten && code == ENCODING_RAW {
                    ENCODING_ATEN_HERMON
                } else {
                    code
                };
                let decoder = registry
                    .get_mut(effective)
                    .ok_or(ProtocolError::UnsupportedEncoding(code))?;

                canvas.remove_cursor();
                let result = {
                    let mut ctx = DecodeContext {
                        pixel_format,
                        color_map: color_map.as_ref(),
                        canvas,
                        aten_variant: *aten,
                    };
                    decoder.decode(stream, &rect, &mut ctx).await
                };
                canvas.paint_cursor();
                result?;

                // The ATEN codec resizes the canvas itself when the
                // firmware changes geometry; keep the connection state in
                // step with it.
                let (canvas_w, canvas_h) = canvas.dimensions();
                if (u32::from(state.width), u32::from(state.height)) != (canvas_w, canvas_h) {
                    state.width = canvas_w as u16;
                    state.height = canvas_h as u16;
                    effects.push(UpdateEffect::Resized {
                        width: state.width,
                        height: state.height,
                    });
                }
            }
        }
        rects.push(rect);
    }

    Ok((rects, effects))
}

//! Replay of recorded FBS sessions.
//!
//! An FBS file stands in for a live server: the recorded bytes include the
//! server's half of the handshake and every server message of the session.
//! [`ReplaySession`] parses one server message per step, decodes
//! framebuffer updates into its canvas, and (when pacing is enabled)
//! sleeps until the wall clock catches up with
//! `start + timestamp / speed_factor` before returning.

use crate::errors::RfbClientError;
use crate::events::ServerEvent;
use crate::update::{apply_framebuffer_update, ConnectionState, UpdateEffect};
use rfb_canvas::Canvas;
use rfb_encodings::DecoderRegistry;
use rfb_protocol::fbs::FbsReader;
use rfb_protocol::io::RfbInStream;
use rfb_protocol::messages::types::{
    SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT,
    SERVER_MSG_SET_COLOR_MAP_ENTRIES,
};
use rfb_protocol::messages::{ServerCutText, ServerInit, SetColorMapEntries};
use rfb_protocol::ProtocolError;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::Instant;

/// Options for replay pacing.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Encoding type codes to build decoders for. Recorded sessions are
    /// typically Tight or ZRLE streams.
    pub encodings: Vec<i32>,
    /// Sleep between messages so playback follows the recorded timeline.
    pub sync_timestamps: bool,
    /// Playback speed multiplier (2.0 plays twice as fast).
    pub speed_factor: f64,
    /// Composite the recorded cursor into the canvas.
    pub draw_cursor: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            encodings: crate::config::ClientConfig::default().encodings,
            sync_timestamps: true,
            speed_factor: 1.0,
            draw_cursor: false,
        }
    }
}

/// A replaying "connection" backed by an FBS file.
pub struct ReplaySession<R> {
    stream: RfbInStream<FbsReader<R>>,
    state: ConnectionState,
    canvas: Canvas,
    start: Instant,
    options: ReplayOptions,
}

impl<R: AsyncRead + Unpin> ReplaySession<R> {
    /// Open a recorded session: check the FBS banner and parse the
    /// recorded handshake (RFB banner, security result, ServerInit).
    pub async fn open(reader: R, options: ReplayOptions) -> Result<Self, RfbClientError> {
        let mut fbs = FbsReader::open(reader).await?;
        let init = fbs.read_start_session().await?;
        tracing::info!(
            width = init.width,
            height = init.height,
            name = %init.name,
            "replaying recorded session"
        );

        let mut canvas = Canvas::new(u32::from(init.width), u32::from(init.height));
        canvas.draw_cursor = options.draw_cursor;

        let state = ConnectionState {
            pixel_format: init.pixel_format,
            color_map: None,
            width: init.width,
            height: init.height,
            desktop_name: init.name.clone(),
            aten: false,
            registry: DecoderRegistry::from_encodings(&options.encodings),
        };

        Ok(Self {
            stream: RfbInStream::new(fbs),
            state,
            canvas,
            start: Instant::now(),
            options,
        })
    }

    /// The recorded ServerInit parameters.
    pub fn server_init(&self) -> ServerInit {
        ServerInit {
            width: self.state.width,
            height: self.state.height,
            pixel_format: self.state.pixel_format,
            name: self.state.desktop_name.clone(),
        }
    }

    /// The decoded framebuffer. Consistent after every
    /// [`ReplaySession::next_message`] return.
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Timestamp (ms) of the most recently loaded recorded block.
    pub fn current_timestamp(&self) -> u32 {
        self.stream.get_ref().current_timestamp()
    }

    /// Parse and apply one recorded server message.
    ///
    /// Returns `None` at clean end of file. With `sync_timestamps` on, the
    /// call sleeps until the recorded timestamp (scaled by `speed_factor`)
    /// has been reached.
    pub async fn next_message(&mut self) -> Result<Option<ServerEvent>, RfbClientError> {
        let message_type = match self.stream.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let event = match message_type {
            SERVER_MSG_FRAMEBUFFER_UPDATE => {
                let (rects, effects) =
                    apply_framebuffer_update(&mut self.stream, &mut self.state, &mut self.canvas)
                        .await?;
                for effect in effects {
                    if let UpdateEffect::Resized { width, height } = effect {
                        tracing::debug!(width, height, "recorded desktop resize");
                    }
                }
                ServerEvent::FramebufferUpdated { rects }
            }
            SERVER_MSG_SET_COLOR_MAP_ENTRIES => {
                let msg = SetColorMapEntries::read_from(&mut self.stream).await?;
                let map = self.state.color_map.get_or_insert_with(Default::default);
                map.set_entries(msg.first_color, &msg.colors);
                ServerEvent::ColorMapUpdated {
                    first_color: msg.first_color,
                    count: msg.colors.len() as u16,
                }
            }
            SERVER_MSG_BELL => ServerEvent::Bell,
            SERVER_MSG_SERVER_CUT_TEXT => {
                let msg = ServerCutText::read_from(&mut self.stream).await?;
                ServerEvent::CutText { text: msg.text }
            }
            other => return Err(ProtocolError::UnsupportedMessage(other).into()),
        };

        if self.options.sync_timestamps {
            let timestamp = self.current_timestamp();
            let target = self.start
                + Duration::from_millis(
                    (f64::from(timestamp) / self.options.speed_factor) as u64,
                );
            let now = Instant::now();
            if target > now {
                tokio::time::sleep(target - now).await;
            }
        }

        Ok(Some(event))
    }
}

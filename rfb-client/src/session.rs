//! The post-handshake connection runtime.
//!
//! [`connect`] drives the handshake, then splits the transport into a
//! reader task and a writer task:
//!
//! - the **reader** owns the input buffer, the canvas, the decoder
//!   registry, the colormap, the pixel format and the dimensions; it
//!   parses server messages and pushes [`ServerEvent`]s onto the inbound
//!   channel in wire order
//! - the **writer** owns the output buffer and drains [`ClientCommand`]s
//!   from the outbound channel, serializing and flushing each message in
//!   submission order
//!
//! Both tasks observe a shared quit signal: the first error (or an
//! explicit [`Session::close`]) flips it, both tasks unwind, and the
//! transport is dropped. Errors are forwarded on the error channel before
//! shutdown; nothing is retried here.

use crate::config::ClientConfig;
use crate::errors::RfbClientError;
use crate::events::{ClientCommand, ServerEvent};
use crate::update::{apply_framebuffer_update, ConnectionState, UpdateEffect};
use rfb_canvas::{Canvas, PixelFormat};
use rfb_encodings::DecoderRegistry;
use rfb_protocol::handshake::{client_handshake, ClientHandshake};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages::types::{
    SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT,
    SERVER_MSG_SET_COLOR_MAP_ENTRIES,
};
use rfb_protocol::messages::{
    ClientMessage, FramebufferUpdateRequest, KeyEvent, PointerEvent, ServerCutText,
    SetColorMapEntries, SetEncodings, SetPixelFormat,
};
use rfb_protocol::ProtocolError;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// A running client session.
///
/// The canvas handle is shared with the reader task; consumers must only
/// read it between frame boundaries (after a
/// [`ServerEvent::FramebufferUpdated`] and before requesting the next
/// update).
pub struct Session {
    pub events: flume::Receiver<ServerEvent>,
    pub commands: flume::Sender<ClientCommand>,
    pub errors: flume::Receiver<RfbClientError>,
    canvas: Arc<Mutex<Canvas>>,
    handshake: ClientHandshake,
    quit: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Session {
    /// Shared handle to the decoded framebuffer.
    pub fn canvas(&self) -> Arc<Mutex<Canvas>> {
        self.canvas.clone()
    }

    /// Handshake outcome (negotiated version, security type, ServerInit).
    pub fn handshake(&self) -> &ClientHandshake {
        &self.handshake
    }

    /// Signal both tasks to stop.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

/// Connect over an established duplex stream: run the handshake, send the
/// initial SetPixelFormat / SetEncodings / update request, and start the
/// reader and writer tasks.
pub async fn connect<S>(stream: S, config: ClientConfig) -> Result<Session, RfbClientError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    config.validate()?;

    let (read_half, write_half) = tokio::io::split(stream);
    let mut input = RfbInStream::new(read_half);
    let mut output = RfbOutStream::new(write_half);

    let handshake = client_handshake(&mut input, &mut output, &config.security, config.exclusive)
        .await?;
    tracing::info!(
        width = handshake.server_init.width,
        height = handshake.server_init.height,
        name = %handshake.server_init.name,
        aten = handshake.aten,
        "connected"
    );

    // Decide the session pixel format. ATEN endpoints are pinned to their
    // 15-bit format; everyone else may be switched to true color.
    let pixel_format = if handshake.aten {
        handshake.server_init.pixel_format
    } else if let Some(preferred) = config.pixel_format {
        ClientMessage::SetPixelFormat(SetPixelFormat {
            pixel_format: preferred,
        })
        .write(&mut output)
        .await?;
        preferred
    } else if config.request_true_color {
        let rgb32 = PixelFormat::rgb32();
        ClientMessage::SetPixelFormat(SetPixelFormat {
            pixel_format: rgb32,
        })
        .write(&mut output)
        .await?;
        rgb32
    } else {
        handshake.server_init.pixel_format
    };

    // ATEN firmware answers with its Hermon encoding regardless of what
    // was advertised; make sure the decoder table can take it.
    let mut encodings = config.encodings.clone();
    if handshake.aten && !encodings.contains(&rfb_encodings::ENCODING_ATEN_HERMON) {
        encodings.push(rfb_encodings::ENCODING_ATEN_HERMON);
    }

    ClientMessage::SetEncodings(SetEncodings {
        encodings: encodings.clone(),
    })
    .write(&mut output)
    .await?;

    ClientMessage::FramebufferUpdateRequest(FramebufferUpdateRequest {
        incremental: false,
        x: 0,
        y: 0,
        width: handshake.server_init.width,
        height: handshake.server_init.height,
    })
    .write(&mut output)
    .await?;

    let mut canvas = Canvas::new(
        u32::from(handshake.server_init.width),
        u32::from(handshake.server_init.height),
    );
    canvas.draw_cursor = config.draw_cursor;
    let canvas = Arc::new(Mutex::new(canvas));

    let (event_tx, event_rx) = flume::bounded(config.channel_capacity);
    let (command_tx, command_rx) = flume::bounded(config.channel_capacity);
    let (error_tx, error_rx) = flume::bounded(config.channel_capacity);
    let (quit_tx, quit_rx) = watch::channel(false);

    let _ = event_tx.send(ServerEvent::Connected {
        width: handshake.server_init.width,
        height: handshake.server_init.height,
        name: handshake.server_init.name.clone(),
        pixel_format,
    });

    let state = ConnectionState {
        pixel_format,
        color_map: config.color_map.clone(),
        width: handshake.server_init.width,
        height: handshake.server_init.height,
        desktop_name: handshake.server_init.name.clone(),
        aten: handshake.aten,
        registry: DecoderRegistry::from_encodings(&encodings),
    };

    let reader = tokio::spawn(read_loop(
        input,
        state,
        canvas.clone(),
        event_tx,
        error_tx.clone(),
        quit_rx.clone(),
        quit_tx.clone(),
    ));
    let writer = tokio::spawn(write_loop(
        output,
        command_rx,
        error_tx,
        quit_rx,
        quit_tx.clone(),
    ));

    Ok(Session {
        events: event_rx,
        commands: command_tx,
        errors: error_rx,
        canvas,
        handshake,
        quit: quit_tx,
        reader,
        writer,
    })
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut input: RfbInStream<R>,
    mut state: ConnectionState,
    canvas: Arc<Mutex<Canvas>>,
    events: flume::Sender<ServerEvent>,
    errors: flume::Sender<RfbClientError>,
    mut quit: watch::Receiver<bool>,
    quit_tx: watch::Sender<bool>,
) {
    loop {
        let message_type = tokio::select! {
            result = input.read_u8() => match result {
                Ok(byte) => byte,
                Err(err) => {
                    let _ = errors.send(RfbClientError::Transport(err));
                    break;
                }
            },
            _ = quit.changed() => break,
        };

        let result = handle_server_message(
            message_type,
            &mut input,
            &mut state,
            &canvas,
            &events,
        )
        .await;
        if let Err(err) = result {
            tracing::warn!(%err, "reader terminating");
            let _ = errors.send(err);
            break;
        }
    }
    let _ = events.send_async(ServerEvent::ConnectionClosed).await;
    let _ = quit_tx.send(true);
}

async fn handle_server_message<R: AsyncRead + Unpin>(
    message_type: u8,
    input: &mut RfbInStream<R>,
    state: &mut ConnectionState,
    canvas: &Arc<Mutex<Canvas>>,
    events: &flume::Sender<ServerEvent>,
) -> Result<(), RfbClientError> {
    match message_type {
        SERVER_MSG_FRAMEBUFFER_UPDATE => {
            let mut canvas = canvas.lock().await;
            let (rects, effects) = apply_framebuffer_update(input, state, &mut canvas).await?;
            drop(canvas);

            for effect in effects {
                let event = match effect {
                    UpdateEffect::Resized { width, height } => {
                        ServerEvent::DesktopResized { width, height }
                    }
                    UpdateEffect::Renamed { name } => ServerEvent::DesktopRenamed { name },
                };
                let _ = events.send_async(event).await;
            }
            let _ = events.send_async(ServerEvent::FramebufferUpdated { rects }).await;
        }
        SERVER_MSG_SET_COLOR_MAP_ENTRIES => {
            let msg = SetColorMapEntries::read_from(input).await?;
            let map = state.color_map.get_or_insert_with(Default::default);
            map.set_entries(msg.first_color, &msg.colors);
            let _ = events
                .send_async(ServerEvent::ColorMapUpdated {
                    first_color: msg.first_color,
                    count: msg.colors.len() as u16,
                })
                .await;
        }
        SERVER_MSG_BELL => {
            let _ = events.send_async(ServerEvent::Bell).await;
        }
        SERVER_MSG_SERVER_CUT_TEXT => {
            let msg = ServerCutText::read_from(input).await?;
            let _ = events.send_async(ServerEvent::CutText { text: msg.text }).await;
        }
        other => return Err(ProtocolError::UnsupportedMessage(other).into()),
    }
    Ok(())
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut output: RfbOutStream<W>,
    commands: flume::Receiver<ClientCommand>,
    errors: flume::Sender<RfbClientError>,
    mut quit: watch::Receiver<bool>,
    quit_tx: watch::Sender<bool>,
) {
    loop {
        let command = tokio::select! {
            command = commands.recv_async() => match command {
                Ok(command) => command,
                Err(_) => break, // application dropped the sender
            },
            _ = quit.changed() => break,
        };

        let message = match command {
            ClientCommand::RequestUpdate {
                incremental,
                x,
                y,
                width,
                height,
            } => ClientMessage::FramebufferUpdateRequest(FramebufferUpdateRequest {
                incremental,
                x,
                y,
                width,
                height,
            }),
            ClientCommand::Key { key, down } => ClientMessage::KeyEvent(KeyEvent { down, key }),
            ClientCommand::Pointer { x, y, buttons } => {
                ClientMessage::PointerEvent(PointerEvent {
                    button_mask: buttons,
                    x,
                    y,
                })
            }
            ClientCommand::CutText { text } => ClientMessage::ClientCutText(
                rfb_protocol::messages::ClientCutText { text },
            ),
            ClientCommand::Close => break,
        };

        if let Err(err) = message.write(&mut output).await {
            let _ = errors.send(err.into());
            break;
        }
    }
    let _ = quit_tx.send(true);
}

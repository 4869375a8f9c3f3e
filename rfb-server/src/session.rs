//! The server side of a connection.
//!
//! [`accept`] runs the server-side handshake, then starts the same
//! two-task split as the client: a reader that parses client messages into
//! [`ClientEvent`]s and a writer that drains [`ServerCommand`]s,
//! serializing framebuffer updates from the shared canvas.
//!
//! The application owns the canvas content: draw into the shared handle,
//! then issue [`ServerCommand::SendUpdate`] naming the regions (usually in
//! response to [`ClientEvent::UpdateRequested`]).
//!
//! The client's pixel format and encoding list are mutated only by the
//! reader and published to the writer through watch channels.

use crate::config::ServerConfig;
use crate::errors::RfbServerError;
use crate::events::{ClientEvent, ServerCommand, UpdateRect};
use rfb_canvas::{Canvas, PixelFormat};
use rfb_encodings::{Encoder, ENCODING_RAW};
use rfb_protocol::handshake::{server_handshake, ServerHandshake};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages::{
    ClientMessage, FramebufferUpdateHeader, Rectangle, ServerCutText, ServerInit, ServerMessage,
    SetColorMapEntries,
};
use rfb_protocol::ProtocolError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// A running server-side session for one client.
pub struct ServerSession {
    pub events: flume::Receiver<ClientEvent>,
    pub commands: flume::Sender<ServerCommand>,
    pub errors: flume::Receiver<RfbServerError>,
    canvas: Arc<Mutex<Canvas>>,
    handshake: ServerHandshake,
    quit: watch::Sender<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ServerSession {
    /// The framebuffer served to this client. Draw into it, then issue
    /// [`ServerCommand::SendUpdate`].
    pub fn canvas(&self) -> Arc<Mutex<Canvas>> {
        self.canvas.clone()
    }

    pub fn handshake(&self) -> &ServerHandshake {
        &self.handshake
    }

    pub fn close(&self) {
        let _ = self.quit.send(true);
    }

    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

/// Accept one client on an established duplex stream.
pub async fn accept<S>(stream: S, config: ServerConfig) -> Result<ServerSession, RfbServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    config.validate()?;

    let (read_half, write_half) = tokio::io::split(stream);
    let mut input = RfbInStream::new(read_half);
    let mut output = RfbOutStream::new(write_half);

    let init = ServerInit {
        width: config.width,
        height: config.height,
        pixel_format: config.pixel_format,
        name: config.desktop_name.clone(),
    };
    let handshake = server_handshake(&mut input, &mut output, &config.security, &init).await?;
    tracing::info!(
        security_type = handshake.security_type,
        shared = handshake.shared,
        "client authenticated"
    );

    let canvas = Arc::new(Mutex::new(Canvas::new(
        u32::from(config.width),
        u32::from(config.height),
    )));

    let (event_tx, event_rx) = flume::bounded(config.channel_capacity);
    let (command_tx, command_rx) = flume::bounded(config.channel_capacity);
    let (error_tx, error_rx) = flume::bounded(config.channel_capacity);
    let (quit_tx, quit_rx) = watch::channel(false);
    let (pf_tx, pf_rx) = watch::channel(config.pixel_format);
    let (enc_tx, enc_rx) = watch::channel(Vec::new());

    let _ = event_tx.send(ClientEvent::Connected {
        shared: handshake.shared,
    });

    let reader = tokio::spawn(read_loop(
        input,
        event_tx,
        error_tx.clone(),
        pf_tx,
        enc_tx,
        quit_rx.clone(),
        quit_tx.clone(),
    ));
    let writer = tokio::spawn(write_loop(
        output,
        command_rx,
        canvas.clone(),
        error_tx,
        pf_rx,
        enc_rx,
        quit_rx,
        quit_tx.clone(),
    ));

    Ok(ServerSession {
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
    events: flume::Sender<ClientEvent>,
    errors: flume::Sender<RfbServerError>,
    pf_tx: watch::Sender<PixelFormat>,
    enc_tx: watch::Sender<Vec<i32>>,
    mut quit: watch::Receiver<bool>,
    quit_tx: watch::Sender<bool>,
) {
    loop {
        let message_type = tokio::select! {
            result = input.read_u8() => match result {
                Ok(byte) => byte,
                Err(err) => {
                    let _ = errors.send(RfbServerError::Transport(err));
                    break;
                }
            },
            _ = quit.changed() => break,
        };

        let message = match ClientMessage::read_from(message_type, &mut input).await {
            Ok(message) => message,
            Err(err) => {
                let _ = errors.send(err.into());
                break;
            }
        };

        let event = match message {
            ClientMessage::SetPixelFormat(msg) => {
                if !msg.pixel_format.true_color {
                    // The colormap the client held belongs to the previous
                    // format; it reads black until repopulated.
                    tracing::debug!("client switched to a color-mapped format");
                }
                let _ = pf_tx.send(msg.pixel_format);
                ClientEvent::PixelFormatChanged {
                    pixel_format: msg.pixel_format,
                }
            }
            ClientMessage::SetEncodings(msg) => {
                let _ = enc_tx.send(msg.encodings.clone());
                ClientEvent::EncodingsChanged {
                    encodings: msg.encodings,
                }
            }
            ClientMessage::FramebufferUpdateRequest(msg) => ClientEvent::UpdateRequested {
                incremental: msg.incremental,
                x: msg.x,
                y: msg.y,
                width: msg.width,
                height: msg.height,
            },
            ClientMessage::KeyEvent(msg) => ClientEvent::Key {
                key: msg.key,
                down: msg.down,
            },
            ClientMessage::PointerEvent(msg) => ClientEvent::Pointer {
                x: msg.x,
                y: msg.y,
                buttons: msg.button_mask,
            },
            ClientMessage::ClientCutText(msg) => ClientEvent::CutText { text: msg.text },
        };
        let _ = events.send_async(event).await;
    }
    let _ = events.send_async(ClientEvent::ConnectionClosed).await;
    let _ = quit_tx.send(true);
}

#[allow(clippy::too_many_arguments)]
async fn write_loop<W: AsyncWrite + Unpin>(
    mut output: RfbOutStream<W>,
    commands: flume::Receiver<ServerCommand>,
    canvas: Arc<Mutex<Canvas>>,
    errors: flume::Sender<RfbServerError>,
    pf_rx: watch::Receiver<PixelFormat>,
    enc_rx: watch::Receiver<Vec<i32>>,
    mut quit: watch::Receiver<bool>,
    quit_tx: watch::Sender<bool>,
) {
    let mut encoders: HashMap<i32, Encoder> = HashMap::new();

    loop {
        let command = tokio::select! {
            command = commands.recv_async() => match command {
                Ok(command) => command,
                Err(_) => break,
            },
            _ = quit.changed() => break,
        };

        let result = match command {
            ServerCommand::SendUpdate { rects } => {
                send_update(
                    &mut output,
                    &rects,
                    &mut encoders,
                    &canvas,
                    &pf_rx,
                    &enc_rx,
                )
                .await
            }
            ServerCommand::SetColorMap {
                first_color,
                colors,
            } => ServerMessage::SetColorMapEntries(SetColorMapEntries {
                first_color,
                colors,
            })
            .write(&mut output)
            .await
            .map_err(RfbServerError::from),
            ServerCommand::Bell => ServerMessage::Bell
                .write(&mut output)
                .await
                .map_err(RfbServerError::from),
            ServerCommand::CutText { text } => ServerMessage::ServerCutText(ServerCutText { text })
                .write(&mut output)
                .await
                .map_err(RfbServerError::from),
            ServerCommand::Close => break,
        };

        if let Err(err) = result {
            tracing::warn!(%err, "writer terminating");
            let _ = errors.send(err);
            break;
        }
    }
    let _ = quit_tx.send(true);
}

/// Serialize one FramebufferUpdate from the canvas.
async fn send_update<W: AsyncWrite + Unpin>(
    output: &mut RfbOutStream<W>,
    rects: &[UpdateRect],
    encoders: &mut HashMap<i32, Encoder>,
    canvas: &Arc<Mutex<Canvas>>,
    pf_rx: &watch::Receiver<PixelFormat>,
    enc_rx: &watch::Receiver<Vec<i32>>,
) -> Result<(), RfbServerError> {
    let pixel_format = *pf_rx.borrow();
    if !pixel_format.true_color {
        return Err(ProtocolError::UnsupportedFormat(
            "cannot serve updates in a color-mapped pixel format".into(),
        )
        .into());
    }
    let client_encodings = enc_rx.borrow().clone();

    FramebufferUpdateHeader {
        num_rects: rects.len() as u16,
    }
    .write_to(output);

    let canvas = canvas.lock().await;
    for update in rects {
        let advertised = update.encoding == ENCODING_RAW
            || client_encodings.contains(&update.encoding);
        let encoding = if advertised { update.encoding } else { ENCODING_RAW };

        let encoder = match encoders.entry(encoding) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                match Encoder::for_encoding(encoding) {
                    Some(encoder) => entry.insert(encoder),
                    None => {
                        return Err(ProtocolError::UnsupportedEncoding(encoding).into());
                    }
                }
            }
        };

        let rect = Rectangle {
            x: update.x,
            y: update.y,
            width: update.width,
            height: update.height,
            encoding,
        };
        rect.write_to(output);
        encoder.encode(output, &rect, &pixel_format, &canvas)?;
    }
    drop(canvas);

    output.flush().await?;
    Ok(())
}

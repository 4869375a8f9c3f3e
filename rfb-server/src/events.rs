//! Application-facing events and commands for the server role.

use rfb_canvas::{PixelFormat, Rgb16};

/// Parsed client messages, delivered in wire order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A client completed the handshake.
    Connected { shared: bool },

    /// The client switched pixel formats. Updates sent from now on use the
    /// new format.
    PixelFormatChanged { pixel_format: PixelFormat },

    /// The client declared its supported encodings, in preference order.
    EncodingsChanged { encodings: Vec<i32> },

    /// The client asked for a framebuffer update.
    UpdateRequested {
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },

    /// Keyboard input.
    Key { key: u32, down: bool },

    /// Pointer input.
    Pointer { x: u16, y: u16, buttons: u8 },

    /// Client-side clipboard contents.
    CutText { text: Vec<u8> },

    /// The connection has terminated; no further events follow.
    ConnectionClosed,
}

/// One rectangle of a framebuffer update to send.
#[derive(Debug, Clone, Copy)]
pub struct UpdateRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Encoding to serialize with. Falls back to Raw when the client has
    /// not advertised it.
    pub encoding: i32,
}

/// Commands sent from the application to the server runtime.
#[derive(Debug, Clone)]
pub enum ServerCommand {
    /// Encode the listed canvas regions and send one FramebufferUpdate.
    SendUpdate { rects: Vec<UpdateRect> },

    /// Update the client's colormap.
    SetColorMap {
        first_color: u16,
        colors: Vec<Rgb16>,
    },

    /// Ring the client's bell.
    Bell,

    /// Send clipboard text to the client.
    CutText { text: Vec<u8> },

    /// Close the connection.
    Close,
}

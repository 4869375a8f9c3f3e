//! Application-facing events and commands.
//!
//! The client runtime delivers parsed server messages as [`ServerEvent`]s
//! on the inbound channel, in wire order, and drains [`ClientCommand`]s
//! from the outbound channel in submission order. The two directions never
//! reorder against each other.

use rfb_canvas::PixelFormat;
use rfb_protocol::messages::Rectangle;

/// Events sent from the client runtime to the application.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Handshake finished; the steady-state loop is running.
    Connected {
        width: u16,
        height: u16,
        name: String,
        pixel_format: PixelFormat,
    },

    /// A complete FramebufferUpdate has been applied to the canvas.
    ///
    /// Emission of this event is the frame boundary: the canvas is
    /// consistent and may be read until the next update begins.
    FramebufferUpdated { rects: Vec<Rectangle> },

    /// The server updated the colormap.
    ColorMapUpdated { first_color: u16, count: u16 },

    /// The desktop was resized by a DesktopSize pseudo-rectangle.
    DesktopResized { width: u16, height: u16 },

    /// The desktop was renamed by a DesktopName pseudo-rectangle.
    DesktopRenamed { name: String },

    /// Server rang the bell.
    Bell,

    /// Server-side clipboard contents.
    CutText { text: Vec<u8> },

    /// The connection has terminated; no further events follow.
    ConnectionClosed,
}

/// Commands sent from the application to the client runtime.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Ask the server for a framebuffer update.
    RequestUpdate {
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },

    /// Key press or release (X11 keysym).
    Key { key: u32, down: bool },

    /// Pointer move and button state.
    Pointer { x: u16, y: u16, buttons: u8 },

    /// Send clipboard text to the server.
    CutText { text: Vec<u8> },

    /// Close the connection.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_and_commands_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ServerEvent>();
        assert_send::<ClientCommand>();
    }
}

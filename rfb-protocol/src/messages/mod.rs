//! Typed RFB messages.
//!
//! Each message knows its own byte layout: `read_from` parses the payload
//! (the leading type byte has already been consumed by the dispatcher) and
//! `write_to` buffers the full message including the type byte. Message
//! writes become visible only after the caller flushes the stream;
//! the [`ClientMessage`] and [`ServerMessage`] enums provide `write`
//! helpers that do so.

pub mod client;
pub mod server;
pub mod types;

pub use client::{
    ClientCutText, ClientInit, ClientMessage, FramebufferUpdateRequest, KeyEvent, PointerEvent,
    SetEncodings, SetPixelFormat,
};
pub use server::{
    Bell, FramebufferUpdateHeader, ServerCutText, ServerInit, ServerMessage, SetColorMapEntries,
};
pub use types::{pixel_format_from_bytes, read_pixel_format, write_pixel_format, Rectangle};

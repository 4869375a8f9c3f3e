//! RFB (Remote Framebuffer) wire protocol implementation.
//!
//! This crate provides the protocol layer shared by the client and server
//! runtimes:
//!
//! - [`io`] - buffered async streams with big-endian primitives and an
//!   explicit flush contract
//! - [`error`] - the protocol error taxonomy
//! - [`messages`] - typed client-to-server and server-to-client messages
//! - [`handshake`] - version, security and init phases for both roles
//! - [`security`] - the security schemes (None, VNC, ATEN, VeNCrypt Plain,
//!   Ultra MS-Logon II)
//! - [`fbs`] - reader for recorded FBS session files
//!
//! Pixel decoding lives in the `rfb-encodings` crate; this crate stops at
//! the rectangle header.

pub mod error;
pub mod fbs;
pub mod handshake;
pub mod io;
pub mod messages;
pub mod security;

pub use error::{ProtocolError, Result};
pub use io::{RfbInStream, RfbOutStream};

//! Error type for the server runtime.

use rfb_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the server side of a connection.
#[derive(Debug, Error)]
pub enum RfbServerError {
    /// Transport-level failure outside the protocol layer.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Handshake, message or security failure from the protocol layer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Rectangle encoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] anyhow::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,
}

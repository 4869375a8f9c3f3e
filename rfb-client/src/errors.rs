//! Error type for the client runtime.

use rfb_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the VNC client.
#[derive(Debug, Error)]
pub enum RfbClientError {
    /// Transport-level failure outside the protocol layer.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Handshake, message or security failure from the protocol layer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Rectangle decoding failed.
    #[error("decode error: {0}")]
    Decode(#[from] anyhow::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RfbClientError {
    /// True for errors worth a reconnect attempt by the embedding
    /// application; authentication and configuration problems are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionClosed => true,
            Self::Protocol(err) => matches!(err, ProtocolError::StreamClosed(_)),
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

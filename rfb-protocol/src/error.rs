//! Error taxonomy for the protocol stack.

use thiserror::Error;

/// Errors surfaced by the protocol, handshake and message layers.
///
/// Every recoverable error ends up on the connection's error channel; none
/// are retried at this layer. Handshake failures abort the connection
/// before the steady-state loop is entered.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Transport returned end-of-stream or a lower-layer I/O error.
    #[error("stream closed: {0}")]
    StreamClosed(#[from] std::io::Error),

    /// Banner parsed but the major/minor combination is not handled.
    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    /// Peer returned an authentication failure result.
    #[error("authentication rejected: {reason}")]
    AuthRejected { reason: String },

    /// No mutually acceptable security type.
    #[error("no mutually acceptable security type (offered: {offered:?})")]
    UnsupportedSecurity { offered: Vec<u8> },

    /// Received a message type not present in the registry.
    #[error("unsupported message type {0}")]
    UnsupportedMessage(u8),

    /// Rectangle specifies an encoding not present in the registry.
    #[error("unsupported encoding {0}")]
    UnsupportedEncoding(i32),

    /// Length fields inconsistent, sub-encoding out of range, corrupt
    /// compressed stream, or an out-of-range filter id.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A pixel-format feature the codec does not implement, e.g.
    /// non-true-color data without a colormap.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),
}

impl ProtocolError {
    /// Shorthand used by the parsing code.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

//! Server configuration.

use crate::errors::RfbServerError;
use rfb_canvas::PixelFormat;
use rfb_protocol::security::SecurityScheme;
use serde::{Deserialize, Serialize};

/// Configuration for the server side of a connection.
///
/// Must not be mutated once a handshake has started; each accepted
/// connection takes its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Security schemes to offer, in preference order. RFB 3.3 peers get
    /// the first entry dictated to them.
    #[serde(default = "default_security")]
    pub security: Vec<SecurityScheme>,

    /// Initial framebuffer width.
    pub width: u16,

    /// Initial framebuffer height.
    pub height: u16,

    /// The native pixel format advertised in ServerInit.
    #[serde(default = "PixelFormat::rgb32")]
    pub pixel_format: PixelFormat,

    /// Desktop name advertised in ServerInit.
    #[serde(default = "default_desktop_name")]
    pub desktop_name: String,

    /// Capacity of the event, command and error channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_security() -> Vec<SecurityScheme> {
    vec![SecurityScheme::None]
}

fn default_desktop_name() -> String {
    "rfb".into()
}

fn default_channel_capacity() -> usize {
    64
}

impl ServerConfig {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            security: default_security(),
            width,
            height,
            pixel_format: PixelFormat::rgb32(),
            desktop_name: default_desktop_name(),
            channel_capacity: default_channel_capacity(),
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: Vec<SecurityScheme>) -> Self {
        self.security = security;
        self
    }

    #[must_use]
    pub fn with_desktop_name(mut self, name: impl Into<String>) -> Self {
        self.desktop_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), RfbServerError> {
        if self.security.is_empty() {
            return Err(RfbServerError::Config(
                "at least one security scheme is required".into(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RfbServerError::Config(
                "framebuffer dimensions cannot be zero".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(RfbServerError::Config(
                "channel capacity cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

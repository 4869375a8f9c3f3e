//! Client configuration.

use crate::errors::RfbClientError;
use rfb_canvas::{ColorMap, PixelFormat};
use rfb_encodings::{
    ENCODING_COPY_RECT, ENCODING_CORRE, ENCODING_CURSOR, ENCODING_DESKTOP_NAME,
    ENCODING_DESKTOP_SIZE, ENCODING_HEXTILE, ENCODING_LAST_RECT, ENCODING_POINTER_POS,
    ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_X_CURSOR, ENCODING_ZLIB, ENCODING_ZRLE,
};
use rfb_protocol::security::SecurityScheme;
use serde::{Deserialize, Serialize};

/// Configuration for one client connection.
///
/// Must not be mutated once the handshake has started; the connection
/// takes its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Security schemes in preference order; the first one the server also
    /// offers wins.
    #[serde(default = "default_security")]
    pub security: Vec<SecurityScheme>,

    /// Encoding type codes to advertise via SetEncodings, in preference
    /// order. Pseudo-encodings belong in this list too.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<i32>,

    /// Request an exclusive session (ClientInit shared flag off).
    #[serde(default)]
    pub exclusive: bool,

    /// Composite the remote cursor into the canvas.
    #[serde(default)]
    pub draw_cursor: bool,

    /// Ask the server for 32-bit true color right after ServerInit.
    /// Ignored on ATEN connections, which are pinned to their own format.
    #[serde(default = "default_true")]
    pub request_true_color: bool,

    /// Preferred pixel format to request instead of 32-bit true color.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pixel_format: Option<PixelFormat>,

    /// Initial colormap, for servers that never send SetColorMapEntries.
    #[serde(skip, default)]
    pub color_map: Option<ColorMap>,

    /// Capacity of the event, command and error channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

fn default_security() -> Vec<SecurityScheme> {
    vec![SecurityScheme::None]
}

fn default_encodings() -> Vec<i32> {
    vec![
        ENCODING_TIGHT,
        ENCODING_ZRLE,
        ENCODING_HEXTILE,
        ENCODING_ZLIB,
        ENCODING_CORRE,
        ENCODING_RRE,
        ENCODING_COPY_RECT,
        ENCODING_RAW,
        ENCODING_CURSOR,
        ENCODING_X_CURSOR,
        ENCODING_POINTER_POS,
        ENCODING_DESKTOP_SIZE,
        ENCODING_DESKTOP_NAME,
        ENCODING_LAST_RECT,
    ]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            security: default_security(),
            encodings: default_encodings(),
            exclusive: false,
            draw_cursor: false,
            request_true_color: true,
            pixel_format: None,
            color_map: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validate invariants the runtime depends on.
    pub fn validate(&self) -> Result<(), RfbClientError> {
        if self.security.is_empty() {
            return Err(RfbClientError::Config(
                "at least one security scheme is required".into(),
            ));
        }
        if self.encodings.is_empty() {
            return Err(RfbClientError::Config(
                "at least one encoding must be enabled".into(),
            ));
        }
        if !self.encodings.contains(&ENCODING_RAW) {
            return Err(RfbClientError::Config(
                "Raw encoding is mandatory; every server may fall back to it".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(RfbClientError::Config(
                "channel capacity cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Replace the security preference list.
    #[must_use]
    pub fn security(mut self, schemes: Vec<SecurityScheme>) -> Self {
        self.config.security = schemes;
        self
    }

    /// Shorthand for VNC password authentication with a None fallback.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.security = vec![
            SecurityScheme::Vnc {
                password: password.into(),
            },
            SecurityScheme::None,
        ];
        self
    }

    #[must_use]
    pub fn encodings(mut self, encodings: Vec<i32>) -> Self {
        self.config.encodings = encodings;
        self
    }

    #[must_use]
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.config.exclusive = exclusive;
        self
    }

    #[must_use]
    pub fn draw_cursor(mut self, draw_cursor: bool) -> Self {
        self.config.draw_cursor = draw_cursor;
        self
    }

    pub fn build(self) -> Result<ClientConfig, RfbClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Security schemes for the RFB security phase.
//!
//! The negotiation itself (type lists, selectors, the u32 result word)
//! lives in [`crate::handshake`]; this module implements what happens in
//! between: the per-scheme authentication exchange. Schemes are a tagged
//! union dispatched on the wire type code.
//!
//! Client and server roles are asymmetric. All five schemes implement the
//! client side; the server side covers None, VNC and VeNCrypt Plain (the
//! ATEN and MS-Logon II types exist only to talk *to* such appliances).

mod aten;
mod mslogon;
mod vencrypt;
mod vnc;

pub use vnc::vnc_challenge_response;

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use crate::messages::types::{
    SECURITY_TYPE_ATEN, SECURITY_TYPE_NONE, SECURITY_TYPE_ULTRA_MS_LOGON2, SECURITY_TYPE_VENCRYPT,
    SECURITY_TYPE_VNC,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Mutable handshake state a scheme may update while authenticating.
#[derive(Debug, Default)]
pub struct AuthContext {
    /// Set when the ATEN tunnels-word quirk fires; the connection then
    /// follows the iKVM protocol variant (forced 15-bit pixel format,
    /// extra ServerInit tail, Hermon encoding semantics).
    pub aten_variant: bool,
}

/// A configured security scheme with its credentials.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum SecurityScheme {
    /// Type 1: no authentication.
    None,
    /// Type 2: DES challenge-response on the password.
    Vnc { password: String },
    /// Type 16 with the ATEN banner quirk: fixed-width plaintext fields.
    Aten { username: String, password: String },
    /// Type 19, VeNCrypt 0.2 "Plain" sub-type: cleartext credentials,
    /// presuming an outer TLS tunnel supplied by the transport.
    VeNCryptPlain { username: String, password: String },
    /// Type 113: UltraVNC MS-Logon II, DH key agreement plus DES.
    UltraMsLogon2 { username: String, password: String },
}

impl SecurityScheme {
    /// The security type code this scheme negotiates as.
    pub fn type_code(&self) -> u8 {
        match self {
            Self::None => SECURITY_TYPE_NONE,
            Self::Vnc { .. } => SECURITY_TYPE_VNC,
            Self::Aten { .. } => SECURITY_TYPE_ATEN,
            Self::VeNCryptPlain { .. } => SECURITY_TYPE_VENCRYPT,
            Self::UltraMsLogon2 { .. } => SECURITY_TYPE_ULTRA_MS_LOGON2,
        }
    }

    /// Run the client side of the authentication exchange.
    pub async fn authenticate<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
        &self,
        input: &mut RfbInStream<R>,
        output: &mut RfbOutStream<W>,
        ctx: &mut AuthContext,
    ) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Vnc { password } => vnc::authenticate(input, output, password).await,
            Self::Aten { username, password } => {
                aten::authenticate(input, output, username, password, ctx).await
            }
            Self::VeNCryptPlain { username, password } => {
                vencrypt::authenticate(input, output, username, password).await
            }
            Self::UltraMsLogon2 { username, password } => {
                mslogon::authenticate(input, output, username, password).await
            }
        }
    }

    /// Run the server side: verify the peer's credentials.
    ///
    /// Returns `AuthRejected` when credentials do not match and
    /// `UnsupportedSecurity` for the client-only schemes.
    pub async fn accept<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
        &self,
        input: &mut RfbInStream<R>,
        output: &mut RfbOutStream<W>,
    ) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Vnc { password } => vnc::accept(input, output, password).await,
            Self::VeNCryptPlain { username, password } => {
                vencrypt::accept(input, output, username, password).await
            }
            Self::Aten { .. } | Self::UltraMsLogon2 { .. } => {
                Err(ProtocolError::UnsupportedSecurity {
                    offered: vec![self.type_code()],
                })
            }
        }
    }
}

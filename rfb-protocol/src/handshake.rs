//! The four-phase RFB handshake, client and server sides.
//!
//! 1. **Version**: both sides exchange the 12-byte ASCII banner
//!    `RFB xxx.yyy\n`. The server offers 3.8; 3.8 is selected when the
//!    peer's minor is >= 8, 3.3 when 3 <= minor < 8, anything older fails.
//! 2. **Security**: in 3.8 the server lists its types and the client picks
//!    one; in 3.3 the server dictates a single u32 type. The selected
//!    scheme's exchange runs, then the server reports a u32 result
//!    (failures carry a reason string in 3.8).
//! 3. **ClientInit**: one shared-session flag byte.
//! 4. **ServerInit**: framebuffer geometry, pixel format and desktop name.
//!
//! ATEN iKVM endpoints are detected during the security phase (see
//! [`crate::security`]); their connections read a 12-byte vendor tail after
//! ServerInit and are forced to 800x600 with the 15-bit pixel format.
//!
//! Any failure aborts the connection; there is no retry at this layer.

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use crate::messages::{ClientInit, ServerInit};
use crate::security::{AuthContext, SecurityScheme};
use rfb_canvas::PixelFormat;
use tokio::io::{AsyncRead, AsyncWrite};

pub const PROTO_VERSION_3_8: &[u8; 12] = b"RFB 003.008\n";
pub const PROTO_VERSION_3_3: &[u8; 12] = b"RFB 003.003\n";

/// Negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_3,
    V3_8,
}

impl ProtocolVersion {
    pub const fn banner(self) -> &'static [u8; 12] {
        match self {
            Self::V3_3 => PROTO_VERSION_3_3,
            Self::V3_8 => PROTO_VERSION_3_8,
        }
    }
}

/// Parse `RFB xxx.yyy\n` into (major, minor).
pub fn parse_version(banner: &[u8; 12]) -> Result<(u32, u32)> {
    if &banner[0..4] != b"RFB " || banner[7] != b'.' || banner[11] != b'\n' {
        return Err(ProtocolError::malformed(format!(
            "invalid protocol banner {:?}",
            String::from_utf8_lossy(banner)
        )));
    }
    let digits = |range: std::ops::Range<usize>| -> Result<u32> {
        std::str::from_utf8(&banner[range])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                ProtocolError::malformed(format!(
                    "invalid version digits in banner {:?}",
                    String::from_utf8_lossy(banner)
                ))
            })
    };
    Ok((digits(4..7)?, digits(8..11)?))
}

/// Map a peer's (major, minor) onto a supported version.
fn select_version(major: u32, minor: u32) -> Result<ProtocolVersion> {
    if major != 3 || minor < 3 {
        return Err(ProtocolError::UnsupportedVersion { major, minor });
    }
    if minor >= 8 {
        Ok(ProtocolVersion::V3_8)
    } else {
        Ok(ProtocolVersion::V3_3)
    }
}

async fn read_reason<R: AsyncRead + Unpin>(input: &mut RfbInStream<R>) -> Result<String> {
    let len = input.read_u32().await? as usize;
    let bytes = input.read_exact_vec(len).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Everything the client learns from a successful handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    pub version: ProtocolVersion,
    pub security_type: u8,
    /// The connection speaks the ATEN iKVM variant.
    pub aten: bool,
    pub server_init: ServerInit,
}

/// Run the complete client-side handshake.
///
/// `schemes` is the ordered preference list; the first scheme the server
/// also offers wins.
pub async fn client_handshake<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    schemes: &[SecurityScheme],
    exclusive: bool,
) -> Result<ClientHandshake> {
    // Phase 1: version.
    let mut banner = [0u8; 12];
    input.read_bytes(&mut banner).await?;
    let (major, minor) = parse_version(&banner)?;
    let version = select_version(major, minor)?;
    output.write_bytes(version.banner());
    output.flush().await?;
    tracing::debug!(?version, "protocol version negotiated");

    // Phase 2: security.
    let mut ctx = AuthContext::default();
    let scheme = match version {
        ProtocolVersion::V3_8 => {
            let count = input.read_u8().await?;
            if count == 0 {
                let reason = read_reason(input).await?;
                return Err(ProtocolError::AuthRejected { reason });
            }
            let offered = input.read_exact_vec(count as usize).await?;
            let scheme = schemes
                .iter()
                .find(|s| offered.contains(&s.type_code()))
                .ok_or(ProtocolError::UnsupportedSecurity {
                    offered: offered.clone(),
                })?;
            output.write_u8(scheme.type_code());
            output.flush().await?;
            scheme
        }
        ProtocolVersion::V3_3 => {
            let dictated = input.read_u32().await?;
            if dictated == 0 {
                let reason = read_reason(input).await?;
                return Err(ProtocolError::AuthRejected { reason });
            }
            schemes
                .iter()
                .find(|s| u32::from(s.type_code()) == dictated)
                .ok_or(ProtocolError::UnsupportedSecurity {
                    offered: vec![dictated as u8],
                })?
        }
    };
    tracing::debug!(security_type = scheme.type_code(), "security scheme selected");
    scheme.authenticate(input, output, &mut ctx).await?;

    let result = input.read_u32().await?;
    if result != 0 {
        let reason = match version {
            ProtocolVersion::V3_8 => read_reason(input).await?,
            ProtocolVersion::V3_3 => "authentication failed".into(),
        };
        return Err(ProtocolError::AuthRejected { reason });
    }

    // Phase 3: ClientInit.
    ClientInit { shared: !exclusive }.write_to(output);
    output.flush().await?;

    // Phase 4: ServerInit.
    let mut server_init = ServerInit::read_from(input).await?;
    if ctx.aten_variant {
        // iKVM tail: 8 padding bytes then video/KM/kick/VUSB enable flags.
        input.skip(12).await?;
        server_init.width = 800;
        server_init.height = 600;
        server_init.pixel_format = PixelFormat::aten15();
        tracing::debug!("ATEN variant: forcing 800x600 and 15-bit pixel format");
    }

    Ok(ClientHandshake {
        version,
        security_type: scheme.type_code(),
        aten: ctx.aten_variant,
        server_init,
    })
}

/// Everything the server learns from a successful handshake.
#[derive(Debug, Clone, Copy)]
pub struct ServerHandshake {
    pub version: ProtocolVersion,
    pub security_type: u8,
    /// Client asked for a shared session.
    pub shared: bool,
}

/// Run the complete server-side handshake.
///
/// On success the peer has been authenticated and `init` has been sent.
pub async fn server_handshake<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    schemes: &[SecurityScheme],
    init: &ServerInit,
) -> Result<ServerHandshake> {
    debug_assert!(!schemes.is_empty(), "server needs at least one security scheme");

    // Phase 1: version. The server always offers 3.8.
    output.write_bytes(PROTO_VERSION_3_8);
    output.flush().await?;

    let mut banner = [0u8; 12];
    input.read_bytes(&mut banner).await?;
    let (major, minor) = parse_version(&banner)?;
    let version = select_version(major, minor)?;

    // Phase 2: security.
    let scheme = match version {
        ProtocolVersion::V3_8 => {
            output.write_u8(schemes.len() as u8);
            for scheme in schemes {
                output.write_u8(scheme.type_code());
            }
            output.flush().await?;

            let selected = input.read_u8().await?;
            match schemes.iter().find(|s| s.type_code() == selected) {
                Some(scheme) => scheme,
                None => {
                    let reason = format!("security type {} not offered", selected);
                    output.write_u32(1);
                    output.write_u32(reason.len() as u32);
                    output.write_bytes(reason.as_bytes());
                    output.flush().await?;
                    return Err(ProtocolError::UnsupportedSecurity {
                        offered: vec![selected],
                    });
                }
            }
        }
        ProtocolVersion::V3_3 => {
            // 3.3 has no negotiation; dictate our preferred scheme.
            let scheme = &schemes[0];
            output.write_u32(u32::from(scheme.type_code()));
            output.flush().await?;
            scheme
        }
    };

    if let Err(err) = scheme.accept(input, output).await {
        output.write_u32(1);
        if version == ProtocolVersion::V3_8 {
            let reason = err.to_string();
            output.write_u32(reason.len() as u32);
            output.write_bytes(reason.as_bytes());
        }
        output.flush().await?;
        return Err(err);
    }
    output.write_u32(0);
    output.flush().await?;

    // Phase 3: ClientInit.
    let client_init = ClientInit::read_from(input).await?;

    // Phase 4: ServerInit.
    init.write_to(output);
    output.flush().await?;

    Ok(ServerHandshake {
        version,
        security_type: scheme.type_code(),
        shared: client_init.shared,
    })
}

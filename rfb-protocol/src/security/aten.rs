//! ATEN iKVM authentication (security type 16).
//!
//! ATEN BMC firmware reuses the Tight security type code but speaks its own
//! dialect. The first word on the wire is nominally the Tight "number of
//! tunnels"; iKVM firmware puts a magic pattern (or an implausible count)
//! there, which is how the variant is detected. Credentials then go over as
//! fixed-width NUL-padded plaintext fields.

use super::AuthContext;
use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// Width of the username and password fields.
const AUTH_FIELD_LEN: usize = 24;

/// Magic pattern the tunnels word carries on iKVM firmware.
const ATEN_MAGIC_MASK: u32 = 0xFFFF_0FF0;
const ATEN_MAGIC: u32 = 0xAFF9_0FB0;

/// Whether a tunnels word marks the connection as the ATEN variant.
pub(crate) fn is_aten_tunnels_word(n: u32) -> bool {
    (n & ATEN_MAGIC_MASK) == ATEN_MAGIC || n == 0 || n > 0x0100_0000
}

pub async fn authenticate<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    username: &str,
    password: &str,
    ctx: &mut AuthContext,
) -> Result<()> {
    if username.len() > AUTH_FIELD_LEN || password.len() > AUTH_FIELD_LEN {
        return Err(ProtocolError::AuthRejected {
            reason: format!(
                "ATEN username/password must be at most {} bytes",
                AUTH_FIELD_LEN
            ),
        });
    }

    let tunnels = input.read_u32().await?;
    if is_aten_tunnels_word(tunnels) {
        tracing::debug!(tunnels, "ATEN iKVM variant detected, skipping 20 bytes");
        ctx.aten_variant = true;
        input.skip(20).await?;
    }

    let mut fields = [0u8; AUTH_FIELD_LEN * 2];
    fields[..username.len()].copy_from_slice(username.as_bytes());
    fields[AUTH_FIELD_LEN..AUTH_FIELD_LEN + password.len()].copy_from_slice(password.as_bytes());
    output.write_bytes(&fields);
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tunnels_word_detection() {
        assert!(is_aten_tunnels_word(0xAFF9_0FB0));
        assert!(is_aten_tunnels_word(0xAFF9_1FB5)); // masked bits ignored
        assert!(is_aten_tunnels_word(0)); // zero is implausible
        assert!(is_aten_tunnels_word(0x0100_0001)); // too large
        assert!(!is_aten_tunnels_word(1)); // a real Tight tunnel count
        assert!(!is_aten_tunnels_word(0x0100_0000));
    }

    #[tokio::test]
    async fn sends_fixed_width_fields() {
        // Tunnels word 1: plain Tight framing, no skip, no variant flag.
        let mut input = RfbInStream::new(Cursor::new(vec![0, 0, 0, 1]));
        let mut wire = Vec::new();
        let mut output = RfbOutStream::new(&mut wire);
        let mut ctx = AuthContext::default();

        authenticate(&mut input, &mut output, "admin", "secret", &mut ctx)
            .await
            .unwrap();

        assert!(!ctx.aten_variant);
        assert_eq!(wire.len(), 48);
        assert_eq!(&wire[..5], b"admin");
        assert!(wire[5..24].iter().all(|&b| b == 0));
        assert_eq!(&wire[24..30], b"secret");
        assert!(wire[30..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn magic_word_sets_variant_and_skips() {
        let mut data = vec![0xAF, 0xF9, 0x0F, 0xB0];
        data.extend_from_slice(&[0xEE; 20]); // skipped capability bytes
        let mut input = RfbInStream::new(Cursor::new(data));
        let mut wire = Vec::new();
        let mut output = RfbOutStream::new(&mut wire);
        let mut ctx = AuthContext::default();

        authenticate(&mut input, &mut output, "root", "pw", &mut ctx)
            .await
            .unwrap();

        assert!(ctx.aten_variant);
        assert_eq!(input.available(), 0);
    }

    #[tokio::test]
    async fn oversized_credentials_rejected() {
        let mut input = RfbInStream::new(Cursor::new(Vec::new()));
        let mut output = RfbOutStream::new(Vec::new());
        let mut ctx = AuthContext::default();
        let long = "x".repeat(25);

        let err = authenticate(&mut input, &mut output, &long, "pw", &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AuthRejected { .. }));
    }
}

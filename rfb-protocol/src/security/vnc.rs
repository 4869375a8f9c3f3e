//! Standard VNC authentication (security type 2).
//!
//! The server sends a 16-byte random challenge; the client returns the
//! challenge encrypted with DES-ECB. The key is the password's first 8
//! bytes, zero padded, with the bit order of every byte reversed, a
//! quirk all VNC implementations share but no RFC documents.

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};

/// Compute the response to a VNC auth challenge.
pub fn vnc_challenge_response(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    let mut key = [0u8; 8];
    for (slot, &byte) in key.iter_mut().zip(password.as_bytes().iter().take(8)) {
        *slot = byte;
    }
    // Reverse the bit order of each key byte, the undocumented quirk every
    // VNC implementation shares.
    for byte in &mut key {
        *byte = byte.reverse_bits();
    }

    let cipher = Des::new_from_slice(&key).expect("DES key is always 8 bytes");
    let mut response = *challenge;
    let (block0, block1) = response.split_at_mut(8);
    cipher.encrypt_block(block0.into());
    cipher.encrypt_block(block1.into());
    response
}

/// Client side: answer the server's challenge.
pub async fn authenticate<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    password: &str,
) -> Result<()> {
    if password.is_empty() {
        return Err(ProtocolError::AuthRejected {
            reason: "no password configured for VNC authentication".into(),
        });
    }

    let mut challenge = [0u8; 16];
    input.read_bytes(&mut challenge).await?;

    let response = vnc_challenge_response(password, &challenge);
    output.write_bytes(&response);
    output.flush().await?;
    Ok(())
}

/// Server side: issue a challenge and verify the response.
pub async fn accept<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    password: &str,
) -> Result<()> {
    let mut challenge = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut challenge);

    output.write_bytes(&challenge);
    output.flush().await?;

    let mut response = [0u8; 16];
    input.read_bytes(&mut response).await?;

    if response != vnc_challenge_response(password, &challenge) {
        return Err(ProtocolError::AuthRejected {
            reason: "password invalid".into(),
        });
    }
    Ok(())
}

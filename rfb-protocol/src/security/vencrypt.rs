//! VeNCrypt 0.2 "Plain" authentication (security type 19, sub-type 256).
//!
//! Credentials travel in clear text; VeNCrypt presumes the transport is
//! already wrapped in TLS by the caller. Only the 0.2 Plain sub-type is
//! implemented. The client path sends credentials and never reads them
//! back; verification is the server's job.

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

const VENCRYPT_VERSION: [u8; 2] = [0, 2];

/// VeNCrypt 0.2 sub-type code for Plain.
const SUBTYPE_PLAIN: u32 = 256;

pub async fn authenticate<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    username: &str,
    password: &str,
) -> Result<()> {
    if username.is_empty() || password.is_empty() {
        return Err(ProtocolError::AuthRejected {
            reason: "VeNCrypt Plain requires a username and password".into(),
        });
    }

    // Version exchange: offer 0.2, check the peer agrees.
    output.write_bytes(&VENCRYPT_VERSION);
    output.flush().await?;

    let major = input.read_u8().await?;
    let minor = input.read_u8().await?;
    let ok = major == 0 && minor == 2;
    output.write_u8(u8::from(!ok));
    output.flush().await?;
    if !ok {
        return Err(ProtocolError::UnsupportedSecurity {
            offered: vec![major, minor],
        });
    }

    // One sub-type on offer: Plain.
    output.write_u8(1);
    output.write_u32(SUBTYPE_PLAIN);
    output.flush().await?;

    output.write_u32(username.len() as u32);
    output.write_u32(password.len() as u32);
    output.write_bytes(username.as_bytes());
    output.write_bytes(password.as_bytes());
    output.flush().await?;
    Ok(())
}

/// Server side: mirror the exchange and verify the credentials.
pub async fn accept<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    expected_username: &str,
    expected_password: &str,
) -> Result<()> {
    let major = input.read_u8().await?;
    let minor = input.read_u8().await?;
    output.write_bytes(&VENCRYPT_VERSION);
    output.flush().await?;
    if major != 0 || minor != 2 {
        return Err(ProtocolError::UnsupportedSecurity {
            offered: vec![major, minor],
        });
    }

    let ack = input.read_u8().await?;
    if ack != 0 {
        return Err(ProtocolError::AuthRejected {
            reason: "peer rejected VeNCrypt version".into(),
        });
    }

    let count = input.read_u8().await?;
    let mut selected = None;
    for _ in 0..count {
        let sub_type = input.read_u32().await?;
        if sub_type == SUBTYPE_PLAIN {
            selected = Some(sub_type);
        }
    }
    if selected.is_none() {
        return Err(ProtocolError::UnsupportedSecurity { offered: vec![] });
    }

    let user_len = input.read_u32().await? as usize;
    let pass_len = input.read_u32().await? as usize;
    let username = input.read_exact_vec(user_len).await?;
    let password = input.read_exact_vec(pass_len).await?;

    if username != expected_username.as_bytes() || password != expected_password.as_bytes() {
        return Err(ProtocolError::AuthRejected {
            reason: "invalid username or password".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_pair(
        client_user: &'static str,
        client_pass: &'static str,
        server_user: &'static str,
        server_pass: &'static str,
    ) -> (Result<()>, Result<()>) {
        let (client_stream, server_stream) = tokio::io::duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, server_write) = tokio::io::split(server_stream);

        let client = tokio::spawn(async move {
            let mut input = RfbInStream::new(client_read);
            let mut output = RfbOutStream::new(client_write);
            authenticate(&mut input, &mut output, client_user, client_pass).await
        });

        let mut input = RfbInStream::new(server_read);
        let mut output = RfbOutStream::new(server_write);
        let server_result = accept(&mut input, &mut output, server_user, server_pass).await;
        (client.await.unwrap(), server_result)
    }

    #[tokio::test]
    async fn matching_credentials_pass() {
        let (client, server) = run_pair("user", "pw", "user", "pw").await;
        client.unwrap();
        server.unwrap();
    }

    #[tokio::test]
    async fn wrong_credentials_rejected_server_side() {
        let (client, server) = run_pair("user", "bad", "user", "pw").await;
        client.unwrap(); // the client only sends; it learns via the result word
        assert!(matches!(
            server.unwrap_err(),
            ProtocolError::AuthRejected { .. }
        ));
    }

    #[tokio::test]
    async fn missing_credentials_fail_early() {
        let mut input = RfbInStream::new(std::io::Cursor::new(Vec::new()));
        let mut output = RfbOutStream::new(Vec::new());
        let err = authenticate(&mut input, &mut output, "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AuthRejected { .. }));
    }
}

//! UltraVNC MS-Logon II authentication (security type 113).
//!
//! The server supplies Diffie-Hellman parameters small enough to fit in 64
//! bits: an i64 generator, an i64 prime and its own 8-byte public key. The
//! client picks a private key, sends `g^x mod p`, derives the 8-byte shared
//! secret and uses it as a DES key (and IV) to encrypt the username and
//! password in CBC mode, zero-padded to 256 and 64 bytes respectively.

use crate::error::{ProtocolError, Result};
use crate::io::{RfbInStream, RfbOutStream};
use cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};

const USERNAME_FIELD_LEN: usize = 256;
const PASSWORD_FIELD_LEN: usize = 64;

/// `base ^ exp mod modulus` over u64, widened through u128 so the
/// intermediate products cannot overflow.
fn mod_pow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus <= 1 {
        return 0;
    }
    let m = u128::from(modulus);
    let mut result: u128 = 1;
    let mut b = u128::from(base % modulus);
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    result as u64
}

/// DES-CBC with the shared secret as both key and IV, zero-padded plaintext.
fn encrypt_credential(plain: &[u8], field_len: usize, key: &[u8; 8]) -> Vec<u8> {
    let mut buf = vec![0u8; field_len];
    let n = plain.len().min(field_len);
    buf[..n].copy_from_slice(&plain[..n]);

    let cipher = Des::new_from_slice(key).expect("DES key is always 8 bytes");
    let mut prev = *key;
    for block in buf.chunks_exact_mut(8) {
        for (byte, chain) in block.iter_mut().zip(prev.iter()) {
            *byte ^= chain;
        }
        cipher.encrypt_block(block.into());
        prev.copy_from_slice(block);
    }
    buf
}

pub async fn authenticate<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    username: &str,
    password: &str,
) -> Result<()> {
    if username.is_empty() || password.is_empty() {
        return Err(ProtocolError::AuthRejected {
            reason: "MS-Logon II requires a username and password".into(),
        });
    }

    let generator = input.read_u64().await?;
    let prime = input.read_u64().await?;
    let mut server_key = [0u8; 8];
    input.read_bytes(&mut server_key).await?;

    if prime < 3 || generator < 2 {
        return Err(ProtocolError::malformed(format!(
            "implausible DH parameters: g={} p={}",
            generator, prime
        )));
    }

    let private_key: u64 = rand::thread_rng().gen_range(2..prime);
    let public_key = mod_pow(generator, private_key, prime);
    let shared = mod_pow(u64::from_be_bytes(server_key), private_key, prime);
    let secret = shared.to_be_bytes();

    tracing::debug!(g = generator, p = prime, "MS-Logon II key agreement done");

    output.write_u64(public_key);
    output.write_bytes(&encrypt_credential(
        username.as_bytes(),
        USERNAME_FIELD_LEN,
        &secret,
    ));
    output.write_bytes(&encrypt_credential(
        password.as_bytes(),
        PASSWORD_FIELD_LEN,
        &secret,
    ));
    output.flush().await?;
    Ok(())
}

//! Desktop pseudo-encodings handled by the rectangle dispatcher.
//!
//! DesktopSize (-223) has no payload; the new geometry is the rectangle's
//! width and height, and every stateful decoder must be reset before the
//! next rectangle is decoded. DesktopName (-307) carries a length-prefixed
//! UTF-8 name. Both mutate connection state rather than the canvas, so the
//! dispatcher applies them before consulting the decoder registry.

use anyhow::{Context, Result};
use rfb_protocol::io::RfbInStream;
use tokio::io::AsyncRead;

/// Read the DesktopName payload.
pub async fn read_desktop_name<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
) -> Result<String> {
    let length = stream.read_u32().await? as usize;
    let bytes = stream
        .read_exact_vec(length)
        .await
        .context("DesktopName: failed to read name bytes")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

//! Persistent zlib stream state shared by the Zlib, Tight and ZRLE codecs.
//!
//! RFB zlib streams are continuous across rectangles: only the first block
//! after (re)creation carries the zlib header, later blocks are raw deflate
//! continuation data. Reset therefore means "drop the decompressor"; the
//! next block becomes the head of a new stream.

use anyhow::{Context, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

const CHUNK: usize = 64 * 1024;

/// A lazily created, resettable inflater.
pub(crate) struct Inflater {
    inner: Option<Decompress>,
}

impl Inflater {
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Drop the stream state; the next input starts a fresh zlib stream.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Decompress `input`, consuming all of it.
    ///
    /// When `expected_len` is given, exactly that many output bytes must be
    /// produced; otherwise whatever the input inflates to is returned.
    pub fn inflate(&mut self, input: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>> {
        let inflater = self
            .inner
            .get_or_insert_with(|| Decompress::new(true));

        let mut output = Vec::with_capacity(expected_len.unwrap_or(input.len() * 4));
        let mut chunk = vec![0u8; CHUNK];
        let mut in_pos = 0usize;

        loop {
            let before_in = inflater.total_in();
            let before_out = inflater.total_out();

            let status = inflater
                .decompress(&input[in_pos..], &mut chunk, FlushDecompress::Sync)
                .context("zlib decompression failed")?;

            let consumed = (inflater.total_in() - before_in) as usize;
            let produced = (inflater.total_out() - before_out) as usize;
            in_pos += consumed;
            output.extend_from_slice(&chunk[..produced]);

            if consumed == 0 && produced == 0 && in_pos < input.len() {
                anyhow::bail!(
                    "zlib stream stalled with {} input bytes left",
                    input.len() - in_pos
                );
            }

            if let Some(expected) = expected_len {
                if output.len() > expected {
                    anyhow::bail!(
                        "zlib stream produced {} bytes, expected {}",
                        output.len(),
                        expected
                    );
                }
                if output.len() == expected && in_pos >= input.len() {
                    break;
                }
            }
            if in_pos >= input.len() {
                break;
            }
            if matches!(status, Status::StreamEnd) {
                tracing::warn!(
                    consumed = in_pos,
                    total = input.len(),
                    "zlib stream ended before all input was consumed"
                );
                break;
            }
        }

        if let Some(expected) = expected_len {
            anyhow::ensure!(
                output.len() == expected,
                "zlib stream produced {} bytes, expected {}",
                output.len(),
                expected
            );
        }
        Ok(output)
    }
}

/// A lazily created, resettable deflater producing a continuous stream.
pub(crate) struct Deflater {
    inner: Option<Compress>,
}

impl Deflater {
    pub fn new() -> Self {
        Self { inner: None }
    }

    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Compress `input` with a sync flush so the peer can decode the block
    /// without waiting for more data.
    pub fn deflate(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let deflater = self
            .inner
            .get_or_insert_with(|| Compress::new(Compression::default(), true));

        let mut output = Vec::with_capacity(input.len() / 2 + 64);
        let mut chunk = vec![0u8; CHUNK];
        let mut in_pos = 0usize;

        loop {
            let before_in = deflater.total_in();
            let before_out = deflater.total_out();

            let status = deflater
                .compress(&input[in_pos..], &mut chunk, FlushCompress::Sync)
                .context("zlib compression failed")?;

            in_pos += (deflater.total_in() - before_in) as usize;
            let produced = (deflater.total_out() - before_out) as usize;
            output.extend_from_slice(&chunk[..produced]);

            if in_pos >= input.len() && produced < chunk.len() {
                break;
            }
            if matches!(status, Status::StreamEnd) {
                break;
            }
        }
        Ok(output)
    }
}

//! The frame-consumer boundary.
//!
//! Video encoder back-ends live outside this crate; the whole contract is
//! "push one decoded frame, close when done". [`FrameSink`] captures that
//! contract, and [`PngSequenceSink`] is the in-tree implementation for
//! dumping a session as numbered PNG files.

use anyhow::{Context, Result};
use rfb_canvas::Canvas;
use std::path::PathBuf;

/// Consumer of completed frames.
///
/// Frames must only be pushed at frame boundaries (after a complete
/// FramebufferUpdate); the canvas passed in is read-only for the duration
/// of the call.
pub trait FrameSink {
    /// Consume one completed frame.
    fn push_frame(&mut self, canvas: &Canvas) -> Result<()>;

    /// Finish the stream; no frames may be pushed afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Writes each frame as `frame-NNNNNN.png` into a directory.
pub struct PngSequenceSink {
    directory: PathBuf,
    frame_index: usize,
    closed: bool,
}

impl PngSequenceSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            frame_index: 0,
            closed: false,
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frame_index
    }
}

impl FrameSink for PngSequenceSink {
    fn push_frame(&mut self, canvas: &Canvas) -> Result<()> {
        anyhow::ensure!(!self.closed, "frame sink already closed");
        let (width, height) = canvas.dimensions();
        let path = self
            .directory
            .join(format!("frame-{:06}.png", self.frame_index));
        image::save_buffer(
            &path,
            canvas.data(),
            width,
            height,
            image::ColorType::Rgb8,
        )
        .with_context(|| format!("failed to write {}", path.display()))?;
        self.frame_index += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_canvas::Rgb;
    use rfb_common::Rect;

    #[test]
    fn writes_numbered_frames() {
        let dir = std::env::temp_dir().join(format!(
            "rfb-frames-{}-{}",
            std::process::id(),
            std::thread::current().name().unwrap_or("t").len()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(&Rect::new(0, 0, 4, 4), Rgb::new(1, 2, 3));

        let mut sink = PngSequenceSink::new(&dir);
        sink.push_frame(&canvas).unwrap();
        sink.push_frame(&canvas).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.frames_written(), 2);
        assert!(dir.join("frame-000000.png").exists());
        assert!(dir.join("frame-000001.png").exists());
        assert!(sink.push_frame(&canvas).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

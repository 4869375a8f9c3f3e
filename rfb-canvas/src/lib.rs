//! Framebuffer model for the RFB protocol stack.
//!
//! This crate owns everything about pixels that is independent of the wire:
//!
//! - [`PixelFormat`] - how a pixel is laid out on the wire, plus conversions
//!   to and from 8-bit [`Rgb`]
//! - [`ColorMap`] - the 256-entry lookup table used by non-true-color formats
//! - [`Canvas`] - the decoded framebuffer, including the cursor overlay and
//!   the changed-block tracking used for frame diffing
//!
//! The wire serialization of [`PixelFormat`] (the 16-byte structure from the
//! RFB specification) lives with the message layer; this crate only deals in
//! the decoded form.

pub mod canvas;
pub mod colormap;
pub mod format;

pub use canvas::{Canvas, CursorImage};
pub use colormap::{ColorMap, Rgb16};
pub use format::{PixelFormat, Rgb};

//! Decoder boundary
//!
//! The engine talks to the actual video library through two narrow traits:
//!
//! - [`DecoderBackend`]: opens a stream, shared across threads.
//! - [`Decoder`]: one open handle with a mutable read cursor. `Send` but not
//!   `Sync`; the engine keeps every call on a handle behind one lock.
//!
//! Backends:
//! - `synthetic`: deterministic test pattern with configurable seek behavior.
//! - `ffmpeg` (feature `ffmpeg`): real files via playa-ffmpeg.

pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::path::Path;

use crate::error::VideoError;

pub use synthetic::{CallCounters, SeekBehavior, SyntheticBackend};

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegBackend;

/// Decoder-native pixel layouts, all 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }
}

/// One decoded picture in the decoder's native layout
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
}

/// Stream properties reported by an open handle
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub frame_count: i64,
    pub codec: String,
}

/// One open video stream
pub trait Decoder: Send {
    fn info(&self) -> StreamInfo;

    /// Request a jump to frame `index`. Returns false if the request was rejected
    /// outright; acceptance says nothing about where the cursor actually landed.
    fn seek_to_frame(&mut self, index: i64) -> bool;

    /// Request a jump to `msec` milliseconds from the start
    fn seek_to_msec(&mut self, msec: f64) -> bool;

    /// Decode the frame under the cursor and advance. `Ok(None)` at end of stream.
    fn read_next(&mut self) -> Result<Option<DecodedImage>, VideoError>;

    /// Index of the next frame `read_next` returns, None if unknown
    fn position(&self) -> Option<i64>;

    /// Release the stream. Further reads return end of stream.
    fn close(&mut self);
}

/// Opens decoder handles
pub trait DecoderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, VideoError>;
}

//! Decoded RGB24 frames
//!
//! **Why**: The cache hands frames to the UI thread, the preloader and
//! downstream consumers at the same time. A frame is an immutable shared
//! buffer, so cloning is an `Arc` bump and evicting a cache entry never
//! invalidates a frame already handed out.
//!
//! **Used by**: FrameCache (storage), retriever (produced by conversion),
//! extractor and CLI (export via `to_image`).
//!
//! # Layout
//!
//! Tightly packed RGB, 3 bytes per pixel, row-major, no padding, no alpha.

use std::sync::Arc;

/// Frame construction errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    SizeMismatch { expected: usize, actual: usize },
    EmptyDimensions,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::SizeMismatch { expected, actual } => write!(
                f,
                "Invalid RGB buffer size: expected {} bytes, got {}",
                expected, actual
            ),
            FrameError::EmptyDimensions => write!(f, "Frame has zero width or height"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Immutable RGB24 frame
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    width: usize,
    height: usize,
}

impl Frame {
    /// Wrap a packed RGB24 buffer (`width * height * 3` bytes)
    pub fn from_rgb24(buffer: Vec<u8>, width: usize, height: usize) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions);
        }
        let expected = width * height * 3;
        if buffer.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        Ok(Self {
            data: Arc::from(buffer),
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw RGB bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Memory held by the pixel buffer in bytes
    pub fn mem(&self) -> usize {
        self.data.len()
    }

    /// RGB triple at (x, y), None outside the frame
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.width + x) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// True if both frames share the same underlying buffer
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy into an `image::RgbImage` for encoding to disk
    pub fn to_image(&self) -> image::RgbImage {
        // Dimensions and length are validated at construction
        image::RgbImage::from_raw(self.width as u32, self.height as u32, self.data.to_vec())
            .unwrap_or_else(|| image::RgbImage::new(self.width as u32, self.height as u32))
    }
}

impl PartialEq for Frame {
    /// Pixel-identical comparison
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.data == other.data
    }
}

impl Eq for Frame {}

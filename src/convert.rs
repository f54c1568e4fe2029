//! Pixel layout conversion to packed RGB24
//!
//! Decoders hand back pictures in whatever layout the library prefers
//! (OpenCV-style BGR, RGBA from swscale paths, plain RGB). Everything that
//! enters the cache is RGB24.

use crate::decoder::{DecodedImage, PixelFormat};
use crate::frame::{Frame, FrameError};

/// Convert a decoded picture into an RGB24 [`Frame`]
pub fn to_rgb_frame(image: DecodedImage) -> Result<Frame, FrameError> {
    let expected = image.width * image.height * image.format.bytes_per_pixel();
    if image.data.len() != expected {
        return Err(FrameError::SizeMismatch {
            expected,
            actual: image.data.len(),
        });
    }

    let rgb = match image.format {
        PixelFormat::Rgb24 => image.data,
        PixelFormat::Bgr24 => {
            let mut data = image.data;
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            data
        }
        PixelFormat::Rgba32 => {
            let mut data = Vec::with_capacity(image.width * image.height * 3);
            for px in image.data.chunks_exact(4) {
                data.extend_from_slice(&px[..3]);
            }
            data
        }
    };

    Frame::from_rgb24(rgb, image.width, image.height)
}

//! Video access errors
//!
//! Load-time failures (`NotFound`, `OpenFailure`) propagate to the caller of
//! `load_video`. Per-frame failures (`DecodeFailure`, `OutOfRange`) are absorbed
//! at the public boundary and reported as an absent frame, so a single corrupt
//! frame never aborts a scrubbing session.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum VideoError {
    /// Path does not exist
    NotFound(PathBuf),
    /// Decoder could not open the stream
    OpenFailure { path: PathBuf, reason: String },
    /// A specific frame could not be read
    DecodeFailure { index: i64, reason: String },
    /// Index outside `[0, frame_count)`
    OutOfRange { index: i64, frame_count: i64 },
}

impl VideoError {
    pub fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VideoError::OpenFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(index: i64, reason: impl Into<String>) -> Self {
        VideoError::DecodeFailure {
            index,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoError::NotFound(path) => write!(f, "Video file not found: {}", path.display()),
            VideoError::OpenFailure { path, reason } => {
                write!(f, "Failed to open video {}: {}", path.display(), reason)
            }
            VideoError::DecodeFailure { index, reason } => {
                write!(f, "Failed to decode frame {}: {}", index, reason)
            }
            VideoError::OutOfRange { index, frame_count } => {
                write!(f, "Frame {} out of range [0, {})", index, frame_count)
            }
        }
    }
}

impl std::error::Error for VideoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(
            VideoError::open("a.mp4", "bad header"),
            VideoError::OpenFailure {
                path: PathBuf::from("a.mp4"),
                reason: "bad header".to_string(),
            }
        );
        assert_eq!(
            VideoError::decode(3, "corrupt").to_string(),
            "Failed to decode frame 3: corrupt"
        );
    }

    #[test]
    fn test_display() {
        let err = VideoError::OutOfRange { index: 12, frame_count: 10 };
        assert_eq!(err.to_string(), "Frame 12 out of range [0, 10)");
    }
}

//! Video metadata captured once per `load_video`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable stream metadata. Shared as `Arc<VideoInfo>`, needs no locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub frame_count: i64,
    /// Seconds
    pub duration: f64,
    /// Codec tag (fourcc or codec name)
    pub codec: String,
}

impl VideoInfo {
    pub fn new(
        path: PathBuf,
        width: usize,
        height: usize,
        fps: f64,
        frame_count: i64,
        codec: impl Into<String>,
    ) -> Self {
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            path,
            width,
            height,
            fps,
            frame_count,
            duration,
            codec: codec.into(),
        }
    }

    /// "WIDTHxHEIGHT"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Duration as HH:MM:SS.mmm
    pub fn format_duration(&self) -> String {
        let total = self.duration.max(0.0);
        let hours = (total / 3600.0).floor() as u64;
        let minutes = ((total % 3600.0) / 60.0).floor() as u64;
        let seconds = total % 60.0;
        format!("{:02}:{:02}:{:06.3}", hours, minutes, seconds)
    }

    /// Frame index shown at `timestamp` seconds: floor(timestamp * fps)
    pub fn frame_index_at(&self, timestamp: f64) -> i64 {
        (timestamp * self.fps).floor() as i64
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= 0 && index < self.frame_count
    }

    /// Number of frames sampled from `[start, end]` seconds at `rate` per second (at least 1)
    pub fn frames_in_range(start: f64, end: f64, rate: f64) -> usize {
        let count = ((end - start) * rate).floor();
        if count.is_finite() && count >= 1.0 {
            count as usize
        } else {
            1
        }
    }

    /// Convert four-character code to a printable tag
    pub fn fourcc_to_string(fourcc: u32) -> String {
        (0..4)
            .map(|i| ((fourcc >> (8 * i)) & 0xFF) as u8)
            .map(|b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64, frames: i64) -> VideoInfo {
        VideoInfo::new(PathBuf::from("clip.mp4"), 1920, 1080, fps, frames, "avc1")
    }

    #[test]
    fn test_duration_and_resolution() {
        let v = info(25.0, 100);
        assert_eq!(v.duration, 4.0);
        assert_eq!(v.resolution(), "1920x1080");
        assert_eq!(info(0.0, 100).duration, 0.0);
    }

    #[test]
    fn test_format_duration() {
        let mut v = info(30.0, 0);
        v.duration = 3725.5;
        assert_eq!(v.format_duration(), "01:02:05.500");
        v.duration = 0.0;
        assert_eq!(v.format_duration(), "00:00:00.000");
    }

    #[test]
    fn test_frame_index_at() {
        let v = info(30.0, 300);
        assert_eq!(v.frame_index_at(0.0), 0);
        assert_eq!(v.frame_index_at(1.0), 30);
        assert_eq!(v.frame_index_at(1.999), 59);
        assert_eq!(v.frame_index_at(-0.01), -1);
    }

    #[test]
    fn test_frames_in_range() {
        assert_eq!(VideoInfo::frames_in_range(0.0, 2.0, 10.0), 20);
        assert_eq!(VideoInfo::frames_in_range(1.0, 1.0, 10.0), 1);
        assert_eq!(VideoInfo::frames_in_range(2.0, 1.0, 10.0), 1);
    }

    #[test]
    fn test_fourcc() {
        let fourcc = u32::from_le_bytes(*b"avc1");
        assert_eq!(VideoInfo::fourcc_to_string(fourcc), "avc1");
    }
}

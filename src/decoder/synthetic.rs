//! Synthetic test-pattern decoder
//!
//! Produces deterministic frames without touching the file system, with a
//! configurable seek behavior so both retrieval strategies can be driven:
//!
//! - `Accurate`: seeks land exactly on the requested frame.
//! - `SnapToKeyframe`: seeks land on the preceding keyframe (common for
//!   long-GOP containers that report success anyway).
//! - `Unsupported`: seeks "succeed" but leave the cursor unknown.
//!
//! All handles opened by one backend share a [`CallCounters`] instance, which
//! counts opens/seeks/reads and records any two calls in flight at the same
//! time on a handle.
//!
//! Pixels are emitted in BGR order by default, so the color conversion step is
//! always exercised.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::trace;

use super::{DecodedImage, Decoder, DecoderBackend, PixelFormat, StreamInfo};
use crate::error::VideoError;

/// How a synthetic handle reacts to seek requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekBehavior {
    Accurate,
    SnapToKeyframe { interval: i64 },
    Unsupported,
}

/// Shared call instrumentation
#[derive(Debug, Default)]
pub struct CallCounters {
    opens: AtomicU64,
    seeks: AtomicU64,
    reads: AtomicU64,
    overlaps: AtomicU64,
    in_flight: AtomicBool,
}

impl CallCounters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Frame and timestamp seeks combined
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of calls that started while another call was still running
    pub fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.opens.store(0, Ordering::SeqCst);
        self.seeks.store(0, Ordering::SeqCst);
        self.reads.store(0, Ordering::SeqCst);
        self.overlaps.store(0, Ordering::SeqCst);
    }

    fn enter(&self) -> CallGuard<'_> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        CallGuard { counters: self }
    }
}

struct CallGuard<'a> {
    counters: &'a CallCounters,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Channel value of the test pattern in RGB order
pub fn pattern_value(index: i64, x: usize, y: usize, channel: usize) -> u8 {
    let v = index
        .wrapping_mul(31)
        .wrapping_add((x * 7 + y * 13 + channel * 101) as i64);
    v.rem_euclid(256) as u8
}

/// Backend producing synthetic handles
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    width: usize,
    height: usize,
    fps: f64,
    frame_count: i64,
    behavior: SeekBehavior,
    format: PixelFormat,
    decode_delay: Duration,
    corrupt: HashSet<i64>,
    fail_open: bool,
    counters: Arc<CallCounters>,
}

impl SyntheticBackend {
    pub fn new(width: usize, height: usize, fps: f64, frame_count: i64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
            behavior: SeekBehavior::Accurate,
            format: PixelFormat::Bgr24,
            decode_delay: Duration::ZERO,
            corrupt: HashSet::new(),
            fail_open: false,
            counters: Arc::new(CallCounters::default()),
        }
    }

    pub fn with_behavior(mut self, behavior: SeekBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Sleep inside every seek/read to widen race windows
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Frames that fail to decode
    pub fn with_corrupt_frames(mut self, frames: impl IntoIterator<Item = i64>) -> Self {
        self.corrupt.extend(frames);
        self
    }

    /// Every `open` fails
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        Arc::clone(&self.counters)
    }

    pub fn behavior(&self) -> SeekBehavior {
        self.behavior
    }

    /// Expected RGB24 bytes of frame `index` after conversion
    pub fn expected_rgb(&self, index: i64) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..3 {
                    out.push(pattern_value(index, x, y, c));
                }
            }
        }
        out
    }

    fn render(&self, index: i64) -> DecodedImage {
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(self.width * self.height * bpp);
        for y in 0..self.height {
            for x in 0..self.width {
                let [r, g, b] = [0, 1, 2].map(|c| pattern_value(index, x, y, c));
                match self.format {
                    PixelFormat::Rgb24 => data.extend_from_slice(&[r, g, b]),
                    PixelFormat::Bgr24 => data.extend_from_slice(&[b, g, r]),
                    PixelFormat::Rgba32 => data.extend_from_slice(&[r, g, b, 255]),
                }
            }
        }
        DecodedImage {
            data,
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

impl DecoderBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, VideoError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(VideoError::open(path, "synthetic open failure"));
        }
        trace!("Synthetic open: {} ({:?})", path.display(), self.behavior);
        Ok(Box::new(SyntheticDecoder {
            source: self.clone(),
            cursor: Some(0),
            closed: false,
        }))
    }
}

/// Parses `WxH@FPS:FRAMES[:MODE]`, MODE = `seek` | `snapN` | `none`
impl FromStr for SyntheticBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || format!("Invalid synthetic stream '{}', expected WxH@FPS:FRAMES[:MODE]", s);

        let (dims, rest) = s.split_once('@').ok_or_else(err)?;
        let (w, h) = dims.split_once('x').ok_or_else(err)?;
        let mut parts = rest.split(':');
        let fps = parts.next().ok_or_else(err)?;
        let frames = parts.next().ok_or_else(err)?;

        let width: usize = w.parse().map_err(|_| err())?;
        let height: usize = h.parse().map_err(|_| err())?;
        let fps: f64 = fps.parse().map_err(|_| err())?;
        let frames: i64 = frames.parse().map_err(|_| err())?;

        let behavior = match parts.next() {
            None | Some("seek") => SeekBehavior::Accurate,
            Some("none") => SeekBehavior::Unsupported,
            Some(mode) => {
                let interval = mode
                    .strip_prefix("snap")
                    .and_then(|n| n.parse::<i64>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(err)?;
                SeekBehavior::SnapToKeyframe { interval }
            }
        };

        if width == 0 || height == 0 || frames < 0 {
            return Err(err());
        }

        Ok(SyntheticBackend::new(width, height, fps, frames).with_behavior(behavior))
    }
}

struct SyntheticDecoder {
    source: SyntheticBackend,
    cursor: Option<i64>,
    closed: bool,
}

impl SyntheticDecoder {
    fn land(&mut self, target: i64) -> bool {
        if self.closed || target < 0 || target > self.source.frame_count {
            return false;
        }
        self.cursor = match self.source.behavior {
            SeekBehavior::Accurate => Some(target),
            SeekBehavior::SnapToKeyframe { interval } => {
                let interval = interval.max(1);
                Some(target - target % interval)
            }
            SeekBehavior::Unsupported => None,
        };
        true
    }

    fn simulate_work(&self) {
        if !self.source.decode_delay.is_zero() {
            thread::sleep(self.source.decode_delay);
        }
    }
}

impl Decoder for SyntheticDecoder {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.source.width,
            height: self.source.height,
            fps: self.source.fps,
            frame_count: self.source.frame_count,
            codec: "syn0".to_string(),
        }
    }

    fn seek_to_frame(&mut self, index: i64) -> bool {
        let counters = Arc::clone(&self.source.counters);
        let _guard = counters.enter();
        counters.seeks.fetch_add(1, Ordering::SeqCst);
        self.simulate_work();
        self.land(index)
    }

    fn seek_to_msec(&mut self, msec: f64) -> bool {
        let counters = Arc::clone(&self.source.counters);
        let _guard = counters.enter();
        counters.seeks.fetch_add(1, Ordering::SeqCst);
        self.simulate_work();
        // Small epsilon so 1000/30*30 lands on 30, not 29
        let target = (msec / 1000.0 * self.source.fps + 1e-6).floor() as i64;
        self.land(target)
    }

    fn read_next(&mut self) -> Result<Option<DecodedImage>, VideoError> {
        let counters = Arc::clone(&self.source.counters);
        let _guard = counters.enter();
        counters.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_work();

        if self.closed {
            return Ok(None);
        }
        let Some(index) = self.cursor else {
            return Err(VideoError::decode(-1, "read after failed seek"));
        };
        if index >= self.source.frame_count {
            return Ok(None);
        }
        self.cursor = Some(index + 1);
        if self.source.corrupt.contains(&index) {
            return Err(VideoError::decode(index, "corrupt packet"));
        }
        Ok(Some(self.source.render(index)))
    }

    fn position(&self) -> Option<i64> {
        if self.closed { None } else { self.cursor }
    }

    fn close(&mut self) {
        self.closed = true;
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(backend: &SyntheticBackend) -> Box<dyn Decoder> {
        backend.open(Path::new("synthetic.mp4")).unwrap()
    }

    #[test]
    fn test_sequential_reads_advance_cursor() {
        let backend = SyntheticBackend::new(4, 2, 30.0, 3);
        let mut dec = open(&backend);
        assert_eq!(dec.position(), Some(0));
        for _ in 0..3 {
            assert!(dec.read_next().unwrap().is_some());
        }
        assert_eq!(dec.position(), Some(3));
        assert!(dec.read_next().unwrap().is_none());
        assert_eq!(backend.counters().reads(), 4);
    }

    #[test]
    fn test_bgr_layout() {
        let backend = SyntheticBackend::new(2, 1, 30.0, 5);
        let mut dec = open(&backend);
        dec.seek_to_frame(3);
        let img = dec.read_next().unwrap().unwrap();
        assert_eq!(img.format, PixelFormat::Bgr24);
        assert_eq!(img.data[0], pattern_value(3, 0, 0, 2));
        assert_eq!(img.data[2], pattern_value(3, 0, 0, 0));
    }

    #[test]
    fn test_snap_to_keyframe() {
        let backend = SyntheticBackend::new(2, 2, 30.0, 100)
            .with_behavior(SeekBehavior::SnapToKeyframe { interval: 12 });
        let mut dec = open(&backend);
        assert!(dec.seek_to_frame(30));
        assert_eq!(dec.position(), Some(24));
        assert!(dec.seek_to_msec(1000.0));
        assert_eq!(dec.position(), Some(24));
    }

    #[test]
    fn test_unsupported_seek_invalidates_position() {
        let backend = SyntheticBackend::new(2, 2, 30.0, 100)
            .with_behavior(SeekBehavior::Unsupported);
        let mut dec = open(&backend);
        assert!(dec.seek_to_frame(10));
        assert_eq!(dec.position(), None);
        assert!(dec.read_next().is_err());
    }

    #[test]
    fn test_msec_seek_rounding() {
        let backend = SyntheticBackend::new(2, 2, 30.0, 100);
        let mut dec = open(&backend);
        dec.seek_to_msec(29.0 / 30.0 * 1000.0);
        assert_eq!(dec.position(), Some(29));
    }

    #[test]
    fn test_corrupt_frame_advances() {
        let backend = SyntheticBackend::new(2, 2, 30.0, 10).with_corrupt_frames([1]);
        let mut dec = open(&backend);
        assert!(dec.read_next().unwrap().is_some());
        assert!(dec.read_next().is_err());
        assert_eq!(dec.position(), Some(2));
    }

    #[test]
    fn test_close_ends_stream() {
        let backend = SyntheticBackend::new(2, 2, 30.0, 10);
        let mut dec = open(&backend);
        dec.close();
        assert_eq!(dec.position(), None);
        assert!(dec.read_next().unwrap().is_none());
    }

    #[test]
    fn test_parse_stream_description() {
        let b: SyntheticBackend = "640x360@15:300".parse().unwrap();
        assert_eq!(b.behavior(), SeekBehavior::Accurate);
        let b: SyntheticBackend = "64x36@30:90:snap12".parse().unwrap();
        assert_eq!(b.behavior(), SeekBehavior::SnapToKeyframe { interval: 12 });
        let b: SyntheticBackend = "64x36@30:90:none".parse().unwrap();
        assert_eq!(b.behavior(), SeekBehavior::Unsupported);
        assert!("64x36".parse::<SyntheticBackend>().is_err());
        assert!("0x36@30:90".parse::<SyntheticBackend>().is_err());
        assert!("64x36@30:90:snap0".parse::<SyntheticBackend>().is_err());
    }
}

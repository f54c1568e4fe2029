//! Batch frame extraction
//!
//! Pulls frames at a fixed sample rate out of a time range, for export and
//! analysis pipelines. Runs on its own decoder handle, independent of any
//! loaded `VideoProcessor`, and picks its read strategy with the same seek
//! probe:
//!
//! - seek mode: one seek + read per sample
//! - sequential mode: reopen, scan forward once, keep the sampled indices,
//!   stop as soon as the last one is collected
//!
//! Progress goes out over a crossbeam channel; cancellation is a shared
//! [`CancelToken`] checked before every decode.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info, trace, warn};

use crate::convert::to_rgb_frame;
use crate::core::cancel::CancelToken;
use crate::core::probe::{probe, SeekMode};
use crate::core::retriever::seek_exact;
use crate::decoder::{Decoder, DecoderBackend};
use crate::error::VideoError;
use crate::frame::Frame;

/// Slack for accumulated floating point error at the end of the range
const END_EPSILON: f64 = 1e-9;

/// Progress report, sent after each collected (or attempted) sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractProgress {
    pub current: usize,
    pub total: usize,
    pub percent: f64,
}

impl ExtractProgress {
    fn new(current: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            current as f64 / total as f64 * 100.0
        };
        Self {
            current,
            total,
            percent,
        }
    }
}

/// One extracted sample
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    /// Position of the sample within the request, 0-based
    pub ordinal: usize,
    /// Requested time in seconds
    pub timestamp: f64,
    /// Decoded frame index, floor(timestamp * fps)
    pub frame_index: i64,
    pub frame: Frame,
}

/// Sample times `start, start + 1/rate, ...` up to and including `end`
pub fn sample_timestamps(start: f64, end: f64, rate: f64) -> Vec<f64> {
    if !(rate > 0.0) || !start.is_finite() || !end.is_finite() || end < start {
        return Vec::new();
    }
    (0..)
        .map(|i| start + i as f64 / rate)
        .take_while(|t| *t <= end + END_EPSILON)
        .collect()
}

pub struct FrameExtractor {
    backend: Arc<dyn DecoderBackend>,
    cancel: CancelToken,
}

impl FrameExtractor {
    pub fn new(backend: Arc<dyn DecoderBackend>) -> Self {
        Self {
            backend,
            cancel: CancelToken::new(),
        }
    }

    /// Token for cancelling from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop the running extraction after the current frame.
    ///
    /// Cancellation is sticky: later `extract` calls on this extractor return
    /// immediately with nothing collected.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Extract frames in `[start, end]` seconds at `rate` samples per second.
    ///
    /// Samples that fail to decode are skipped, so the result may be shorter
    /// than the number of timestamps. Returns early with the frames collected
    /// so far when cancelled.
    pub fn extract(
        &self,
        path: &Path,
        start: f64,
        end: f64,
        rate: f64,
        progress: Option<&Sender<ExtractProgress>>,
    ) -> Result<Vec<ExtractedFrame>, VideoError> {
        if !path.exists() {
            return Err(VideoError::NotFound(path.to_path_buf()));
        }

        let timestamps = sample_timestamps(start, end, rate);
        if timestamps.is_empty() {
            warn!(
                "Nothing to extract: start={}, end={}, rate={}",
                start, end, rate
            );
            return Ok(Vec::new());
        }

        let mut decoder = self.backend.open(path)?;
        let stream = decoder.info();
        let mode = probe(decoder.as_mut(), stream.fps);
        info!(
            "Extracting {} frames from {} ({:.3}s..{:.3}s @ {} fps, {:?} mode)",
            timestamps.len(),
            path.display(),
            start,
            end,
            rate,
            mode
        );

        let samples: Vec<(f64, i64)> = timestamps
            .into_iter()
            .map(|t| (t, (t * stream.fps).floor() as i64))
            .collect();

        let frames = match mode {
            SeekMode::Seek => self.extract_seeking(decoder.as_mut(), &samples, progress),
            SeekMode::Sequential => {
                decoder.close();
                let mut decoder = self.backend.open(path)?;
                let frames = self.extract_scanning(decoder.as_mut(), &samples, progress);
                decoder.close();
                frames
            }
        };
        decoder.close();

        info!("Extracted {}/{} frames", frames.len(), samples.len());
        Ok(frames)
    }

    fn extract_seeking(
        &self,
        decoder: &mut dyn Decoder,
        samples: &[(f64, i64)],
        progress: Option<&Sender<ExtractProgress>>,
    ) -> Vec<ExtractedFrame> {
        let mut frames = Vec::with_capacity(samples.len());
        for (ordinal, &(timestamp, frame_index)) in samples.iter().enumerate() {
            if self.cancel.is_cancelled() {
                debug!("Extraction cancelled at sample {}", ordinal);
                break;
            }

            if let Err(e) = seek_exact(decoder, frame_index) {
                debug!("Sample {} skipped: {}", ordinal, e);
                report(progress, ordinal + 1, samples.len());
                continue;
            }
            match read_rgb(decoder, frame_index) {
                Some(frame) => frames.push(ExtractedFrame {
                    ordinal,
                    timestamp,
                    frame_index,
                    frame,
                }),
                None => trace!("Sample {} (frame {}) skipped", ordinal, frame_index),
            }
            report(progress, ordinal + 1, samples.len());
        }
        frames
    }

    fn extract_scanning(
        &self,
        decoder: &mut dyn Decoder,
        samples: &[(f64, i64)],
        progress: Option<&Sender<ExtractProgress>>,
    ) -> Vec<ExtractedFrame> {
        // Several samples may land on one frame when rate exceeds fps
        let mut wanted: BTreeMap<i64, Vec<(usize, f64)>> = BTreeMap::new();
        for (ordinal, &(timestamp, frame_index)) in samples.iter().enumerate() {
            wanted
                .entry(frame_index)
                .or_default()
                .push((ordinal, timestamp));
        }
        let Some(&last_wanted) = wanted.keys().next_back() else {
            return Vec::new();
        };

        let mut frames = Vec::with_capacity(samples.len());
        let mut current: i64 = 0;
        while current <= last_wanted {
            if self.cancel.is_cancelled() {
                debug!("Extraction cancelled at frame {}", current);
                break;
            }

            let decoded = match decoder.read_next() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    debug!("End of stream at frame {}", current);
                    break;
                }
                Err(e) => {
                    debug!("Scan read failed at frame {}: {}", current, e);
                    current += 1;
                    continue;
                }
            };

            if let Some(targets) = wanted.get(&current) {
                match to_rgb_frame(decoded) {
                    Ok(frame) => {
                        for &(ordinal, timestamp) in targets {
                            frames.push(ExtractedFrame {
                                ordinal,
                                timestamp,
                                frame_index: current,
                                frame: frame.clone(),
                            });
                            report(progress, frames.len(), samples.len());
                        }
                    }
                    Err(e) => warn!("Frame {} conversion failed: {}", current, e),
                }
            }
            current += 1;
        }
        frames
    }

    /// Extract the single frame at `timestamp` seconds.
    ///
    /// Seeks directly; when the decoder loses its position the stream is
    /// reopened and scanned forward instead.
    pub fn extract_single(&self, path: &Path, timestamp: f64) -> Result<Option<Frame>, VideoError> {
        if !path.exists() {
            return Err(VideoError::NotFound(path.to_path_buf()));
        }
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Ok(None);
        }

        let mut decoder = self.backend.open(path)?;
        let fps = decoder.info().fps;
        let index = (timestamp * fps).floor() as i64;

        decoder.seek_to_frame(index);
        let frame = match decoder.position() {
            Some(pos) if pos == index => read_rgb(decoder.as_mut(), index),
            Some(pos) if pos < index => {
                skip(decoder.as_mut(), index - pos);
                read_rgb(decoder.as_mut(), index)
            }
            _ => {
                debug!("Seek to frame {} lost position, rescanning", index);
                decoder.close();
                decoder = self.backend.open(path)?;
                if skip(decoder.as_mut(), index) {
                    read_rgb(decoder.as_mut(), index)
                } else {
                    None
                }
            }
        };
        decoder.close();
        Ok(frame)
    }
}

fn read_rgb(decoder: &mut dyn Decoder, index: i64) -> Option<Frame> {
    match decoder.read_next() {
        Ok(Some(image)) => to_rgb_frame(image)
            .map_err(|e| warn!("Frame {} conversion failed: {}", index, e))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            debug!("Frame {} read failed: {}", index, e);
            None
        }
    }
}

/// Read and discard `count` frames. False on end of stream or error.
fn skip(decoder: &mut dyn Decoder, count: i64) -> bool {
    for _ in 0..count {
        match decoder.read_next() {
            Ok(Some(_)) => {}
            _ => return false,
        }
    }
    true
}

fn report(progress: Option<&Sender<ExtractProgress>>, current: usize, total: usize) {
    if let Some(tx) = progress {
        // Receiver may have gone away; extraction keeps going
        let _ = tx.send(ExtractProgress::new(current, total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{SeekBehavior, SyntheticBackend};
    use std::path::PathBuf;

    fn video_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml")
    }

    fn extractor(backend: &SyntheticBackend) -> FrameExtractor {
        FrameExtractor::new(Arc::new(backend.clone()))
    }

    #[test]
    fn test_sample_timestamps() {
        let ts = sample_timestamps(0.0, 1.0, 10.0);
        assert_eq!(ts.len(), 11);
        assert_eq!(ts[0], 0.0);
        assert!((ts[10] - 1.0).abs() < 1e-12);

        assert_eq!(sample_timestamps(2.0, 2.0, 5.0), vec![2.0]);
        assert!(sample_timestamps(3.0, 2.0, 5.0).is_empty());
        assert!(sample_timestamps(0.0, 2.0, 0.0).is_empty());
        assert!(sample_timestamps(0.0, 2.0, f64::NAN).is_empty());
    }

    #[test]
    fn test_extract_seek_mode() {
        let backend = SyntheticBackend::new(8, 4, 30.0, 300);
        let frames = extractor(&backend)
            .extract(&video_path(), 1.0, 2.0, 4.0, None)
            .unwrap();

        assert_eq!(frames.len(), 5);
        let indices: Vec<i64> = frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![30, 37, 45, 52, 60]);
        for f in &frames {
            assert_eq!(f.frame.data(), backend.expected_rgb(f.frame_index).as_slice());
        }
    }

    #[test]
    fn test_extract_seek_mode_with_keyframe_snapping() {
        let backend = SyntheticBackend::new(8, 4, 25.0, 250)
            .with_behavior(SeekBehavior::SnapToKeyframe { interval: 12 });
        let frames = extractor(&backend)
            .extract(&video_path(), 1.0, 2.0, 4.0, None)
            .unwrap();

        let indices: Vec<i64> = frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![25, 31, 37, 43, 50]);
        for f in &frames {
            assert_eq!(f.frame.data(), backend.expected_rgb(f.frame_index).as_slice());
        }
    }

    #[test]
    fn test_extract_sequential_mode_matches_seek_mode() {
        let seekable = SyntheticBackend::new(8, 4, 30.0, 300);
        let linear = SyntheticBackend::new(8, 4, 30.0, 300).with_behavior(SeekBehavior::Unsupported);

        let a = extractor(&seekable)
            .extract(&video_path(), 0.5, 3.0, 4.0, None)
            .unwrap();
        let b = extractor(&linear)
            .extract(&video_path(), 0.5, 3.0, 4.0, None)
            .unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.ordinal, y.ordinal);
            assert_eq!(x.frame_index, y.frame_index);
            assert_eq!(x.frame, y.frame);
        }
    }

    #[test]
    fn test_sequential_scan_stops_after_last_sample() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 10_000)
            .with_behavior(SeekBehavior::Unsupported);
        let counters = backend.counters();
        let frames = extractor(&backend)
            .extract(&video_path(), 0.0, 1.0, 2.0, None)
            .unwrap();
        assert_eq!(frames.len(), 3);
        // probe reads one frame, then the scan covers 0..=30
        assert!(counters.reads() <= 1 + 31);
    }

    #[test]
    fn test_rate_above_fps_duplicates_frames() {
        let backend = SyntheticBackend::new(4, 4, 10.0, 100)
            .with_behavior(SeekBehavior::Unsupported);
        let frames = extractor(&backend)
            .extract(&video_path(), 0.0, 0.2, 20.0, None)
            .unwrap();
        let indices: Vec<i64> = frames.iter().map(|f| f.frame_index).collect();
        assert_eq!(indices, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_extract_skips_corrupt_frames() {
        let backend = SyntheticBackend::new(4, 4, 10.0, 100).with_corrupt_frames([5]);
        let frames = extractor(&backend)
            .extract(&video_path(), 0.0, 1.0, 10.0, None)
            .unwrap();
        assert_eq!(frames.len(), 10);
        assert!(frames.iter().all(|f| f.frame_index != 5));
    }

    #[test]
    fn test_progress_reports() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 300);
        let (tx, rx) = crossbeam_channel::unbounded();
        extractor(&backend)
            .extract(&video_path(), 0.0, 1.0, 4.0, Some(&tx))
            .unwrap();
        let reports: Vec<ExtractProgress> = rx.try_iter().collect();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[0].current, 1);
        assert_eq!(reports[4], ExtractProgress::new(5, 5));
        assert_eq!(reports[4].percent, 100.0);
    }

    #[test]
    fn test_cancelled_extractor_collects_nothing() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 300);
        let ex = extractor(&backend);
        ex.cancel_token().cancel();
        assert!(ex.is_cancelled());
        let frames = ex.extract(&video_path(), 0.0, 5.0, 10.0, None).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_extract_missing_file() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 300);
        let err = extractor(&backend)
            .extract(Path::new("/no/such/video.mp4"), 0.0, 1.0, 1.0, None)
            .unwrap_err();
        assert!(matches!(err, VideoError::NotFound(_)));
    }

    #[test]
    fn test_extract_single() {
        for behavior in [
            SeekBehavior::Accurate,
            SeekBehavior::SnapToKeyframe { interval: 12 },
            SeekBehavior::Unsupported,
        ] {
            let backend = SyntheticBackend::new(6, 6, 25.0, 250).with_behavior(behavior);
            let frame = extractor(&backend)
                .extract_single(&video_path(), 2.0)
                .unwrap()
                .unwrap();
            assert_eq!(frame.data(), backend.expected_rgb(50).as_slice(), "{:?}", behavior);
        }
    }

    #[test]
    fn test_extract_single_past_end() {
        let backend = SyntheticBackend::new(4, 4, 10.0, 20).with_behavior(SeekBehavior::Unsupported);
        let frame = extractor(&backend)
            .extract_single(&video_path(), 100.0)
            .unwrap();
        assert!(frame.is_none());
    }
}

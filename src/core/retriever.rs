//! Frame retrieval on top of one decoder handle
//!
//! **Why**: The decoder handle has a single mutable read cursor. A seek from
//! one thread moves the cursor out from under another thread's read, so the
//! whole unit "cache lookup, decode, cache insert" runs under one lock.
//! [`Session`] bundles everything that lock protects:
//!
//! - the decoder handle
//! - the LRU frame cache
//! - the preload queue
//! - the last-accessed cursor used by sequential mode
//!
//! **Used by**: VideoProcessor (foreground requests), Preloader (background).
//!
//! # Strategies
//!
//! Seek mode: `seek_to_frame(n)` + `read_next()`.
//!
//! Sequential mode, tried in order:
//! 1. contiguous request (`n == last + 1`, handle already there): plain read
//! 2. timestamp seek; if the reported position is valid and not past `n`,
//!    read forward to `n`
//! 3. reopen the stream and consume `n` frames linearly (rare escape hatch)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace, warn};

use super::cache::FrameCache;
use super::probe::SeekMode;
use crate::convert::to_rgb_frame;
use crate::decoder::{Decoder, DecoderBackend};
use crate::error::VideoError;
use crate::frame::Frame;
use crate::media::VideoInfo;

/// Session shared between the foreground caller and the preloader
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a session, recovering from a poisoned mutex
pub fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything guarded by the single session lock
pub struct Session {
    backend: Arc<dyn DecoderBackend>,
    info: Arc<VideoInfo>,
    mode: SeekMode,
    decoder: Option<Box<dyn Decoder>>,
    cache: FrameCache,
    queue: VecDeque<i64>,
    last_accessed: i64,
    reopens: u64,
}

impl Session {
    pub fn new(
        backend: Arc<dyn DecoderBackend>,
        info: Arc<VideoInfo>,
        mode: SeekMode,
        decoder: Box<dyn Decoder>,
        cache: FrameCache,
    ) -> Self {
        Self {
            backend,
            info,
            mode,
            decoder: Some(decoder),
            cache,
            queue: VecDeque::new(),
            last_accessed: -1,
            reopens: 0,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn info(&self) -> &Arc<VideoInfo> {
        &self.info
    }

    pub fn mode(&self) -> SeekMode {
        self.mode
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn is_cached(&self, index: i64) -> bool {
        self.cache.contains(index)
    }

    pub fn last_accessed(&self) -> i64 {
        self.last_accessed
    }

    /// How many times the reopen fallback ran
    pub fn reopens(&self) -> u64 {
        self.reopens
    }

    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    /// Return frame `index`, decoding and caching it on a miss.
    ///
    /// Out-of-range indices return None without touching the cache. Decode
    /// failures are logged and reported as None.
    pub fn retrieve(&mut self, index: i64) -> Option<Frame> {
        if !self.info.contains(index) {
            let err = VideoError::OutOfRange {
                index,
                frame_count: self.info.frame_count,
            };
            trace!("{}", err);
            return None;
        }

        if let Some(frame) = self.cache.get(index) {
            return Some(frame);
        }

        let result = match self.mode {
            SeekMode::Seek => self.decode_seek(index),
            SeekMode::Sequential => self.decode_sequential(index),
        };

        match result {
            Ok(frame) => {
                self.last_accessed = index;
                self.cache.put(index, frame.clone());
                Some(frame)
            }
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    fn handle(&mut self, index: i64) -> Result<&mut Box<dyn Decoder>, VideoError> {
        self.decoder
            .as_mut()
            .ok_or_else(|| VideoError::decode(index, "decoder released"))
    }

    fn decode_seek(&mut self, index: i64) -> Result<Frame, VideoError> {
        let decoder = self.handle(index)?;
        seek_exact(decoder.as_mut(), index)?;
        read_frame(decoder.as_mut(), index)
    }

    fn decode_sequential(&mut self, index: i64) -> Result<Frame, VideoError> {
        let contiguous = index == self.last_accessed + 1;
        let fps = self.info.fps;
        let decoder = self.handle(index)?;

        // Tier 1: linear playback, handle is already positioned
        if contiguous && decoder.position().is_none_or(|pos| pos == index) {
            trace!("Sequential read of frame {}", index);
            return read_frame(decoder.as_mut(), index);
        }

        // Tier 2: best-effort timestamp seek
        if fps > 0.0 {
            let msec = index as f64 / fps * 1000.0;
            decoder.seek_to_msec(msec);
            match decoder.position() {
                Some(pos) if pos <= index => {
                    debug!("Timestamp seek for frame {} landed on {}", index, pos);
                    skip_frames(decoder.as_mut(), index - pos, index)?;
                    return read_frame(decoder.as_mut(), index);
                }
                reported => {
                    warn!(
                        "Timestamp seek for frame {} reported {:?}, reopening stream",
                        index, reported
                    );
                }
            }
        }

        // Tier 3
        self.reopen_and_scan(index)
    }

    /// Close and reopen the stream, then consume `index` frames.
    /// O(index): the correctness fallback for handles that cannot seek.
    fn reopen_and_scan(&mut self, index: i64) -> Result<Frame, VideoError> {
        if let Some(mut old) = self.decoder.take() {
            old.close();
        }
        let mut decoder = self.backend.open(&self.info.path)?;
        self.reopens += 1;
        debug!("Reopened {} to scan to frame {}", self.info.path.display(), index);

        let result = skip_frames(decoder.as_mut(), index, index)
            .and_then(|_| read_frame(decoder.as_mut(), index));
        self.decoder = Some(decoder);
        result
    }

    /// Replace the preload queue with `[start, end]` clamped to the video
    pub fn replace_queue(&mut self, start: i64, end: i64) {
        self.queue.clear();
        let last = self.info.frame_count - 1;
        if last < 0 {
            return;
        }
        let start = start.clamp(0, last);
        let end = end.clamp(0, last);
        self.queue.extend(start..=end);
        debug!("Preload queue replaced: [{}..={}] ({} frames)", start, end, self.queue.len());
    }

    /// Pop up to `n` indices from the front of the preload queue
    pub fn pop_batch(&mut self, n: usize) -> Vec<i64> {
        let n = n.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    pub fn queued(&self) -> Vec<i64> {
        self.queue.iter().copied().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Close the decoder and drop all cached state
    pub fn close(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        self.cache.clear();
        self.queue.clear();
        self.last_accessed = -1;
    }
}

/// Seek so the next read returns frame `index`.
///
/// A landing short of the target (keyframe snap) is closed by reading forward.
/// A rejected seek, an overshoot or an unknown position is a decode failure:
/// reading there would return some other frame.
pub(crate) fn seek_exact(decoder: &mut dyn Decoder, index: i64) -> Result<(), VideoError> {
    if !decoder.seek_to_frame(index) {
        return Err(VideoError::decode(index, "seek rejected"));
    }
    match decoder.position() {
        Some(pos) if pos == index => Ok(()),
        Some(pos) if pos < index => {
            trace!("Seek for frame {} landed on {}, reading forward", index, pos);
            skip_frames(decoder, index - pos, index)
        }
        Some(pos) => Err(VideoError::decode(index, format!("seek overshot to {}", pos))),
        None => Err(VideoError::decode(index, "position unknown after seek")),
    }
}

fn read_frame(decoder: &mut dyn Decoder, index: i64) -> Result<Frame, VideoError> {
    let image = decoder
        .read_next()
        .map_err(|e| match e {
            VideoError::DecodeFailure { reason, .. } => VideoError::decode(index, reason),
            other => other,
        })?
        .ok_or_else(|| VideoError::decode(index, "end of stream"))?;
    to_rgb_frame(image).map_err(|e| VideoError::decode(index, e.to_string()))
}

fn skip_frames(decoder: &mut dyn Decoder, count: i64, target: i64) -> Result<(), VideoError> {
    for _ in 0..count {
        match decoder.read_next() {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(VideoError::decode(target, "end of stream while skipping"));
            }
            // A bad frame on the way still counts as consumed
            Err(e) => trace!("Skipped unreadable frame: {}", e),
        }
    }
    Ok(())
}

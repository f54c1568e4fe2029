//! Video processor - public frame access API
//!
//! **Why**: The editor needs frame-accurate random access for scrubbing and
//! looped playback. One processor owns at most one loaded video: its
//! metadata, seek mode, cache policy, shared session and preloader. All of
//! it is created by `load_video` and torn down together by `release`.
//!
//! **Used by**: UI preview (foreground `get_frame_*`), playback loop
//! (`preload_range` ahead of the playhead), CLI.
//!
//! # Errors
//!
//! Only `load_video` fails. Frame accessors return `None` for out-of-range
//! indices and for frames that fail to decode, so playback continues past
//! bad frames.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use super::cache::{CacheStats, FrameCache};
use super::policy::CachePolicy;
use super::preloader::{PreloadState, Preloader};
use super::probe::{probe, SeekMode};
use super::retriever::{lock_session, Session, SharedSession};
use crate::config::{CacheSettings, PreloadSettings};
use crate::decoder::DecoderBackend;
use crate::error::VideoError;
use crate::frame::Frame;
use crate::media::VideoInfo;

struct LoadedVideo {
    info: Arc<VideoInfo>,
    mode: SeekMode,
    policy: CachePolicy,
    session: SharedSession,
    preloader: Preloader,
    stats: Arc<CacheStats>,
}

pub struct VideoProcessor {
    backend: Arc<dyn DecoderBackend>,
    cache_settings: CacheSettings,
    preload_settings: PreloadSettings,
    loaded: Option<LoadedVideo>,
}

impl VideoProcessor {
    /// Processor with default cache and preload settings
    pub fn new(backend: Arc<dyn DecoderBackend>) -> Self {
        Self::with_settings(backend, CacheSettings::default(), PreloadSettings::default())
    }

    pub fn with_settings(
        backend: Arc<dyn DecoderBackend>,
        cache_settings: CacheSettings,
        preload_settings: PreloadSettings,
    ) -> Self {
        Self {
            backend,
            cache_settings,
            preload_settings,
            loaded: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn DecoderBackend> {
        &self.backend
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn video_info(&self) -> Option<Arc<VideoInfo>> {
        self.loaded.as_ref().map(|l| Arc::clone(&l.info))
    }

    pub fn seek_mode(&self) -> Option<SeekMode> {
        self.loaded.as_ref().map(|l| l.mode)
    }

    pub fn policy(&self) -> Option<CachePolicy> {
        self.loaded.as_ref().map(|l| l.policy)
    }

    /// Hit/miss counters of the current video
    pub fn stats(&self) -> Option<Arc<CacheStats>> {
        self.loaded.as_ref().map(|l| Arc::clone(&l.stats))
    }

    pub fn cache_len(&self) -> usize {
        self.loaded
            .as_ref()
            .map(|l| lock_session(&l.session).cache().len())
            .unwrap_or(0)
    }

    pub fn is_cached(&self, index: i64) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|l| lock_session(&l.session).is_cached(index))
    }

    /// Indices waiting in the preload queue, front first
    pub fn queued_frames(&self) -> Vec<i64> {
        self.loaded
            .as_ref()
            .map(|l| lock_session(&l.session).queued())
            .unwrap_or_default()
    }

    /// Open `path`, replacing any previously loaded video.
    ///
    /// Runs the seek probe and derives the cache policy. When the probe selects
    /// sequential mode the stream is reopened so the handle starts clean.
    pub fn load_video(&mut self, path: impl AsRef<Path>) -> Result<Arc<VideoInfo>, VideoError> {
        self.release();

        let path = path.as_ref();
        if !path.exists() {
            return Err(VideoError::NotFound(path.to_path_buf()));
        }

        let mut decoder = self.backend.open(path)?;
        let stream = decoder.info();
        let info = Arc::new(VideoInfo::new(
            path.to_path_buf(),
            stream.width,
            stream.height,
            stream.fps,
            stream.frame_count,
            stream.codec,
        ));

        let mode = probe(decoder.as_mut(), info.fps);
        if mode == SeekMode::Sequential {
            decoder.close();
            decoder = self.backend.open(path)?;
        }

        let policy = CachePolicy::derive(info.width, info.height, info.fps, &self.cache_settings);
        let stats = Arc::new(CacheStats::new());
        let cache = FrameCache::new(policy.capacity, Arc::clone(&stats));
        let session = Session::new(
            Arc::clone(&self.backend),
            Arc::clone(&info),
            mode,
            decoder,
            cache,
        )
        .into_shared();
        let preloader = Preloader::new(
            Arc::clone(&session),
            policy.prefetch_batch,
            self.preload_settings.clone(),
        );

        info!(
            "Loaded {} ({}, {:.3} fps, {} frames, {}, codec {}) via {}: {:?} mode",
            info.path.display(),
            info.resolution(),
            info.fps,
            info.frame_count,
            info.format_duration(),
            info.codec,
            self.backend.name(),
            mode
        );

        self.loaded = Some(LoadedVideo {
            info: Arc::clone(&info),
            mode,
            policy,
            session,
            preloader,
            stats,
        });
        Ok(info)
    }

    /// Frame shown at `timestamp` seconds (index floor(timestamp * fps))
    pub fn get_frame_at(&self, timestamp: f64) -> Option<Frame> {
        let loaded = self.loaded.as_ref()?;
        if !timestamp.is_finite() {
            return None;
        }
        self.get_frame_by_index(loaded.info.frame_index_at(timestamp))
    }

    /// Frame `index`, None if out of range or undecodable
    pub fn get_frame_by_index(&self, index: i64) -> Option<Frame> {
        let loaded = self.loaded.as_ref()?;
        if !loaded.info.contains(index) {
            return None;
        }
        lock_session(&loaded.session).retrieve(index)
    }

    /// Replace the preload queue with `[start, end]`, clamped to the video
    pub fn preload_range(&self, start: i64, end: i64) {
        if let Some(loaded) = &self.loaded {
            lock_session(&loaded.session).replace_queue(start, end);
        }
    }

    pub fn start_preload(&mut self) {
        if let Some(loaded) = &mut self.loaded {
            loaded.preloader.start();
        }
    }

    /// Stop the preloader. False if the join timed out and the thread was detached.
    pub fn stop_preload(&mut self) -> bool {
        match &mut self.loaded {
            Some(loaded) => loaded.preloader.stop(),
            None => true,
        }
    }

    pub fn preload_state(&self) -> PreloadState {
        self.loaded
            .as_ref()
            .map(|l| l.preloader.state())
            .unwrap_or(PreloadState::Idle)
    }

    /// Stop the preloader, close the decoder and drop all cached state
    pub fn release(&mut self) {
        let Some(mut loaded) = self.loaded.take() else {
            return;
        };
        loaded.preloader.stop();
        lock_session(&loaded.session).close();
        debug!(
            "Released {} (hits={}, misses={})",
            loaded.info.path.display(),
            loaded.stats.hits(),
            loaded.stats.misses()
        );
    }
}

impl Drop for VideoProcessor {
    fn drop(&mut self) {
        self.release();
    }
}

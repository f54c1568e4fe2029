//! Background preloader
//!
//! Drains the session's preload queue on a dedicated thread, decoding frames
//! into the cache ahead of playback. Every decode goes through
//! `Session::retrieve` under the session lock, so it never overlaps a
//! foreground decode; the lock is released between frames so the UI thread
//! can interleave its own requests.
//!
//! # States
//!
//! `Idle` -> `start()` -> `Running` -> `stop()` -> `Stopping` -> `Idle`
//!
//! `stop()` waits up to the configured join timeout. If the thread is stuck
//! in a slow decode, it is left detached; it observes the cancel token and
//! exits on its own.
//!
//! # Cancellation latency
//!
//! The loop polls its token before every frame and during every sleep, so
//! shutdown takes at most one decode plus one poll slice, independent of the
//! queue length.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};

use super::cancel::CancelToken;
use super::retriever::{lock_session, SharedSession};
use crate::config::PreloadSettings;

/// Longest uninterrupted sleep inside the loop
const POLL_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadState {
    Idle,
    Running,
    Stopping,
}

pub struct Preloader {
    session: SharedSession,
    batch: usize,
    settings: PreloadSettings,
    state: PreloadState,
    handle: Option<thread::JoinHandle<()>>,
    cancel: Option<CancelToken>,
    decoded: Arc<AtomicU64>,
}

impl Preloader {
    /// Create an idle preloader for `session` that materializes `batch` frames per wake cycle
    pub fn new(session: SharedSession, batch: usize, settings: PreloadSettings) -> Self {
        Self {
            session,
            batch: batch.max(1),
            settings,
            state: PreloadState::Idle,
            handle: None,
            cancel: None,
            decoded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> PreloadState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PreloadState::Running
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Frames decoded by the background thread so far
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Spawn the background thread. No-op if already running.
    pub fn start(&mut self) {
        if self.state == PreloadState::Running {
            return;
        }

        let cancel = CancelToken::new();
        let task = PreloadTask {
            session: Arc::clone(&self.session),
            cancel: cancel.clone(),
            batch: self.batch,
            batch_pause: self.settings.batch_pause(),
            idle_sleep: self.settings.idle_sleep(),
            decoded: Arc::clone(&self.decoded),
        };

        match thread::Builder::new()
            .name("framescrub-preload".to_string())
            .spawn(move || task.run())
        {
            Ok(handle) => {
                self.handle = Some(handle);
                self.cancel = Some(cancel);
                self.state = PreloadState::Running;
                debug!("Preloader started (batch={})", self.batch);
            }
            Err(e) => error!("Failed to spawn preload thread: {}", e),
        }
    }

    /// Signal cancellation and wait up to the join timeout.
    ///
    /// Returns false if the thread had to be left detached. Safe to call
    /// repeatedly and when nothing is running.
    pub fn stop(&mut self) -> bool {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        let Some(handle) = self.handle.take() else {
            self.state = PreloadState::Idle;
            return true;
        };

        self.state = PreloadState::Stopping;
        let deadline = Instant::now() + self.settings.join_timeout();

        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Preloader did not stop within {} ms, leaving it detached",
                    self.settings.join_timeout_ms
                );
                self.state = PreloadState::Idle;
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }

        if handle.join().is_err() {
            error!("Preload thread panicked");
        }
        self.state = PreloadState::Idle;
        debug!("Preloader stopped");
        true
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PreloadTask {
    session: SharedSession,
    cancel: CancelToken,
    batch: usize,
    batch_pause: Duration,
    idle_sleep: Duration,
    decoded: Arc<AtomicU64>,
}

impl PreloadTask {
    fn run(self) {
        trace!("Preload thread running");
        while !self.cancel.is_cancelled() {
            let batch = lock_session(&self.session).pop_batch(self.batch);
            if batch.is_empty() {
                self.pause(self.idle_sleep);
                continue;
            }

            for index in batch {
                if self.cancel.is_cancelled() {
                    break;
                }
                // Lock per frame so foreground requests interleave
                let mut session = lock_session(&self.session);
                if session.is_cached(index) {
                    continue;
                }
                if session.retrieve(index).is_some() {
                    self.decoded.fetch_add(1, Ordering::Relaxed);
                } else {
                    trace!("Preload skipped frame {}", index);
                }
            }

            self.pause(self.batch_pause);
        }
        trace!("Preload thread exiting");
    }

    /// Sleep up to `duration`, returning early on cancellation
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(POLL_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CacheStats, FrameCache};
    use crate::core::probe::SeekMode;
    use crate::core::retriever::Session;
    use crate::decoder::{DecoderBackend, SyntheticBackend};
    use crate::media::VideoInfo;
    use std::path::PathBuf;

    fn shared(backend: &SyntheticBackend, frames: i64, capacity: usize) -> SharedSession {
        let path = PathBuf::from("preload.mp4");
        let decoder = backend.open(&path).unwrap();
        let info = Arc::new(VideoInfo::new(path, 4, 4, 30.0, frames, "syn0"));
        Session::new(
            Arc::new(backend.clone()),
            info,
            SeekMode::Seek,
            decoder,
            FrameCache::new(capacity, Arc::new(CacheStats::new())),
        )
        .into_shared()
    }

    fn fast_settings() -> PreloadSettings {
        PreloadSettings {
            batch_pause_ms: 1,
            idle_sleep_ms: 5,
            join_timeout_ms: 500,
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 10);
        let mut preloader = Preloader::new(shared(&backend, 10, 10), 5, fast_settings());
        assert!(preloader.stop());
        assert!(preloader.stop());
        assert_eq!(preloader.state(), PreloadState::Idle);
    }

    #[test]
    fn test_start_is_idempotent() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 10);
        let mut preloader = Preloader::new(shared(&backend, 10, 10), 5, fast_settings());
        preloader.start();
        preloader.start();
        assert!(preloader.is_running());
        assert!(preloader.stop());
        assert_eq!(preloader.state(), PreloadState::Idle);
        assert!(preloader.stop());
    }

    #[test]
    fn test_fills_cache_from_queue() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 100);
        let session = shared(&backend, 100, 100);
        lock_session(&session).replace_queue(20, 59);

        let mut preloader = Preloader::new(Arc::clone(&session), 8, fast_settings());
        preloader.start();
        let done = wait_until(Duration::from_secs(5), || {
            let s = lock_session(&session);
            (20..60).all(|i| s.is_cached(i))
        });
        preloader.stop();

        assert!(done);
        assert_eq!(lock_session(&session).queue_len(), 0);
        assert_eq!(preloader.decoded(), 40);
        assert!(!lock_session(&session).is_cached(19));
    }

    #[test]
    fn test_skips_cached_frames() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 50);
        let session = shared(&backend, 50, 50);
        {
            let mut s = lock_session(&session);
            for i in 0..10 {
                s.retrieve(i);
            }
            s.replace_queue(0, 19);
        }
        let mut preloader = Preloader::new(Arc::clone(&session), 4, fast_settings());
        preloader.start();
        let done = wait_until(Duration::from_secs(5), || {
            let s = lock_session(&session);
            s.queue_len() == 0 && (0..20).all(|i| s.is_cached(i))
        });
        preloader.stop();
        assert!(done);
        assert_eq!(preloader.decoded(), 10);
    }

    #[test]
    fn test_stop_bounded_by_timeout_with_long_queue() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 100_000)
            .with_decode_delay(Duration::from_millis(2));
        let session = shared(&backend, 100_000, 50);
        lock_session(&session).replace_queue(0, 99_999);

        let mut preloader = Preloader::new(Arc::clone(&session), 50, fast_settings());
        preloader.start();
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        preloader.stop();
        let elapsed = started.elapsed();

        assert!(elapsed < fast_settings().join_timeout() + Duration::from_millis(100));
        assert!(lock_session(&session).queue_len() > 0);
    }

    #[test]
    fn test_restart_after_stop() {
        let backend = SyntheticBackend::new(4, 4, 30.0, 40);
        let session = shared(&backend, 40, 40);
        let mut preloader = Preloader::new(Arc::clone(&session), 4, fast_settings());
        preloader.start();
        preloader.stop();

        lock_session(&session).replace_queue(0, 9);
        preloader.start();
        let done = wait_until(Duration::from_secs(5), || {
            let s = lock_session(&session);
            (0..10).all(|i| s.is_cached(i))
        });
        preloader.stop();
        assert!(done);
    }
}

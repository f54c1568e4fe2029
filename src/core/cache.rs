//! Bounded LRU frame cache
//!
//! Structure: IndexMap<i64, Frame>
//! - Insertion order doubles as recency order: front = least recently touched
//! - O(1) lookup by frame index
//! - Hit promotes the entry to the back, eviction pops the front
//!
//! The cache itself is not locked. It lives inside the engine session, whose
//! single mutex also covers the decoder handle and the preload queue, so
//! lookup, decode and insert happen as one unit.
//!
//! Invariant: `len() <= capacity()` after every mutating call returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::frame::Frame;

/// Cache statistics, readable without the session lock
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// LRU map from frame index to decoded frame
#[derive(Debug)]
pub struct FrameCache {
    frames: IndexMap<i64, Frame>,
    capacity: usize,
    stats: Arc<CacheStats>,
}

impl FrameCache {
    /// Create cache holding at most `capacity` frames (at least 1)
    pub fn new(capacity: usize, stats: Arc<CacheStats>) -> Self {
        let capacity = capacity.max(1);
        debug!("FrameCache created: capacity={}", capacity);
        Self {
            frames: IndexMap::with_capacity(capacity),
            capacity,
            stats,
        }
    }

    /// Get frame and mark it most recently used
    pub fn get(&mut self, frame_idx: i64) -> Option<Frame> {
        match self.frames.shift_remove(&frame_idx) {
            Some(frame) => {
                self.stats.record_hit();
                // Re-insert at the back (most recent)
                self.frames.insert(frame_idx, frame.clone());
                trace!("Cache hit: {}", frame_idx);
                Some(frame)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Check presence without touching recency or stats
    pub fn contains(&self, frame_idx: i64) -> bool {
        self.frames.contains_key(&frame_idx)
    }

    /// Insert or replace, then evict from the front while over capacity
    pub fn put(&mut self, frame_idx: i64, frame: Frame) {
        self.frames.shift_remove(&frame_idx);
        self.frames.insert(frame_idx, frame);
        self.evict_to(self.capacity);
        trace!("Cached frame {} ({} / {})", frame_idx, self.frames.len(), self.capacity);
    }

    fn evict_to(&mut self, limit: usize) {
        while self.frames.len() > limit {
            let Some((idx, evicted)) = self.frames.shift_remove_index(0) else {
                break;
            };
            self.stats.record_eviction();
            trace!("LRU evicted frame {} ({} bytes)", idx, evicted.mem());
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total pixel bytes held
    pub fn mem(&self) -> usize {
        self.frames.values().map(Frame::mem).sum()
    }

    /// Cached indices, least recently used first
    pub fn keys(&self) -> Vec<i64> {
        self.frames.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        let count = self.frames.len();
        self.frames.clear();
        if count > 0 {
            debug!("Cleared frame cache: {} frames", count);
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8) -> Frame {
        Frame::from_rgb24(vec![value; 4 * 4 * 3], 4, 4).unwrap()
    }

    fn cache(capacity: usize) -> FrameCache {
        FrameCache::new(capacity, Arc::new(CacheStats::new()))
    }

    #[test]
    fn test_cache_basic_operations() {
        let mut cache = cache(10);
        cache.put(0, frame(1));
        assert!(cache.contains(0));
        assert_eq!(cache.get(0).unwrap(), frame(1));
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.mem(), 48);
    }

    #[test]
    fn test_capacity_invariant_holds_after_every_put() {
        let mut cache = cache(7);
        for i in 0..100 {
            cache.put(i % 23, frame(i as u8));
            assert!(cache.len() <= 7);
        }
        assert_eq!(cache.len(), 7);
    }

    #[test]
    fn test_overflow_evicts_first_inserted() {
        let k = 5;
        let mut cache = cache(k);
        for i in 0..=k as i64 {
            cache.put(i, frame(i as u8));
        }
        assert!(!cache.contains(0));
        for i in 1..=k as i64 {
            assert!(cache.contains(i));
        }
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn test_get_protects_entry_from_eviction() {
        let k = 5;
        let mut cache = cache(k);
        for i in 0..k as i64 {
            cache.put(i, frame(i as u8));
        }
        assert!(cache.get(0).is_some());
        cache.put(k as i64, frame(99));
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let mut cache = cache(3);
        cache.put(1, frame(1));
        cache.put(2, frame(2));
        cache.put(1, frame(9));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys(), vec![2, 1]);
        assert_eq!(cache.get(1).unwrap(), frame(9));
    }

    #[test]
    fn test_contains_does_not_promote() {
        let mut cache = cache(2);
        cache.put(1, frame(1));
        cache.put(2, frame(2));
        assert!(cache.contains(1));
        cache.put(3, frame(3));
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_cache_statistics() {
        let mut cache = cache(10);
        let stats = cache.stats();
        cache.put(0, frame(0));
        let _ = cache.get(0);
        let _ = cache.get(999);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hit_rate(), 0.5);
        stats.reset();
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = cache(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(0, frame(0));
        cache.put(1, frame(1));
        assert_eq!(cache.keys(), vec![1]);
    }
}

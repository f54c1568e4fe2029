//! Adaptive cache policy
//!
//! Derives cache capacity and preload batch size from resolution and frame
//! rate. High-resolution frames are expensive to hold, so their window
//! shrinks; low-resolution video gets a much larger window for smooth
//! scrubbing.
//!
//! | Tier   | Pixels              | Capacity                | Batch                 |
//! |--------|---------------------|-------------------------|-----------------------|
//! | High   | > 1920x1080         | max(min_cap, base/2)    | min(max_batch, 20)    |
//! | Medium | >= 1280x720         | base                    | base_batch            |
//! | Low    | otherwise           | min(max_cap, base*2)    | min(max_batch, 40)    |
//!
//! Then: fps > 60 adds 10 to the batch (capped at max_batch), fps < 24
//! removes 10 (floored at min_batch).

use log::info;

use crate::config::CacheSettings;

const HIGH_PIXELS: usize = 1920 * 1080;
const MEDIUM_PIXELS: usize = 1280 * 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    High,
    Medium,
    Low,
}

impl ResolutionTier {
    pub fn classify(width: usize, height: usize) -> Self {
        let pixels = width * height;
        if pixels > HIGH_PIXELS {
            ResolutionTier::High
        } else if pixels >= MEDIUM_PIXELS {
            ResolutionTier::Medium
        } else {
            ResolutionTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub tier: ResolutionTier,
    pub capacity: usize,
    pub prefetch_batch: usize,
}

impl CachePolicy {
    pub fn derive(width: usize, height: usize, fps: f64, settings: &CacheSettings) -> Self {
        let tier = ResolutionTier::classify(width, height);
        let base = settings.base_capacity;

        let (capacity, mut batch) = match tier {
            ResolutionTier::High => (
                settings.min_capacity.max(base / 2),
                settings.max_batch.min(20),
            ),
            ResolutionTier::Medium => (base, settings.base_batch),
            ResolutionTier::Low => (
                settings.max_capacity.min(base * 2),
                settings.max_batch.min(40),
            ),
        };

        if fps > 60.0 {
            batch = settings.max_batch.min(batch + 10);
        } else if fps < 24.0 {
            batch = settings.min_batch.max(batch.saturating_sub(10));
        }

        let policy = Self {
            tier,
            capacity: capacity.max(1),
            prefetch_batch: batch.max(1),
        };
        info!(
            "Cache policy for {}x{} @ {:.2} fps: {:?}, capacity={}, batch={}",
            width, height, fps, policy.tier, policy.capacity, policy.prefetch_batch
        );
        policy
    }
}

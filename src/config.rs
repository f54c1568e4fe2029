//! Persistent settings
//!
//! Stored as pretty JSON (default `framescrub.json` in the config dir, see
//! `paths`). Unknown or missing fields fall back to defaults so old files keep
//! loading.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inputs of the adaptive cache policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub base_capacity: usize,
    /// Floor for high-resolution content
    pub min_capacity: usize,
    /// Ceiling for low-resolution content
    pub max_capacity: usize,
    pub base_batch: usize,
    pub min_batch: usize,
    pub max_batch: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            base_capacity: 200,
            min_capacity: 100,
            max_capacity: 500,
            base_batch: 30,
            min_batch: 10,
            max_batch: 50,
        }
    }
}

/// Background preloader timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSettings {
    /// Pause between batches
    pub batch_pause_ms: u64,
    /// Sleep when the queue is empty
    pub idle_sleep_ms: u64,
    /// How long `stop_preload` waits for the thread
    pub join_timeout_ms: u64,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            batch_pause_ms: 10,
            idle_sleep_ms: 50,
            join_timeout_ms: 1000,
        }
    }
}

impl PreloadSettings {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub preload: PreloadSettings,
    /// Default sampling rate for frame extraction (frames per second)
    pub extract_fps: f64,
    pub last_video_dir: Option<PathBuf>,
    pub last_export_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            preload: PreloadSettings::default(),
            extract_fps: 10.0,
            last_video_dir: None,
            last_export_dir: None,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults if the file is missing or invalid
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::read(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("framescrub-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.cache.base_capacity, 200);
        assert_eq!(s.cache.max_batch, 50);
        assert_eq!(s.preload.join_timeout(), Duration::from_secs(1));
        assert_eq!(s.extract_fps, 10.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{ "cache": { "base_capacity": 64 } }"#).unwrap();
        assert_eq!(s.cache.base_capacity, 64);
        assert_eq!(s.cache.base_batch, 30);
        assert_eq!(s.preload, PreloadSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut s = Settings::default();
        s.extract_fps = 12.5;
        s.last_video_dir = Some(PathBuf::from("/videos"));
        s.last_export_dir = Some(PathBuf::from("/exports"));
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path), s);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let path = temp_path("invalid");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
        let _ = std::fs::remove_file(&path);
        assert_eq!(Settings::load(&path), Settings::default());
    }
}

//! Config and data directory resolution
//!
//! Priority for both directories:
//! 1. `--config-dir` on the command line
//! 2. `FRAMESCRUB_CONFIG_DIR` environment variable
//! 3. current directory, if it already holds framescrub files
//! 4. platform directories from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/framescrub, ~/.local/share/framescrub
//! - macOS: ~/Library/Application Support/framescrub
//! - Windows: %APPDATA%\framescrub

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "framescrub";
pub const ENV_CONFIG_DIR: &str = "FRAMESCRUB_CONFIG_DIR";
pub const SETTINGS_FILE: &str = "framescrub.json";
pub const LOG_FILE: &str = "framescrub.log";

#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Override for both config and data directories
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// CLI value wins over the environment
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(dirs_next::data_dir())
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_file(SETTINGS_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_file(LOG_FILE)
    }

    /// Create config and data directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        let config_dir = self.config_dir();
        let data_dir = self.data_dir();

        std::fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        if data_dir != config_dir {
            std::fs::create_dir_all(&data_dir).with_context(|| {
                format!("Failed to create data directory: {}", data_dir.display())
            })?;
        }
        Ok(())
    }

    fn resolve(&self, platform: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(cwd) = std::env::current_dir() {
            if has_local_files(&cwd) {
                return cwd;
            }
        }
        platform
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

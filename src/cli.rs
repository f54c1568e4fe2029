use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::decoder::SyntheticBackend;

#[cfg(feature = "ffmpeg")]
const VIDEO_BACKEND: &str = "playa-ffmpeg 8.0 (static)";
#[cfg(not(feature = "ffmpeg"))]
const VIDEO_BACKEND: &str = "synthetic only (build with --features ffmpeg)";

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Video:  ", VIDEO_BACKEND, "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Frame-accurate video access: inspect, grab, extract and scrub
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Enable debug logging to file (default: framescrub.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Generated test stream WxH@FPS:FRAMES[:seek|snapN|none] (FILE must exist, contents ignored)
    #[arg(long = "synthetic", value_name = "STREAM", global = true)]
    pub synthetic: Option<SyntheticBackend>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print stream metadata, seek mode and cache policy
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write one frame to an image file
    Grab {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Frame index (0-based)
        #[arg(long = "frame", value_name = "N", conflicts_with = "time", required_unless_present = "time")]
        frame: Option<i64>,

        /// Timestamp in seconds
        #[arg(long = "time", value_name = "SECONDS")]
        time: Option<f64>,

        /// Output image (format from extension)
        #[arg(short = 'o', long = "output", value_name = "OUT")]
        output: PathBuf,
    },

    /// Extract frames in a time range to PNG files
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Range start in seconds
        #[arg(long = "start", value_name = "SECONDS", default_value = "0")]
        start: f64,

        /// Range end in seconds (default: end of video)
        #[arg(long = "end", value_name = "SECONDS")]
        end: Option<f64>,

        /// Samples per second (default: from settings)
        #[arg(long = "fps", value_name = "RATE")]
        fps: Option<f64>,

        /// Output directory
        #[arg(short = 'o', long = "output", value_name = "DIR")]
        output: PathBuf,
    },

    /// Simulate looped playback with background preloading and report cache behavior
    Scrub {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// First frame of the loop
        #[arg(long = "from", value_name = "N", default_value = "0")]
        from: i64,

        /// Last frame of the loop (default: last frame)
        #[arg(long = "to", value_name = "N")]
        to: Option<i64>,

        /// Number of passes over the range
        #[arg(long = "loops", value_name = "N", default_value = "2")]
        loops: u32,
    },
}

impl Command {
    pub fn file(&self) -> &PathBuf {
        match self {
            Command::Info { file }
            | Command::Grab { file, .. }
            | Command::Extract { file, .. }
            | Command::Scrub { file, .. } => file,
        }
    }
}

//! framescrub - frame-accurate random access into video files
//!
//! Re-exports all modules for use by the binary target.

// Engine (cache, probe, retrieval, preloader)
pub mod core;

pub mod convert;
pub mod decoder;
pub mod error;
pub mod extract;
pub mod frame;
pub mod media;

// App modules
pub mod cli;
pub mod config;
pub mod paths;

pub use self::core::{CachePolicy, SeekMode, VideoProcessor};
pub use decoder::{Decoder, DecoderBackend, SyntheticBackend};
pub use error::VideoError;
pub use extract::{ExtractProgress, ExtractedFrame, FrameExtractor};
pub use frame::Frame;
pub use media::VideoInfo;

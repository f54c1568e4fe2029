//! Frame access engine - cache, policy, probe, retrieval, preloading
//!
//! Independent of any UI. `VideoProcessor` is the entry point; the other
//! modules are its building blocks and are public for tests and tools.

pub mod cache;
pub mod cancel;
pub mod policy;
pub mod preloader;
pub mod probe;
pub mod processor;
pub mod retriever;

pub use cache::{CacheStats, FrameCache};
pub use cancel::CancelToken;
pub use policy::{CachePolicy, ResolutionTier};
pub use preloader::{PreloadState, Preloader};
pub use probe::SeekMode;
pub use processor::VideoProcessor;

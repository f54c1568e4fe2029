//! Seek capability probe
//!
//! Many containers report a successful seek even when the cursor silently
//! snaps to a keyframe or does not move at all. The probe checks the
//! contract empirically, mimicking real playback startup:
//!
//! 1. read one frame at position 0
//! 2. seek to frame floor(1.0 * fps), one second in
//! 3. compare the reported position with the target (tolerance: one frame)
//! 4. seek back to 0
//!
//! The result is fixed for the lifetime of one loaded video.

use log::{debug, info};

use crate::decoder::Decoder;

/// Retrieval strategy for one loaded video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Decoder jumps to arbitrary frames reliably
    Seek,
    /// Only forward contiguous decoding is reliable
    Sequential,
}

impl SeekMode {
    pub fn is_seek(self) -> bool {
        self == SeekMode::Seek
    }
}

/// Probe `decoder` and pick the retrieval strategy
pub fn probe(decoder: &mut dyn Decoder, fps: f64) -> SeekMode {
    if decoder.position() != Some(0) {
        decoder.seek_to_frame(0);
    }
    if let Err(e) = decoder.read_next() {
        debug!("Probe: initial read failed: {}", e);
    }

    let target = (1.0 * fps).floor() as i64;
    decoder.seek_to_frame(target);
    let actual = decoder.position();

    decoder.seek_to_frame(0);

    let mode = match actual {
        Some(pos) if (pos - target).abs() <= 1 => SeekMode::Seek,
        _ => SeekMode::Sequential,
    };
    info!(
        "Seek probe: target={}, reported={:?} -> {:?}",
        target, actual, mode
    );
    mode
}

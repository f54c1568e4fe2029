//! FFmpeg-backed decoder handle
//!
//! Decodes the best video stream of a container and converts every picture
//! to RGB24 with swscale. Frame seeks go backward to the preceding keyframe
//! and decode forward to the exact target; the decoded target is held back
//! and returned by the next `read_next`, so `position()` reports where the
//! cursor really is.

use std::path::Path;
use std::sync::Once;

use log::{debug, warn};
use playa_ffmpeg as ffmpeg;

use super::{DecodedImage, Decoder, DecoderBackend, PixelFormat, StreamInfo};
use crate::error::VideoError;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            warn!("FFmpeg init failed: {}", e);
        }
        unsafe {
            // AV_LOG_QUIET: keep decoder chatter off stderr
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_QUIET);
        }
    });
}

/// Opens files through FFmpeg
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl DecoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>, VideoError> {
        Ok(Box::new(FfmpegDecoder::open(path)?))
    }
}

struct FfmpegDecoder {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    start_pts: i64,
    info: StreamInfo,
    cursor: Option<i64>,
    /// Target frame decoded by a seek, returned by the next read
    pending: Option<DecodedImage>,
    eof_sent: bool,
    closed: bool,
}

// SAFETY: the FFmpeg contexts are owned exclusively by this handle and the
// engine never shares a handle between threads without holding its lock.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    fn open(path: &Path) -> Result<Self, VideoError> {
        init_ffmpeg();

        let input = ffmpeg::format::input(path)
            .map_err(|e| VideoError::open(path, format!("Failed to open video: {}", e)))?;

        let (stream_index, time_base, start_pts, fps, frames, duration_secs, params) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| VideoError::open(path, "No video stream found"))?;
            let time_base = f64::from(stream.time_base());
            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let start = stream.start_time();
            let start_pts = if start == ffmpeg::ffi::AV_NOPTS_VALUE { 0 } else { start };
            (
                stream.index(),
                time_base,
                start_pts,
                fps,
                stream.frames(),
                stream.duration() as f64 * time_base,
                stream.parameters(),
            )
        };

        let mut decoder_ctx = ffmpeg::codec::context::Context::from_parameters(params)
            .map_err(|e| VideoError::open(path, format!("Failed to create decoder context: {}", e)))?;

        // Multi-threaded frame decoding
        unsafe {
            (*decoder_ctx.as_mut_ptr()).thread_type = ffmpeg::ffi::FF_THREAD_FRAME;
            (*decoder_ctx.as_mut_ptr()).thread_count = 0;
        }

        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| VideoError::open(path, format!("Failed to create video decoder: {}", e)))?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| VideoError::open(path, format!("Failed to create scaler: {}", e)))?;

        let frame_count = if frames > 0 {
            frames
        } else {
            (duration_secs * fps).max(0.0) as i64
        };

        let info = StreamInfo {
            width: width as usize,
            height: height as usize,
            fps,
            frame_count,
            codec: format!("{:?}", decoder.id()).to_lowercase(),
        };

        debug!(
            "FFmpeg opened {}: {}x{} @ {:.3} fps, {} frames, codec {}",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count,
            info.codec
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_pts,
            info,
            cursor: Some(0),
            pending: None,
            eof_sent: false,
            closed: false,
        })
    }

    fn frame_of_pts(&self, pts: i64) -> i64 {
        ((pts - self.start_pts) as f64 * self.time_base * self.info.fps).round() as i64
    }

    fn pts_of_frame(&self, index: i64) -> i64 {
        if self.info.fps <= 0.0 || self.time_base <= 0.0 {
            return self.start_pts;
        }
        self.start_pts + (index as f64 / self.info.fps / self.time_base) as i64
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        loop {
            let (index, packet) = {
                let mut packets = self.input.packets();
                let (stream, packet) = packets.next()?;
                (stream.index(), packet)
            };
            if index == self.stream_index {
                return Some(packet);
            }
        }
    }

    fn decode_raw(&mut self) -> Option<ffmpeg::util::frame::video::Video> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Some(decoded);
            }
            if self.eof_sent {
                return None;
            }
            match self.next_packet() {
                Some(packet) => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        debug!("FFmpeg send_packet failed: {}", e);
                    }
                }
                None => {
                    let _ = self.decoder.send_eof();
                    self.eof_sent = true;
                }
            }
        }
    }

    fn to_rgb(
        &mut self,
        decoded: &ffmpeg::util::frame::video::Video,
        index: i64,
    ) -> Result<DecodedImage, VideoError> {
        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .map_err(|e| VideoError::decode(index, format!("Failed to scale frame: {}", e)))?;

        let width = self.info.width;
        let height = self.info.height;
        let stride = rgb.stride(0);
        let row_bytes = width * 3;
        let src = rgb.data(0);
        let mut data = vec![0u8; row_bytes * height];
        for y in 0..height {
            data[y * row_bytes..(y + 1) * row_bytes]
                .copy_from_slice(&src[y * stride..y * stride + row_bytes]);
        }

        Ok(DecodedImage {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
        })
    }
}

impl Decoder for FfmpegDecoder {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn seek_to_frame(&mut self, index: i64) -> bool {
        if self.closed || index < 0 {
            return false;
        }
        let target_ts = self.pts_of_frame(index);
        let ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                self.stream_index as i32,
                target_ts,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD,
            )
        };
        if ret < 0 {
            debug!("FFmpeg seek to frame {} failed (ret={})", index, ret);
            self.cursor = None;
            return false;
        }

        self.decoder.flush();
        self.eof_sent = false;
        self.pending = None;

        // Decode forward from the keyframe to the target
        while let Some(decoded) = self.decode_raw() {
            let landed = decoded
                .pts()
                .map(|pts| self.frame_of_pts(pts))
                .unwrap_or(index);
            if landed >= index {
                match self.to_rgb(&decoded, landed) {
                    Ok(image) => {
                        self.pending = Some(image);
                        self.cursor = Some(landed);
                    }
                    Err(e) => {
                        debug!("{}", e);
                        self.cursor = None;
                    }
                }
                return true;
            }
        }

        self.cursor = Some(self.info.frame_count);
        true
    }

    fn seek_to_msec(&mut self, msec: f64) -> bool {
        let index = (msec / 1000.0 * self.info.fps).floor() as i64;
        self.seek_to_frame(index)
    }

    fn read_next(&mut self) -> Result<Option<DecodedImage>, VideoError> {
        if self.closed {
            return Ok(None);
        }
        if let Some(image) = self.pending.take() {
            self.cursor = self.cursor.map(|c| c + 1);
            return Ok(Some(image));
        }
        let Some(decoded) = self.decode_raw() else {
            return Ok(None);
        };
        let index = decoded
            .pts()
            .map(|pts| self.frame_of_pts(pts))
            .or(self.cursor)
            .unwrap_or(0);
        self.cursor = Some(index + 1);
        self.to_rgb(&decoded, index).map(Some)
    }

    fn position(&self) -> Option<i64> {
        if self.closed { None } else { self.cursor }
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending = None;
        self.cursor = None;
    }
}

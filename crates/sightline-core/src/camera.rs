//! Frame acquisition: capture streams and JPEG snapshots
//!
//! The pipeline never talks to camera hardware directly. A [`CameraProvider`]
//! opens an exclusive [`VideoStream`], and [`snapshot`] turns the stream's
//! current frame into a downscaled JPEG for the vision service. Dropping the
//! stream releases the device.

use crate::error::{SightError, SightResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Linear downscale applied before encoding, to bound payload size
pub const SNAPSHOT_SCALE: f32 = 0.5;

/// JPEG quality for encoded snapshots
pub const SNAPSHOT_JPEG_QUALITY: u8 = 70;

/// A decoded RGB frame as delivered by a capture stream
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 pixels, row-major
    pub rgb: Vec<u8>,
}

/// A downscaled, JPEG-encoded snapshot ready for the vision service
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A live capture stream. Dropping it releases the device handle.
pub trait VideoStream: Send {
    /// Most recently decoded frame, or `None` while the sensor warms up.
    fn latest_frame(&mut self) -> Option<RawFrame>;
}

/// Opens capture streams. Implementations own device discovery and permissions.
pub trait CameraProvider: Send + Sync {
    /// Claim the device and start streaming, or fail with a reason the
    /// caller can show to the user (denied, missing, busy).
    fn open(&self) -> SightResult<Box<dyn VideoStream>>;
}

/// Downscale and JPEG-encode the stream's current frame.
///
/// Returns `None` while no frame is available; callers treat that as
/// "skip this cycle", never as an error.
pub fn snapshot(stream: &mut dyn VideoStream) -> Option<EncodedFrame> {
    let frame = stream.latest_frame()?;
    match encode_snapshot(&frame) {
        Ok(encoded) => Some(encoded),
        Err(err) => {
            warn!("📷 Snapshot encoding failed: {}", err);
            None
        }
    }
}

fn encode_snapshot(frame: &RawFrame) -> SightResult<EncodedFrame> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.rgb.clone())
            .ok_or_else(|| SightError::FrameEncoding("frame buffer size mismatch".into()))?;

    let width = ((frame.width as f32 * SNAPSHOT_SCALE) as u32).max(1);
    let height = ((frame.height as f32 * SNAPSHOT_SCALE) as u32).max(1);
    let scaled = imageops::resize(&img, width, height, FilterType::Triangle);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, SNAPSHOT_JPEG_QUALITY).encode_image(&scaled)?;

    Ok(EncodedFrame { jpeg, width, height })
}

/// Deterministic camera for tests, demos, and headless development.
///
/// Produces a moving gradient after a configurable warm-up period, and
/// models device exclusivity: a second `open` fails until the first
/// stream is dropped.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    warmup_frames: u32,
    fail_reason: Option<String>,
    busy: Arc<AtomicBool>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            warmup_frames: 0,
            fail_reason: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The first `frames` reads yield no frame, like a real sensor warming up.
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// A camera that always fails to open (denied permission, missing device).
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut camera = Self::new(0, 0);
        camera.fail_reason = Some(reason.into());
        camera
    }
}

impl CameraProvider for SyntheticCamera {
    fn open(&self) -> SightResult<Box<dyn VideoStream>> {
        if let Some(reason) = &self.fail_reason {
            return Err(SightError::CameraUnavailable(reason.clone()));
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(SightError::CameraUnavailable("device already in use".to_string()));
        }
        Ok(Box::new(SyntheticStream {
            width: self.width,
            height: self.height,
            remaining_warmup: self.warmup_frames,
            frame_index: 0,
            busy: Arc::clone(&self.busy),
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    remaining_warmup: u32,
    frame_index: u32,
    busy: Arc<AtomicBool>,
}

impl VideoStream for SyntheticStream {
    fn latest_frame(&mut self) -> Option<RawFrame> {
        if self.remaining_warmup > 0 {
            self.remaining_warmup -= 1;
            return None;
        }
        self.frame_index = self.frame_index.wrapping_add(1);

        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.push((x * 255 / self.width.max(1)) as u8);
                rgb.push((y * 255 / self.height.max(1)) as u8);
                rgb.push(self.frame_index as u8);
            }
        }
        Some(RawFrame {
            width: self.width,
            height: self.height,
            rgb,
        })
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

//! Frames, detections and the two collaborator traits that feed the frame loop.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// Static properties of the video stream, known once the source is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// A single captured frame. Pixels are shared and never mutated after capture;
/// annotated copies are made for pictures.
#[derive(Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self {
            image: Arc::new(image),
            captured_at,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// A foreground region found by the motion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Foreground pixels belonging to the region.
    pub area: u32,
}

/// Regions detected in one frame. Empty means no motion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub regions: Vec<Region>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_motion(&self) -> bool {
        !self.regions.is_empty()
    }
}

/// Supplies frames one at a time. `None` from `next_frame` is end-of-stream.
pub trait FrameSource {
    fn stream_info(&self) -> StreamInfo;

    fn next_frame(&mut self) -> Option<Frame>;

    /// Release the underlying device or process.
    fn close(&mut self) {}
}

/// Finds foreground regions in a frame.
pub trait MotionEngine {
    fn detect(&mut self, frame: &Frame) -> DetectionResult;
}

//! Motion engine built on background subtraction and connected-component labelling
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::motion::background::BackgroundSubtractor;
use crate::motion::preprocessing;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use motionwatch_event_core::config::DetectionConfig;
use motionwatch_event_core::{DetectionResult, Frame, MotionEngine, Region};
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Blob {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl Blob {
    fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 1,
        }
    }

    fn merge(&mut self, other: &Blob) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self.area += other.area;
    }

    fn region(&self) -> Region {
        Region {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
            area: self.area,
        }
    }
}

pub struct BackgroundMotionEngine {
    subtractor: BackgroundSubtractor,
    blur_size: u32,
    dilate_iterations: u8,
    min_area: u32,
    max_area: u32,
}

impl BackgroundMotionEngine {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            subtractor: BackgroundSubtractor::new(config.background_history, config.threshold),
            blur_size: config.blur_size,
            dilate_iterations: config.dilate_iterations,
            min_area: config.min_area,
            max_area: config.max_area,
        }
    }

    /// Bounding box and pixel count of every eight-connected foreground blob.
    fn blobs(mask: &GrayImage) -> Vec<Blob> {
        let width = mask.width() as usize;
        let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        let by_label: HashMap<u32, Blob> = labeled
            .as_raw()
            .par_iter()
            .enumerate()
            .filter(|&(_, &label)| label != 0)
            .fold(HashMap::new, |mut acc, (i, &label)| {
                let blob = Blob::at((i % width) as u32, (i / width) as u32);
                acc.entry(label)
                    .and_modify(|b: &mut Blob| b.merge(&blob))
                    .or_insert(blob);
                acc
            })
            .reduce(HashMap::new, |mut left, right| {
                for (label, blob) in right {
                    left.entry(label)
                        .and_modify(|b| b.merge(&blob))
                        .or_insert(blob);
                }
                left
            });

        by_label.into_values().collect()
    }
}

impl MotionEngine for BackgroundMotionEngine {
    fn detect(&mut self, frame: &Frame) -> DetectionResult {
        let started = Instant::now();
        let gray = preprocessing::preprocess(&frame.image, self.blur_size);
        let mut mask = self.subtractor.apply(&gray);
        if self.dilate_iterations > 0 {
            mask = dilate(&mask, Norm::LInf, self.dilate_iterations);
        }

        // No blob can beat min_area if the whole mask doesn't.
        let lit = mask.as_raw().par_iter().filter(|&&p| p == 255).count();
        if lit as u64 <= self.min_area as u64 {
            return DetectionResult::empty();
        }

        let mut regions: Vec<Region> = Self::blobs(&mask)
            .iter()
            .filter(|b| self.min_area < b.area && b.area < self.max_area)
            .map(Blob::region)
            .collect();
        regions.sort_by(|a, b| b.area.cmp(&a.area));

        debug!(
            "{} foreground pixels, {} regions in {}ms",
            lit,
            regions.len(),
            started.elapsed().as_millis()
        );
        DetectionResult { regions }
    }
}

//! Running-average background model
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use image::{GrayImage, Luma};
use ndarray::{Array2, Zip};

/// Keeps a slowly adapting average of past frames so that gradual lighting changes
/// do not show up as motion.
pub struct BackgroundSubtractor {
    background: Option<Array2<f32>>,
    alpha: f32,
    threshold: f32,
}

fn to_array(frame: &GrayImage) -> Array2<f32> {
    let (width, height) = frame.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        frame.get_pixel(x as u32, y as u32)[0] as f32
    })
}

impl BackgroundSubtractor {
    /// `history` is the number of frames the average effectively spans.
    pub fn new(history: u32, threshold: u8) -> Self {
        Self {
            background: None,
            alpha: 1.0 / history.max(1) as f32,
            threshold: threshold as f32,
        }
    }

    /// Returns the foreground mask (255 where the frame differs from the model by more than
    /// the threshold) and folds the frame into the model. The first frame, or one with new
    /// dimensions, only seeds the model.
    pub fn apply(&mut self, frame: &GrayImage) -> GrayImage {
        let (width, height) = frame.dimensions();
        let current = to_array(frame);

        if let Some(bg) = &self.background {
            if bg.dim() != current.dim() {
                debug!("Frame size changed to {width}x{height}, resetting background");
                self.background = None;
            }
        }
        if self.background.is_none() {
            self.background = Some(current);
            return GrayImage::new(width, height);
        }
        let Some(background) = self.background.as_mut() else {
            return GrayImage::new(width, height);
        };

        let mut diff = current.clone();
        Zip::from(&mut diff)
            .and(&*background)
            .par_for_each(|d, &bg| {
                *d = (*d - bg).abs();
            });

        let alpha = self.alpha;
        Zip::from(&mut *background)
            .and(&current)
            .par_for_each(|bg, &value| {
                *bg = value * alpha + *bg * (1.0 - alpha);
            });

        let threshold = self.threshold;
        GrayImage::from_fn(width, height, |x, y| {
            if diff[[y as usize, x as usize]] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

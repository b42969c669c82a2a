//! Event pictures: the triggering frame with the detected regions outlined.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::CoreError;
use crate::frame::{Frame, Region};
use chrono::Local;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

pub struct PictureWriter {
    dir: PathBuf,
}

impl PictureWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Copy of the frame with one rectangle per region. The frame itself is untouched.
    pub fn annotate(frame: &Frame, regions: &[Region]) -> RgbImage {
        let mut canvas = (*frame.image).clone();
        for region in regions {
            let rect = Rect::at(region.x as i32, region.y as i32)
                .of_size(region.width.max(1), region.height.max(1));
            draw_hollow_rect_mut(&mut canvas, rect, OUTLINE);
        }
        canvas
    }

    pub fn save(&self, frame: &Frame, regions: &[Region]) -> Result<PathBuf, CoreError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = self.dir.join(format!("picture_{stamp}.jpg"));
        Self::annotate(frame, regions).save(&path)?;
        info!("Picture saved to {}", path.display());
        Ok(path)
    }
}

//! Frame preprocessing ahead of background subtraction
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Sigma equivalent of a square Gaussian kernel of the given size.
pub(crate) fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Grayscale then Gaussian blur. Kernels of size 0 or 1 skip the blur.
pub fn preprocess(frame: &RgbImage, blur_size: u32) -> GrayImage {
    let gray = imageops::grayscale(frame);
    if blur_size <= 1 {
        return gray;
    }
    gaussian_blur_f32(&gray, kernel_sigma(blur_size))
}

//! Background-subtraction motion detection
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

mod background;
mod detector;
mod preprocessing;

pub use detector::BackgroundMotionEngine;

//! motionwatch event core: turns a per-frame motion signal into events, recordings and hooks.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

pub mod clock;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod logic;
pub mod picture;
pub mod precapture;
pub mod process;
pub mod recording;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::config::DetectorConfig;
pub use crate::controller::{EventController, RuntimeContext};
pub use crate::driver::{FrameLoop, LoopExit, ShutdownHandle};
pub use crate::error::CoreError;
pub use crate::frame::{DetectionResult, Frame, FrameSource, MotionEngine, Region, StreamInfo};
pub use crate::process::ProcessGroups;

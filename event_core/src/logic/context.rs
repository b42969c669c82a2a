//! Per-run event state the handlers read and write each frame
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::event_states::EventStatus;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct EventState {
    pub(crate) status: EventStatus,
    /// Non-empty detections in a row; reset by any empty frame.
    pub(crate) consecutive_motion_frames: u32,
    pub(crate) last_motion_time: Option<Instant>,
    pub(crate) threshold: u32,
    pub(crate) no_motion_timeout: Duration,
}

impl EventState {
    pub(crate) fn new(threshold: u32, no_motion_timeout: Duration) -> Self {
        Self {
            status: EventStatus::Idle,
            consecutive_motion_frames: 0,
            last_motion_time: None,
            threshold: threshold.max(1),
            no_motion_timeout,
        }
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn is_event_active(&self) -> bool {
        self.status == EventStatus::EventActive
    }

    pub fn consecutive_motion_frames(&self) -> u32 {
        self.consecutive_motion_frames
    }

    pub fn last_motion_time(&self) -> Option<Instant> {
        self.last_motion_time
    }

    pub(crate) fn debounced(&self) -> bool {
        self.consecutive_motion_frames >= self.threshold
    }

    /// Strictly more than the timeout since the last detection.
    pub(crate) fn quiet_for_timeout(&self, now: Instant) -> bool {
        match self.last_motion_time {
            Some(last) => now.saturating_duration_since(last) > self.no_motion_timeout,
            None => true,
        }
    }
}

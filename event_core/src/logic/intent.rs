//! Side effects requested by the event machine and applied by the controller.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::Region;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Run the event start hook and take a picture of the regions.
    StartEvent { regions: Vec<Region> },
    /// Run the event end hook.
    StopEvent,
    /// Open a recording session.
    StartRecording,
    /// Close the open session and hand it to post-processing.
    StopRecording { reason: StopReason },
    LogTransition {
        from: String,
        to: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EventEnded,
    MaxDuration,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::EventEnded => "event ended",
            StopReason::MaxDuration => "max duration reached",
            StopReason::Shutdown => "shutdown",
        };
        write!(f, "{}", name)
    }
}

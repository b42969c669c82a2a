//! Event lifecycle states and their per-frame handlers
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::EventState;
use crate::logic::fsm::{FrameObservation, StateHandler, TransitionDecision};
use crate::logic::intent::Intent;
use std::fmt;

#[derive(Hash, Eq, PartialEq, Clone, Debug, Copy)]
pub enum EventStatus {
    Idle,
    /// Motion seen, but fewer consecutive frames than the debounce threshold.
    MotionPending,
    EventActive,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl EventStatus {
    /// Static string form (no allocation) for hot paths
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Idle => "Idle",
            EventStatus::MotionPending => "MotionPending",
            EventStatus::EventActive => "EventActive",
        }
    }
}

fn start_event(frame: &FrameObservation<'_>, ctx: &EventState) -> TransitionDecision<EventStatus> {
    TransitionDecision::Transition {
        to: EventStatus::EventActive,
        reason: format!("{} consecutive motion frames", ctx.consecutive_motion_frames),
        intents: vec![Intent::StartEvent {
            regions: frame.detection.regions.clone(),
        }],
    }
}

pub(crate) struct IdleState;

impl StateHandler<EventStatus> for IdleState {
    /// Debounced motion -> EventActive, any motion -> MotionPending
    fn on_frame(
        &mut self,
        ctx: &mut EventState,
        frame: &FrameObservation<'_>,
    ) -> TransitionDecision<EventStatus> {
        if ctx.debounced() {
            start_event(frame, ctx)
        } else if ctx.consecutive_motion_frames > 0 {
            TransitionDecision::Transition {
                to: EventStatus::MotionPending,
                reason: "Motion".into(),
                intents: Vec::new(),
            }
        } else {
            TransitionDecision::Stay(Vec::new())
        }
    }
}

pub(crate) struct MotionPendingState;

impl StateHandler<EventStatus> for MotionPendingState {
    /// Debounced motion -> EventActive, empty frame -> Idle
    fn on_frame(
        &mut self,
        ctx: &mut EventState,
        frame: &FrameObservation<'_>,
    ) -> TransitionDecision<EventStatus> {
        if ctx.debounced() {
            start_event(frame, ctx)
        } else if ctx.consecutive_motion_frames == 0 {
            TransitionDecision::Transition {
                to: EventStatus::Idle,
                reason: "Motion not confirmed".into(),
                intents: Vec::new(),
            }
        } else {
            TransitionDecision::Stay(Vec::new())
        }
    }
}

pub(crate) struct EventActiveState;

impl StateHandler<EventStatus> for EventActiveState {
    /// No detection for longer than the timeout -> Idle
    fn on_frame(
        &mut self,
        ctx: &mut EventState,
        frame: &FrameObservation<'_>,
    ) -> TransitionDecision<EventStatus> {
        if !frame.detection.has_motion() && ctx.quiet_for_timeout(frame.now) {
            TransitionDecision::Transition {
                to: EventStatus::Idle,
                reason: format!("No motion for {:?}", ctx.no_motion_timeout),
                intents: vec![Intent::StopEvent],
            }
        } else {
            TransitionDecision::Stay(Vec::new())
        }
    }
}

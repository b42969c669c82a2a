//! Event machine: motion debounce, no-motion timeout and the recording policy.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::DetectorConfig;
use crate::frame::DetectionResult;
use crate::logic::context::EventState;
use crate::logic::event_states::{EventActiveState, EventStatus, IdleState, MotionPendingState};
use crate::logic::fsm::{FrameObservation, FsmRegistry};
use crate::logic::intent::{Intent, StopReason};
use crate::logic::timer::Backoff;
use std::time::{Duration, Instant};

/// Turns one detection per frame into intents. Performs no I/O itself; the
/// controller applies the intents and reports recording start/stop back.
pub struct EventMachine {
    registry: FsmRegistry<EventStatus>,
    state: EventState,
    recording_enabled: bool,
    max_duration: Duration,
    launch_retry: Duration,
    launch_backoff: Backoff,
    segment_started_at: Option<Instant>,
}

impl EventMachine {
    pub fn new(config: &DetectorConfig) -> Self {
        let mut registry = FsmRegistry::new();
        registry.register(EventStatus::Idle, Box::new(IdleState));
        registry.register(EventStatus::MotionPending, Box::new(MotionPendingState));
        registry.register(EventStatus::EventActive, Box::new(EventActiveState));

        Self {
            registry,
            state: EventState::new(
                config.detection.consecutive_frames,
                config.no_motion_timeout(),
            ),
            recording_enabled: config.movie.enable,
            max_duration: config.max_duration(),
            launch_retry: config.launch_retry(),
            launch_backoff: Backoff::default(),
            segment_started_at: None,
        }
    }

    pub fn state(&self) -> &EventState {
        &self.state
    }

    pub fn status(&self) -> EventStatus {
        self.state.status
    }

    pub fn is_recording(&self) -> bool {
        self.segment_started_at.is_some()
    }

    /// Feed one frame's detection. Recording intents always precede StopEvent so the
    /// segment is closed before the end hook runs.
    pub fn on_detection(&mut self, now: Instant, detection: &DetectionResult) -> Vec<Intent> {
        if detection.has_motion() {
            self.state.consecutive_motion_frames =
                self.state.consecutive_motion_frames.saturating_add(1);
            self.state.last_motion_time = Some(now);
        } else {
            self.state.consecutive_motion_frames = 0;
        }

        let frame = FrameObservation { now, detection };
        let (next, mut intents) = self
            .registry
            .handle(&mut self.state, &frame, |ctx| &ctx.status);
        self.state.status = next;

        let recording = self.recording_policy(now);
        match intents.iter().position(|i| matches!(i, Intent::StopEvent)) {
            Some(pos) => {
                intents.splice(pos..pos, recording);
            }
            None => intents.extend(recording),
        }
        intents
    }

    fn recording_policy(&mut self, now: Instant) -> Vec<Intent> {
        let active = self.state.is_event_active();
        match self.segment_started_at {
            Some(_) if !active => vec![Intent::StopRecording {
                reason: StopReason::EventEnded,
            }],
            Some(started) if now.saturating_duration_since(started) > self.max_duration => vec![
                Intent::StopRecording {
                    reason: StopReason::MaxDuration,
                },
                Intent::StartRecording,
            ],
            Some(_) => Vec::new(),
            None if active && self.recording_enabled && !self.launch_backoff.active(now) => {
                vec![Intent::StartRecording]
            }
            None => Vec::new(),
        }
    }

    pub fn recording_started(&mut self, at: Instant) {
        self.segment_started_at = Some(at);
        self.launch_backoff.cancel();
    }

    pub fn recording_stopped(&mut self) {
        self.segment_started_at = None;
    }

    /// Launch failed: no session, and no new attempt until the retry delay passes.
    pub fn recording_failed(&mut self, now: Instant) {
        self.segment_started_at = None;
        self.launch_backoff.start(now, self.launch_retry);
    }

    /// Shutdown path: end the event first, then the recording.
    pub fn force_idle(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        if self.state.is_event_active() {
            intents.push(Intent::StopEvent);
        }
        if self.segment_started_at.is_some() {
            intents.push(Intent::StopRecording {
                reason: StopReason::Shutdown,
            });
        }
        self.state.status = EventStatus::Idle;
        self.state.consecutive_motion_frames = 0;
        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Region;

    fn motion() -> DetectionResult {
        DetectionResult {
            regions: vec![Region {
                x: 1,
                y: 2,
                width: 30,
                height: 40,
                area: 900,
            }],
        }
    }

    fn config(threshold: u32, timeout: f64, max_duration: f64) -> DetectorConfig {
        let mut config = DetectorConfig::default();
        config.detection.consecutive_frames = threshold;
        config.event.no_motion_timeout = timeout;
        config.movie.max_duration = max_duration;
        config.movie.launch_retry_seconds = 5.0;
        config
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn without_logs(intents: Vec<Intent>) -> Vec<Intent> {
        intents
            .into_iter()
            .filter(|i| !matches!(i, Intent::LogTransition { .. }))
            .collect()
    }

    #[test]
    fn counter_increments_on_motion_and_resets_on_empty() {
        let mut machine = EventMachine::new(&config(10, 20.0, 60.0));
        let t0 = Instant::now();
        let pattern = [true, true, false, true, true, true, false];
        let mut expected = 0;
        for (i, &moving) in pattern.iter().enumerate() {
            let detection = if moving { motion() } else { DetectionResult::empty() };
            machine.on_detection(t0 + Duration::from_millis(i as u64 * 33), &detection);
            expected = if moving { expected + 1 } else { 0 };
            assert_eq!(machine.state().consecutive_motion_frames(), expected);
        }
        assert_eq!(machine.status(), EventStatus::Idle);
    }

    #[test]
    fn event_starts_on_threshold_frame_only_once() {
        let mut machine = EventMachine::new(&config(3, 20.0, 60.0));
        let t0 = Instant::now();
        let mut starts = 0;
        for i in 0..5u64 {
            let intents = machine.on_detection(t0 + Duration::from_millis(i * 33), &motion());
            let started = intents
                .iter()
                .any(|i| matches!(i, Intent::StartEvent { .. }));
            assert_eq!(machine.state().is_event_active(), i >= 2, "frame {}", i + 1);
            if started {
                starts += 1;
                assert_eq!(i, 2);
            }
        }
        assert_eq!(starts, 1);
    }

    #[test]
    fn interrupted_motion_does_not_confirm_event() {
        let mut machine = EventMachine::new(&config(3, 20.0, 60.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.on_detection(t0 + secs(1), &motion());
        assert_eq!(machine.status(), EventStatus::MotionPending);
        machine.on_detection(t0 + secs(2), &DetectionResult::empty());
        assert_eq!(machine.status(), EventStatus::Idle);
        machine.on_detection(t0 + secs(3), &motion());
        assert_eq!(machine.status(), EventStatus::MotionPending);
    }

    #[test]
    fn start_event_carries_regions_and_requests_recording() {
        let mut machine = EventMachine::new(&config(1, 20.0, 60.0));
        let intents = without_logs(machine.on_detection(Instant::now(), &motion()));
        assert_eq!(
            intents,
            vec![
                Intent::StartEvent {
                    regions: motion().regions
                },
                Intent::StartRecording
            ]
        );
    }

    #[test]
    fn event_stays_active_until_timeout_strictly_exceeded() {
        let mut machine = EventMachine::new(&config(1, 20.0, 600.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.recording_started(t0);

        let intents = machine.on_detection(t0 + secs(20), &DetectionResult::empty());
        assert!(intents.is_empty());
        assert!(machine.state().is_event_active());

        let intents = without_logs(machine.on_detection(t0 + secs(21), &DetectionResult::empty()));
        assert_eq!(
            intents,
            vec![
                Intent::StopRecording {
                    reason: StopReason::EventEnded
                },
                Intent::StopEvent
            ]
        );
        assert_eq!(machine.status(), EventStatus::Idle);
    }

    #[test]
    fn motion_below_threshold_still_extends_active_event() {
        let mut machine = EventMachine::new(&config(3, 10.0, 600.0));
        let t0 = Instant::now();
        for i in 0..3 {
            machine.on_detection(t0 + secs(i), &motion());
        }
        assert!(machine.state().is_event_active());
        machine.on_detection(t0 + secs(8), &DetectionResult::empty());
        machine.on_detection(t0 + secs(9), &motion());
        machine.on_detection(t0 + secs(15), &DetectionResult::empty());
        assert!(machine.state().is_event_active());
        machine.on_detection(t0 + secs(20), &DetectionResult::empty());
        assert!(!machine.state().is_event_active());
    }

    #[test]
    fn rollover_after_max_duration() {
        let mut machine = EventMachine::new(&config(1, 600.0, 60.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.recording_started(t0);

        assert!(machine.on_detection(t0 + secs(60), &motion()).is_empty());

        let intents = machine.on_detection(t0 + secs(61), &motion());
        assert_eq!(
            intents,
            vec![
                Intent::StopRecording {
                    reason: StopReason::MaxDuration
                },
                Intent::StartRecording
            ]
        );
        assert!(machine.state().is_event_active());
    }

    #[test]
    fn no_motion_stop_takes_precedence_over_rollover() {
        let mut machine = EventMachine::new(&config(1, 20.0, 60.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.recording_started(t0);
        machine.on_detection(t0 + secs(50), &motion());
        machine.recording_started(t0);

        let intents = without_logs(machine.on_detection(t0 + secs(71), &DetectionResult::empty()));
        assert_eq!(
            intents,
            vec![
                Intent::StopRecording {
                    reason: StopReason::EventEnded
                },
                Intent::StopEvent
            ]
        );
    }

    #[test]
    fn recording_disabled_never_requests_sessions() {
        let mut cfg = config(1, 20.0, 60.0);
        cfg.movie.enable = false;
        let mut machine = EventMachine::new(&cfg);
        let t0 = Instant::now();
        let intents = without_logs(machine.on_detection(t0, &motion()));
        assert!(!intents.contains(&Intent::StartRecording));
        assert!(machine.on_detection(t0 + secs(1), &motion()).is_empty());
    }

    #[test]
    fn failed_launch_waits_for_retry_delay() {
        let mut machine = EventMachine::new(&config(1, 600.0, 60.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.recording_failed(t0);

        assert!(machine.on_detection(t0 + secs(1), &motion()).is_empty());
        assert!(machine.state().is_event_active());
        assert_eq!(
            machine.on_detection(t0 + secs(5), &motion()),
            vec![Intent::StartRecording]
        );
    }

    #[test]
    fn force_idle_closes_event_then_recording() {
        let mut machine = EventMachine::new(&config(1, 20.0, 60.0));
        let t0 = Instant::now();
        machine.on_detection(t0, &motion());
        machine.recording_started(t0);
        assert_eq!(
            machine.force_idle(),
            vec![
                Intent::StopEvent,
                Intent::StopRecording {
                    reason: StopReason::Shutdown
                }
            ]
        );
        assert_eq!(machine.status(), EventStatus::Idle);
        machine.recording_stopped();
        assert!(machine.force_idle().is_empty());
    }
}

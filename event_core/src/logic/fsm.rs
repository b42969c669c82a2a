//! Keyed state handlers and transition routing for the event machine
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::DetectionResult;
use crate::logic::context::EventState;
use crate::logic::intent::Intent;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::time::Instant;

/// Trait bound for enum-like state keys used by the FSM.
pub trait StateKeyLike: Eq + Hash + Clone + Display + Send + 'static {}
impl<T> StateKeyLike for T where T: Eq + Hash + Clone + Display + Send + 'static {}

/// What a handler sees for one frame, after the motion counters were updated.
pub(crate) struct FrameObservation<'a> {
    pub now: Instant,
    pub detection: &'a DetectionResult,
}

/// Stay keeps the current state, Transition switches to `to`.
pub(crate) enum TransitionDecision<K> {
    Stay(Vec<Intent>),
    Transition {
        to: K,
        reason: String,
        intents: Vec<Intent>,
    },
}

pub(crate) trait StateHandler<K: StateKeyLike>: Send {
    fn on_frame(&mut self, ctx: &mut EventState, frame: &FrameObservation<'_>)
        -> TransitionDecision<K>;
}

pub(crate) struct FsmRegistry<K: StateKeyLike> {
    handlers: HashMap<K, Box<dyn StateHandler<K>>>,
}

impl<K: StateKeyLike> FsmRegistry<K> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, state: K, handler: Box<dyn StateHandler<K>>) {
        self.handlers.insert(state, handler);
    }

    /// Route a frame to the current state's handler and return (next_state, intents).
    /// A transition is prefixed with a LogTransition intent.
    /// Caller persists next_state.
    pub(crate) fn handle<F>(
        &mut self,
        ctx: &mut EventState,
        frame: &FrameObservation<'_>,
        get_state: F,
    ) -> (K, Vec<Intent>)
    where
        F: Fn(&EventState) -> &K,
    {
        let state = get_state(ctx).clone();
        let Some(handler) = self.handlers.get_mut(&state) else {
            warn!("No handler registered for state {state}");
            return (state, Vec::new());
        };
        match handler.on_frame(ctx, frame) {
            TransitionDecision::Stay(intents) => (state, intents),
            TransitionDecision::Transition {
                to,
                reason,
                mut intents,
            } => {
                intents.insert(
                    0,
                    Intent::LogTransition {
                        from: state.to_string(),
                        to: to.to_string(),
                        reason,
                    },
                );
                (to, intents)
            }
        }
    }
}

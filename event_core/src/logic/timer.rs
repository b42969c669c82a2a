//! Single-deadline backoff used to space out encoder launch retries.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub(crate) struct Backoff {
    deadline: Option<Instant>,
}

impl Backoff {
    pub(crate) fn start(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
    }

    pub(crate) fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True while the deadline has not been reached. Clears itself once expired.
    pub(crate) fn active(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now < deadline => true,
            Some(_) => {
                self.deadline = None;
                false
            }
            None => false,
        }
    }
}

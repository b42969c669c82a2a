//! Rolling buffer of the most recent frames, snapshotted when a recording starts.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::Frame;
use std::collections::VecDeque;

/// Fixed-capacity FIFO. Pushing into a full buffer drops the oldest frame.
pub struct PrecaptureBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl PrecaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Copy of the buffered frames, oldest first. Later pushes do not affect it.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

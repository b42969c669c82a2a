//! The real-time frame loop: read, buffer, detect, update.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::controller::{EventController, RuntimeContext};
use crate::frame::{FrameSource, MotionEngine};
use crate::precapture::PrecaptureBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable stop flag. Safe to trigger from a signal handler thread.
#[derive(Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    EndOfStream,
    Stopped,
}

pub struct FrameLoop<S: FrameSource, M: MotionEngine> {
    ctx: RuntimeContext,
    source: S,
    engine: M,
    buffer: PrecaptureBuffer,
    controller: EventController,
    shutdown: ShutdownHandle,
    frames: u64,
}

impl<S: FrameSource, M: MotionEngine> FrameLoop<S, M> {
    pub fn new(
        ctx: RuntimeContext,
        source: S,
        engine: M,
        controller: EventController,
        shutdown: ShutdownHandle,
    ) -> Self {
        let buffer = PrecaptureBuffer::new(ctx.config.precapture_capacity());
        Self {
            ctx,
            source,
            engine,
            buffer,
            controller,
            shutdown,
            frames: 0,
        }
    }

    pub fn controller(&self) -> &EventController {
        &self.controller
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Block until end-of-stream or a stop request, then run the shutdown sequence.
    pub fn run(&mut self) -> LoopExit {
        let clock = Arc::clone(&self.ctx.clock);
        let soak = self.ctx.config.soak_period();
        let started = clock.now();
        info!(
            "Frame loop started ({:?} soak, {} precapture frames)",
            soak,
            self.buffer.capacity()
        );

        let exit = loop {
            if self.shutdown.is_requested() {
                info!("Stop requested");
                break LoopExit::Stopped;
            }
            let Some(frame) = self.source.next_frame() else {
                error!("Failed to capture frame from camera");
                break LoopExit::EndOfStream;
            };
            self.frames += 1;
            self.buffer.push(frame.clone());

            // The engine still sees soak frames so its background model settles.
            let detection = self.engine.detect(&frame);
            let now = clock.now();
            if now.saturating_duration_since(started) <= soak {
                continue;
            }
            self.controller
                .on_frame(now, &frame, &detection, &self.buffer);
        };

        self.source.close();
        self.controller.shutdown(clock.now());
        info!("Frame loop exited after {} frames: {exit:?}", self.frames);
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DetectorConfig;
    use crate::frame::StreamInfo;
    use crate::testing::{
        append_hook, read_hook_log, FakeBackend, ScriptedEngine, ScriptedSource,
    };
    use std::fs;
    use std::time::Duration;

    fn setup(
        dir: &std::path::Path,
        tune: impl FnOnce(&mut DetectorConfig),
    ) -> (RuntimeContext, Arc<ManualClock>) {
        let mut config = DetectorConfig::default();
        config.camera.fps = 10;
        config.detection.consecutive_frames = 2;
        config.detection.soak_seconds = 1.0;
        config.movie.enable = false;
        config.picture.enable = false;
        config.movie.precapture_seconds = 0.5;
        config.movie.dirpath = dir.join("movies");
        config.picture.dirpath = dir.join("pictures");
        config.tmp_dir.dirpath = dir.join("tmp");
        config.event.on_event_start = append_hook(&dir.join("events.log"), "start");
        config.event.on_event_end = append_hook(&dir.join("events.log"), "end");
        tune(&mut config);
        fs::create_dir_all(&config.tmp_dir.dirpath).unwrap();
        let clock = Arc::new(ManualClock::new());
        (RuntimeContext::new(config, clock.clone()), clock)
    }

    fn controller(ctx: &RuntimeContext) -> EventController {
        let stream = StreamInfo {
            width: 8,
            height: 8,
            fps: 10,
        };
        EventController::new(ctx, stream, Arc::new(FakeBackend::default()))
    }

    #[test]
    fn detections_during_soak_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, clock) = setup(dir.path(), |_| {});
        // 100ms per frame: the first 10 frames fall inside the 1s soak.
        let source = ScriptedSource::new(clock, Duration::from_millis(100), 10);
        let engine = ScriptedEngine::new([true; 10]);
        let mut frame_loop = FrameLoop::new(
            ctx.clone(),
            source,
            engine,
            controller(&ctx),
            ShutdownHandle::new(),
        );

        assert_eq!(frame_loop.run(), LoopExit::EndOfStream);
        assert_eq!(frame_loop.frames(), 10);
        assert_eq!(frame_loop.engine.calls, 10);
        assert!(read_hook_log(&dir.path().join("events.log")).is_empty());
    }

    #[test]
    fn motion_after_soak_starts_event_and_end_of_stream_closes_it() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, clock) = setup(dir.path(), |_| {});
        let source = ScriptedSource::new(clock, Duration::from_millis(100), 14);
        let closed = source.closed.clone();
        let engine = ScriptedEngine::new([false; 10].into_iter().chain([true; 4]));
        let mut frame_loop = FrameLoop::new(
            ctx.clone(),
            source,
            engine,
            controller(&ctx),
            ShutdownHandle::new(),
        );

        assert_eq!(frame_loop.run(), LoopExit::EndOfStream);
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(
            read_hook_log(&dir.path().join("events.log")),
            vec!["start", "end"]
        );
        // 0.5s * 10fps.
        assert_eq!(frame_loop.buffered(), 5);
    }

    #[test]
    fn stop_request_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, clock) = setup(dir.path(), |config| config.detection.soak_seconds = 0.0);
        let source = ScriptedSource::new(clock, Duration::from_millis(100), 1000);
        let shutdown = ShutdownHandle::new();
        shutdown.stop();
        let mut frame_loop = FrameLoop::new(
            ctx.clone(),
            source,
            ScriptedEngine::new(Vec::new()),
            controller(&ctx),
            shutdown,
        );
        assert_eq!(frame_loop.run(), LoopExit::Stopped);
        assert_eq!(frame_loop.frames(), 0);
    }
}

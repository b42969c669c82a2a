//! Fakes shared by the unit tests.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::clock::{Clock, ManualClock};
use crate::error::CoreError;
use crate::frame::{DetectionResult, Frame, FrameSource, MotionEngine, Region, StreamInfo};
use crate::recording::encoder::{EncoderBackend, SegmentRecorder};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) fn solid_frame(width: u32, height: u32, value: u8, at: Instant) -> Frame {
    Frame::new(RgbImage::from_pixel(width, height, Rgb([value; 3])), at)
}

pub(crate) fn region() -> Region {
    Region {
        x: 2,
        y: 2,
        width: 4,
        height: 4,
        area: 16,
    }
}

pub(crate) fn motion() -> DetectionResult {
    DetectionResult {
        regions: vec![region()],
    }
}

/// Template that appends `<label> <filename>` to a log file in `dir`.
pub(crate) fn hook_log(dir: &Path, label: &str) -> (PathBuf, String) {
    let log = dir.join(format!("{label}.log"));
    let template = format!("echo {label} {{filename}} >> '{}'", log.display());
    (log, template)
}

/// Template that appends a bare `label` line to `log`.
pub(crate) fn append_hook(log: &Path, label: &str) -> String {
    format!("echo {label} >> '{}'", log.display())
}

pub(crate) fn read_hook_log(log: &Path) -> Vec<String> {
    match fs::read_to_string(log) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => panic!("reading {}: {e}", log.display()),
    }
}

#[derive(Default)]
struct RecorderState {
    interrupted: bool,
    finished: bool,
}

/// Recorder that is alive until finished. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct FakeRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl FakeRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.state.lock().unwrap().interrupted
    }

    pub(crate) fn finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }
}

impl SegmentRecorder for FakeRecorder {
    fn id(&self) -> u32 {
        0
    }

    fn is_alive(&mut self) -> bool {
        !self.finished()
    }

    fn interrupt(&mut self) {
        self.state.lock().unwrap().interrupted = true;
    }

    fn finish(&mut self, _grace: Duration) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        state.interrupted = true;
        state.finished = true;
        Ok(())
    }
}

/// Records every call. Writes empty files so cleanup paths have something to remove.
#[derive(Default)]
pub(crate) struct FakeBackend {
    fail_launch: AtomicBool,
    fail_concat: bool,
    precapture_delay: Duration,
    launched: Mutex<Vec<PathBuf>>,
    recorders: Mutex<Vec<FakeRecorder>>,
    precaptures: Mutex<Vec<(PathBuf, usize)>>,
    concatenations: Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
}

impl FakeBackend {
    pub(crate) fn failing_concat() -> Self {
        Self {
            fail_concat: true,
            ..Self::default()
        }
    }

    pub(crate) fn slow_precapture(delay: Duration) -> Self {
        Self {
            precapture_delay: delay,
            ..Self::default()
        }
    }

    pub(crate) fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().unwrap().clone()
    }

    pub(crate) fn recorders(&self) -> Vec<FakeRecorder> {
        self.recorders.lock().unwrap().clone()
    }

    pub(crate) fn precaptures(&self) -> Vec<(PathBuf, usize)> {
        self.precaptures.lock().unwrap().clone()
    }

    pub(crate) fn concatenations(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
        self.concatenations.lock().unwrap().clone()
    }
}

impl EncoderBackend for FakeBackend {
    fn launch_segment(
        &self,
        output: &Path,
        _stream: &StreamInfo,
    ) -> Result<Box<dyn SegmentRecorder>, CoreError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(CoreError::Launch {
                program: "fake-recorder".into(),
                output: output.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
            });
        }
        fs::write(output, b"segment")?;
        let recorder = FakeRecorder::new();
        self.launched.lock().unwrap().push(output.to_path_buf());
        self.recorders.lock().unwrap().push(recorder.clone());
        Ok(Box::new(recorder))
    }

    fn encode_precapture(
        &self,
        frames: &[Frame],
        output: &Path,
        _stream: &StreamInfo,
    ) -> Result<(), CoreError> {
        thread::sleep(self.precapture_delay);
        fs::write(output, b"precapture")?;
        self.precaptures
            .lock()
            .unwrap()
            .push((output.to_path_buf(), frames.len()));
        Ok(())
    }

    fn concatenate(&self, first: &Path, second: &Path, output: &Path) -> Result<(), CoreError> {
        self.concatenations.lock().unwrap().push((
            first.to_path_buf(),
            second.to_path_buf(),
            output.to_path_buf(),
        ));
        if self.fail_concat {
            return Err(CoreError::CommandFailed {
                program: "fake-concat".into(),
                status: "exit code 1".into(),
                stderr: "broken input".into(),
            });
        }
        fs::write(output, b"final")?;
        Ok(())
    }
}

/// Yields `count` frames, advancing the shared clock by `step` before each one.
pub(crate) struct ScriptedSource {
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) step: Duration,
    pub(crate) remaining: usize,
    pub(crate) closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub(crate) fn new(clock: Arc<ManualClock>, step: Duration, count: usize) -> Self {
        Self {
            clock,
            step,
            remaining: count,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: 8,
            height: 8,
            fps: 10,
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.clock.advance(self.step);
        Some(solid_frame(8, 8, 0, self.clock.now()))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Reports motion according to a script, then nothing.
pub(crate) struct ScriptedEngine {
    script: VecDeque<bool>,
    pub(crate) calls: usize,
}

impl ScriptedEngine {
    pub(crate) fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }
}

impl MotionEngine for ScriptedEngine {
    fn detect(&mut self, _frame: &Frame) -> DetectionResult {
        self.calls += 1;
        if self.script.pop_front().unwrap_or(false) {
            motion()
        } else {
            DetectionResult::empty()
        }
    }
}

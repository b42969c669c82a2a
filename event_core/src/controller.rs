//! Event controller: applies machine intents (hooks, pictures, recording sessions)
//! and runs the shutdown sequence.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::clock::Clock;
use crate::config::DetectorConfig;
use crate::frame::{DetectionResult, Frame, StreamInfo};
use crate::hooks::HookRunner;
use crate::logic::{EventMachine, Intent};
use crate::picture::PictureWriter;
use crate::precapture::PrecaptureBuffer;
use crate::process::ProcessGroups;
use crate::recording::{EncoderBackend, PostProcessor, RecordingSession, SessionManager};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// What every part of a run shares: the resolved configuration, the time source and the
/// process groups of running recorders.
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<DetectorConfig>,
    pub clock: Arc<dyn Clock>,
    pub recorders: ProcessGroups,
}

impl RuntimeContext {
    pub fn new(config: DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            clock,
            recorders: ProcessGroups::new(),
        }
    }
}

pub struct EventController {
    config: Arc<DetectorConfig>,
    machine: EventMachine,
    sessions: SessionManager,
    hooks: HookRunner,
    pictures: Option<PictureWriter>,
    session: Option<RecordingSession>,
    shut_down: bool,
}

impl EventController {
    pub fn new(ctx: &RuntimeContext, stream: StreamInfo, backend: Arc<dyn EncoderBackend>) -> Self {
        let config = Arc::clone(&ctx.config);
        let hooks = HookRunner::new(config.hook_timeout());
        let pictures = config
            .picture
            .enable
            .then(|| PictureWriter::new(config.picture.dirpath.clone()));
        Self {
            machine: EventMachine::new(&config),
            sessions: SessionManager::new(
                &config,
                stream,
                backend,
                hooks.clone(),
                ctx.recorders.clone(),
            ),
            hooks,
            pictures,
            session: None,
            shut_down: false,
            config,
        }
    }

    pub fn machine(&self) -> &EventMachine {
        &self.machine
    }

    pub fn current_session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn post_processor(&self) -> &PostProcessor {
        self.sessions.post_processor()
    }

    /// One frame cycle after the soak period.
    pub fn on_frame(
        &mut self,
        now: Instant,
        frame: &Frame,
        detection: &DetectionResult,
        buffer: &PrecaptureBuffer,
    ) {
        self.check_recorder(now);
        for intent in self.machine.on_detection(now, detection) {
            self.apply(now, intent, Some(frame), Some(buffer));
        }
    }

    /// A recorder that exited on its own is closed out and relaunched after the retry delay.
    fn check_recorder(&mut self, now: Instant) {
        let died = self
            .session
            .as_mut()
            .is_some_and(|session| !session.is_alive());
        if !died {
            return;
        }
        if let Some(session) = self.session.take() {
            warn!(
                "Recorder for session {} exited unexpectedly",
                session.sequence
            );
            self.sessions.stop_session(session);
            self.machine.recording_failed(now);
        }
    }

    fn apply(
        &mut self,
        now: Instant,
        intent: Intent,
        frame: Option<&Frame>,
        buffer: Option<&PrecaptureBuffer>,
    ) {
        match intent {
            Intent::LogTransition { from, to, reason } => {
                info!("Event state {from} -> {to}: {reason}");
            }
            Intent::StartEvent { regions } => {
                info!("Event started with {} motion regions", regions.len());
                self.hooks
                    .run("event start", &self.config.event.on_event_start, &[]);
                if let (Some(pictures), Some(frame)) = (&self.pictures, frame) {
                    match pictures.save(frame, &regions) {
                        Ok(path) => {
                            let name = path.display().to_string();
                            self.hooks.run(
                                "picture save",
                                &self.config.event.on_picture_save,
                                &[("filename", name.as_str())],
                            );
                        }
                        Err(e) => error!("Failed to save event picture: {e}"),
                    }
                }
            }
            Intent::StopEvent => {
                info!("Event ended");
                self.hooks
                    .run("event end", &self.config.event.on_event_end, &[]);
            }
            Intent::StartRecording => {
                if self.session.is_some() {
                    warn!("Recording already in progress, not starting another");
                    return;
                }
                let snapshot = buffer.map(PrecaptureBuffer::snapshot).unwrap_or_default();
                match self.sessions.start_session(snapshot, now) {
                    Some(session) => {
                        self.machine.recording_started(session.started_at);
                        self.session = Some(session);
                    }
                    None => self.machine.recording_failed(now),
                }
            }
            Intent::StopRecording { reason } => {
                if let Some(session) = self.session.take() {
                    info!("Stopping recording: {reason}");
                    self.sessions.stop_session(session);
                }
                self.machine.recording_stopped();
            }
        }
    }

    /// End the event, stop recording, wait for post-processing, clean temporary files.
    /// Temporary files are kept when post-processing did not finish in time.
    /// Every step runs even if an earlier one failed. Safe to call more than once.
    pub fn shutdown(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("Shutting down event controller");

        for intent in self.machine.force_idle() {
            self.apply(now, intent, None, None);
        }
        if let Some(session) = self.session.take() {
            self.sessions.stop_session(session);
        }

        let post = self.sessions.post_processor();
        if post.wait_idle(self.config.shutdown_wait()) {
            clean_dir(&self.config.tmp_dir.dirpath);
        } else {
            // Their segments and precapture clips still live in the temporary directory.
            warn!(
                "{} post-processing jobs still running after {:?}, leaving {} in place",
                post.outstanding(),
                self.config.shutdown_wait(),
                self.config.tmp_dir.dirpath.display()
            );
        }
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
fn clean_dir(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot clean temporary directory {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove {}: {e}", path.display()),
        }
    }
}

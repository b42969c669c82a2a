//! Recording sessions: one live segment recorder plus an optional precapture clip.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::DetectorConfig;
use crate::frame::{Frame, StreamInfo};
use crate::hooks::HookRunner;
use crate::recording::completion::PrecaptureCompletions;
use crate::recording::encoder::{EncoderBackend, SegmentRecorder};
use crate::process::ProcessGroups;
use crate::recording::postprocess::{PostProcessJob, PostProcessSettings, PostProcessor};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// An open recording. All filenames are fixed when the session starts.
pub struct RecordingSession {
    pub sequence: u64,
    pub segment_filename: PathBuf,
    pub precapture_filename: Option<PathBuf>,
    pub final_filename: PathBuf,
    pub started_at: Instant,
    recorder: Box<dyn SegmentRecorder>,
}

impl RecordingSession {
    pub fn is_alive(&mut self) -> bool {
        self.recorder.is_alive()
    }

    fn into_job(self) -> PostProcessJob {
        PostProcessJob {
            sequence: self.sequence,
            segment_filename: self.segment_filename,
            precapture_filename: self.precapture_filename,
            final_filename: self.final_filename,
            recorder: self.recorder,
        }
    }
}

struct SessionFiles {
    segment: PathBuf,
    precapture: Option<PathBuf>,
    final_movie: PathBuf,
}

fn session_files(
    movie_dir: &Path,
    tmp_dir: &Path,
    stamp: &str,
    sequence: u64,
    precapture: bool,
) -> SessionFiles {
    let name = |prefix: &str| format!("{prefix}_{stamp}_{sequence:04}.mp4");
    if precapture {
        SessionFiles {
            segment: tmp_dir.join(name("movie")),
            precapture: Some(tmp_dir.join(name("precapture_movie"))),
            final_movie: movie_dir.join(name("final_movie")),
        }
    } else {
        let segment = movie_dir.join(name("movie"));
        SessionFiles {
            final_movie: segment.clone(),
            segment,
            precapture: None,
        }
    }
}

pub struct SessionManager {
    backend: Arc<dyn EncoderBackend>,
    hooks: HookRunner,
    on_movie_start: String,
    movie_dir: PathBuf,
    tmp_dir: PathBuf,
    record_precapture: bool,
    stream: StreamInfo,
    completions: PrecaptureCompletions,
    post: PostProcessor,
    recorders: ProcessGroups,
    next_sequence: u64,
}

impl SessionManager {
    pub fn new(
        config: &DetectorConfig,
        stream: StreamInfo,
        backend: Arc<dyn EncoderBackend>,
        hooks: HookRunner,
        recorders: ProcessGroups,
    ) -> Self {
        let completions = PrecaptureCompletions::new();
        let post = PostProcessor::new(
            Arc::clone(&backend),
            hooks.clone(),
            config.event.on_movie_end.clone(),
            completions.clone(),
            recorders.clone(),
            PostProcessSettings {
                encoder_grace: config.stop_grace(),
                poll_interval: config.precapture_poll(),
                retries: config.movie.precapture_wait_retries,
            },
        );
        Self {
            backend,
            hooks,
            on_movie_start: config.event.on_movie_start.clone(),
            movie_dir: config.movie.dirpath.clone(),
            tmp_dir: config.tmp_dir.dirpath.clone(),
            record_precapture: config.precapture_enabled(),
            stream,
            completions,
            post,
            recorders,
            next_sequence: 1,
        }
    }

    pub fn post_processor(&self) -> &PostProcessor {
        &self.post
    }

    pub fn completions(&self) -> &PrecaptureCompletions {
        &self.completions
    }

    /// Launch the segment recorder and, with a non-empty snapshot, the precapture
    /// encode. `None` if the recorder could not be started.
    pub fn start_session(&mut self, snapshot: Vec<Frame>, now: Instant) -> Option<RecordingSession> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let precapture = self.record_precapture && !snapshot.is_empty();
        let files = session_files(&self.movie_dir, &self.tmp_dir, &stamp, sequence, precapture);

        let recorder = match self.backend.launch_segment(&files.segment, &self.stream) {
            Ok(recorder) => recorder,
            Err(e) => {
                error!("Failed to start recording session {sequence}: {e}");
                return None;
            }
        };
        info!(
            "Recording session {sequence} started: {} (pid {})",
            files.segment.display(),
            recorder.id()
        );
        self.recorders.insert(recorder.id());

        if let Some(path) = &files.precapture {
            self.spawn_precapture(sequence, snapshot, path.clone());
        }

        let final_name = files.final_movie.display().to_string();
        self.hooks.run(
            "movie start",
            &self.on_movie_start,
            &[("filename", final_name.as_str())],
        );

        Some(RecordingSession {
            sequence,
            segment_filename: files.segment,
            precapture_filename: files.precapture,
            final_filename: files.final_movie,
            started_at: now,
            recorder,
        })
    }

    fn spawn_precapture(&self, sequence: u64, frames: Vec<Frame>, path: PathBuf) {
        self.completions.register(&path);
        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();
        let stream = self.stream;
        let job_path = path.clone();
        let guard = self.post.track();
        let spawned = thread::Builder::new()
            .name(format!("precapture-{sequence}"))
            .spawn(move || {
                let _guard = guard;
                debug!(
                    "Encoding {} precapture frames into {}",
                    frames.len(),
                    job_path.display()
                );
                match backend.encode_precapture(&frames, &job_path, &stream) {
                    Ok(()) => {
                        info!("Pre-capture movie saved to {}", job_path.display());
                        completions.mark_done(&job_path);
                    }
                    Err(e) => {
                        error!("Pre-capture encoding for {} failed: {e}", job_path.display());
                        completions.mark_failed(&job_path);
                    }
                }
            });
        if let Err(e) = spawned {
            error!("Failed to start pre-capture encoding for session {sequence}: {e}");
            self.completions.mark_failed(&path);
        }
    }

    /// Signal the recorder to finalize and hand the session to post-processing.
    /// Does not wait for the recorder to exit.
    pub fn stop_session(&self, mut session: RecordingSession) {
        info!(
            "Stopping recording session {} ({})",
            session.sequence,
            session.segment_filename.display()
        );
        session.recorder.interrupt();
        self.post.submit(session.into_job());
    }
}

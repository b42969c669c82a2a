//! Background work for stopped sessions: wait for the recorder, join the precapture
//! clip in front of the segment, then run the movie end hook.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::hooks::{HookOutcome, HookRunner};
use crate::process::ProcessGroups;
use crate::recording::completion::{PrecaptureCompletions, PrecaptureStatus};
use crate::recording::encoder::{EncoderBackend, SegmentRecorder};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// A stopped session handed over by the session manager.
pub struct PostProcessJob {
    pub sequence: u64,
    pub segment_filename: PathBuf,
    pub precapture_filename: Option<PathBuf>,
    pub final_filename: PathBuf,
    pub recorder: Box<dyn SegmentRecorder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovieOutcome {
    /// No precapture clip; the segment is the movie.
    SegmentOnly,
    Concatenated,
    /// Precapture was expected but the segment alone is kept.
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct PostProcessReport {
    pub sequence: u64,
    pub final_filename: PathBuf,
    pub outcome: MovieOutcome,
    pub hook: HookOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct PostProcessSettings {
    pub encoder_grace: Duration,
    pub poll_interval: Duration,
    pub retries: u32,
}

#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn begin(self: &Arc<Self>) -> OutstandingGuard {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        OutstandingGuard(Arc::clone(self))
    }
}

/// Decrements the outstanding count even if the job panics.
pub(crate) struct OutstandingGuard(Arc<Outstanding>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        self.0.idle.notify_all();
    }
}

#[derive(Clone)]
pub struct PostProcessor {
    backend: Arc<dyn EncoderBackend>,
    hooks: HookRunner,
    on_movie_end: String,
    completions: PrecaptureCompletions,
    recorders: ProcessGroups,
    settings: PostProcessSettings,
    outstanding: Arc<Outstanding>,
    subscribers: Arc<Mutex<Vec<Sender<PostProcessReport>>>>,
}

impl PostProcessor {
    pub fn new(
        backend: Arc<dyn EncoderBackend>,
        hooks: HookRunner,
        on_movie_end: String,
        completions: PrecaptureCompletions,
        recorders: ProcessGroups,
        settings: PostProcessSettings,
    ) -> Self {
        Self {
            backend,
            hooks,
            on_movie_end,
            completions,
            recorders,
            settings,
            outstanding: Arc::new(Outstanding::default()),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Receive a report for every job finished from now on.
    pub fn subscribe(&self) -> Receiver<PostProcessReport> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Run the job on its own thread. Returns immediately.
    pub fn submit(&self, job: PostProcessJob) {
        let guard = self.outstanding.begin();
        let worker = self.clone();
        let sequence = job.sequence;
        let spawned = thread::Builder::new()
            .name(format!("postprocess-{sequence}"))
            .spawn(move || {
                let _guard = guard;
                worker.process(job);
            });
        if let Err(e) = spawned {
            // The closure (and the job inside it) is gone with the failed spawn.
            error!("Failed to start post-processing for session {sequence}: {e}");
        }
    }

    /// Count other background work (precapture encodes) as outstanding until the guard drops.
    pub(crate) fn track(&self) -> OutstandingGuard {
        self.outstanding.begin()
    }

    pub fn outstanding(&self) -> usize {
        *self
            .outstanding
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every submitted job finished or `timeout` passed. True when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self
            .outstanding
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (count, _) = self
            .outstanding
            .idle
            .wait_timeout_while(count, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }

    pub(crate) fn process(&self, mut job: PostProcessJob) -> PostProcessReport {
        if let Err(e) = job.recorder.finish(self.settings.encoder_grace) {
            error!(
                "Failed to stop recorder for {}: {e}",
                job.segment_filename.display()
            );
        }
        self.recorders.remove(job.recorder.id());
        info!("Movie segment saved to {}", job.segment_filename.display());

        let (final_filename, outcome) = match job.precapture_filename.as_deref() {
            None => (job.segment_filename.clone(), MovieOutcome::SegmentOnly),
            Some(precapture) => {
                let resolved = self.join_precapture(precapture, &job);
                self.completions.forget(precapture);
                resolved
            }
        };
        if let MovieOutcome::Fallback(reason) = &outcome {
            warn!(
                "Session {}: keeping segment {} without precapture ({reason})",
                job.sequence,
                final_filename.display()
            );
        }

        let filename = final_filename.display().to_string();
        let hook = self
            .hooks
            .run("movie end", &self.on_movie_end, &[("filename", filename.as_str())]);

        let report = PostProcessReport {
            sequence: job.sequence,
            final_filename,
            outcome,
            hook,
        };
        self.publish(&report);
        report
    }

    fn join_precapture(&self, precapture: &Path, job: &PostProcessJob) -> (PathBuf, MovieOutcome) {
        let fallback = |reason: String| {
            (
                job.segment_filename.clone(),
                MovieOutcome::Fallback(reason),
            )
        };

        match self.completions.wait(
            precapture,
            self.settings.poll_interval,
            self.settings.retries,
        ) {
            PrecaptureStatus::Done => {}
            PrecaptureStatus::Failed => return fallback("precapture encoding failed".into()),
            PrecaptureStatus::Pending => {
                return fallback(format!(
                    "precapture {} not finished after {} checks",
                    precapture.display(),
                    self.settings.retries
                ))
            }
        }

        match self
            .backend
            .concatenate(precapture, &job.segment_filename, &job.final_filename)
        {
            Ok(()) => {
                info!("Movie saved to {}", job.final_filename.display());
                for temp in [precapture, job.segment_filename.as_path()] {
                    if let Err(e) = fs::remove_file(temp) {
                        debug!("Could not remove {}: {e}", temp.display());
                    }
                }
                (job.final_filename.clone(), MovieOutcome::Concatenated)
            }
            Err(e) => fallback(format!("concatenation failed: {e}")),
        }
    }

    fn publish(&self, report: &PostProcessReport) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(report.clone()).is_ok());
    }
}

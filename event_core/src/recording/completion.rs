//! Completion table shared between precapture encode jobs and post-processing.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecaptureStatus {
    Pending,
    Done,
    Failed,
}

/// Maps a precapture file to the state of the job writing it.
/// Cloning shares the same table.
#[derive(Clone, Default)]
pub struct PrecaptureCompletions {
    inner: Arc<(Mutex<HashMap<PathBuf, PrecaptureStatus>>, Condvar)>,
}

impl PrecaptureCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<PathBuf, PrecaptureStatus>> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, path: &Path) {
        self.table()
            .insert(path.to_path_buf(), PrecaptureStatus::Pending);
    }

    /// Only registered entries are updated; a job finishing after its entry was
    /// forgotten leaves no trace.
    fn finish(&self, path: &Path, status: PrecaptureStatus) {
        if let Some(entry) = self.table().get_mut(path) {
            *entry = status;
        }
        self.inner.1.notify_all();
    }

    pub fn mark_done(&self, path: &Path) {
        self.finish(path, PrecaptureStatus::Done);
    }

    pub fn mark_failed(&self, path: &Path) {
        self.finish(path, PrecaptureStatus::Failed);
    }

    pub fn status(&self, path: &Path) -> Option<PrecaptureStatus> {
        self.table().get(path).copied()
    }

    /// Drop the entry once post-processing has consumed it.
    pub fn forget(&self, path: &Path) {
        self.table().remove(path);
    }

    /// Poll for a final status up to `retries` times, `interval` apart. A completion
    /// wakes the waiter early. Returns `Pending` if the job never finished in time.
    pub fn wait(&self, path: &Path, interval: Duration, retries: u32) -> PrecaptureStatus {
        let (lock, cvar) = &*self.inner;
        // No deadline if the bound does not fit in an Instant.
        let deadline = interval
            .checked_mul(retries)
            .and_then(|total| Instant::now().checked_add(total));
        let mut table = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match table.get(path) {
                Some(PrecaptureStatus::Done) => return PrecaptureStatus::Done,
                Some(PrecaptureStatus::Failed) => return PrecaptureStatus::Failed,
                _ => {}
            }
            let now = Instant::now();
            let timeout = match deadline {
                Some(deadline) if now >= deadline => return PrecaptureStatus::Pending,
                Some(deadline) => interval.min(deadline - now),
                None => interval,
            };
            debug!("Waiting for pre-capture movie {}", path.display());
            table = cvar
                .wait_timeout(table, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn register_then_complete() {
        let table = PrecaptureCompletions::new();
        let path = Path::new("/tmp/pre_1.mp4");
        assert_eq!(table.status(path), None);
        table.register(path);
        assert_eq!(table.status(path), Some(PrecaptureStatus::Pending));
        table.mark_done(path);
        assert_eq!(table.status(path), Some(PrecaptureStatus::Done));
        table.forget(path);
        assert_eq!(table.status(path), None);
        table.mark_done(path);
        assert_eq!(table.status(path), None);
    }

    #[test]
    fn wait_times_out_as_pending() {
        let table = PrecaptureCompletions::new();
        let path = Path::new("/tmp/pre_2.mp4");
        table.register(path);
        let started = Instant::now();
        let status = table.wait(path, Duration::from_millis(20), 3);
        assert_eq!(status, PrecaptureStatus::Pending);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn overflowing_bound_still_waits_for_completion() {
        let table = PrecaptureCompletions::new();
        let path = PathBuf::from("/tmp/pre_big.mp4");
        table.register(&path);
        let writer = {
            let table = table.clone();
            let path = path.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                table.mark_done(&path);
            })
        };
        let status = table.wait(&path, Duration::from_millis(10), u32::MAX);
        writer.join().unwrap();
        assert_eq!(status, PrecaptureStatus::Done);

        let huge = Duration::from_secs(u64::MAX / 2);
        assert_eq!(table.wait(&path, huge, 2), PrecaptureStatus::Done);
    }

    #[test]
    fn waiter_is_woken_by_another_thread() {
        let table = PrecaptureCompletions::new();
        let path = PathBuf::from("/tmp/pre_3.mp4");
        table.register(&path);

        let writer = {
            let table = table.clone();
            let path = path.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                table.mark_failed(&path);
            })
        };
        let started = Instant::now();
        let status = table.wait(&path, Duration::from_secs(1), 30);
        writer.join().unwrap();
        assert_eq!(status, PrecaptureStatus::Failed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn concurrent_jobs_do_not_interfere() {
        let table = PrecaptureCompletions::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = table.clone();
                thread::spawn(move || {
                    let path = PathBuf::from(format!("/tmp/pre_{i}.mp4"));
                    table.register(&path);
                    table.mark_done(&path);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..8 {
            let path = PathBuf::from(format!("/tmp/pre_{i}.mp4"));
            assert_eq!(
                table.wait(&path, Duration::from_millis(1), 1),
                PrecaptureStatus::Done
            );
        }
    }
}

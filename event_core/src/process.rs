//! Helpers for child processes that run in their own process group.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Send `signal` to every process in the child's group.
/// Children are spawned with `process_group(0)`, so the group id is the child's pid.
pub fn signal_group(child: &Child, signal: Signal) -> nix::Result<()> {
    killpg(Pid::from_raw(child.id() as i32), signal)
}

/// Poll the child until it exits or `deadline` passes. `Ok(None)` means still running.
pub fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Wait up to `grace`, then kill the whole group and reap the child.
pub fn wait_or_kill(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = wait_until(child, Instant::now() + grace)? {
        return Ok(status);
    }
    warn!(
        "Process {} still running after {:?}, sending SIGKILL to its group",
        child.id(),
        grace
    );
    if let Err(e) = signal_group(child, Signal::SIGKILL) {
        // The group may already be gone; fall back to the direct child.
        debug!("killpg({}) failed: {e}", child.id());
        let _ = child.kill();
    }
    child.wait()
}

pub fn describe(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => format!("{status}"),
    }
}

/// Process groups that are still running, shared with whoever may have to take them down
/// without waiting for the frame loop (a forced exit).
#[derive(Debug, Clone, Default)]
pub struct ProcessGroups(Arc<Mutex<HashSet<i32>>>);

impl ProcessGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn groups(&self) -> MutexGuard<'_, HashSet<i32>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track the group led by `pid`. Ids 0 and 1 never name a child group and are ignored.
    pub fn insert(&self, pid: u32) {
        if pid > 1 {
            self.groups().insert(pid as i32);
        }
    }

    pub fn remove(&self, pid: u32) {
        self.groups().remove(&(pid as i32));
    }

    pub fn len(&self) -> usize {
        self.groups().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }

    /// SIGINT every tracked group, give them `grace` to go away, then SIGKILL what is left.
    /// Leaves the set empty.
    pub fn terminate_all(&self, grace: Duration) {
        let groups: Vec<i32> = self.groups().drain().collect();
        if groups.is_empty() {
            return;
        }
        for &group in &groups {
            info!("Sending SIGINT to process group {group}");
            if let Err(e) = killpg(Pid::from_raw(group), Signal::SIGINT) {
                debug!("SIGINT to group {group} failed: {e}");
            }
        }

        let deadline = Instant::now() + grace;
        let mut remaining = groups;
        loop {
            // Signal 0 only checks that some member of the group still exists.
            remaining.retain(|&group| killpg(Pid::from_raw(group), None::<Signal>).is_ok());
            let now = Instant::now();
            if remaining.is_empty() || now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
        for group in remaining {
            warn!("Process group {group} still running after {grace:?}, sending SIGKILL");
            if let Err(e) = killpg(Pid::from_raw(group), Signal::SIGKILL) {
                debug!("SIGKILL to group {group} failed: {e}");
            }
        }
    }
}

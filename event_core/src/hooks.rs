//! External hook commands (event start/end, movie start/end, picture saved).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::process::{describe, signal_group, wait_until};
use nix::sys::signal::Signal;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Result of one hook invocation. Hooks never fail the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

impl HookOutcome {
    fn skipped() -> Self {
        Self {
            success: true,
            exit_code: None,
            output: String::new(),
        }
    }

    fn failed(output: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            output,
        }
    }
}

/// Replace each `{name}` with its value. Unknown placeholders are left as they are.
pub fn substitute(template: &str, substitutions: &[(&str, &str)]) -> String {
    substitutions
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}

/// Runs hook templates through `sh -c`, blocking the caller for at most `timeout`.
#[derive(Debug, Clone)]
pub struct HookRunner {
    timeout: Duration,
}

impl HookRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn run(&self, name: &str, template: &str, substitutions: &[(&str, &str)]) -> HookOutcome {
        if template.trim().is_empty() {
            return HookOutcome::skipped();
        }
        let command = substitute(template, substitutions);
        info!("Running {name} hook: {command}");

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start {name} hook `{command}`: {e}");
                return HookOutcome::failed(e.to_string());
            }
        };

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match wait_until(&mut child, Instant::now() + self.timeout) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                error!(
                    "{name} hook `{command}` did not finish within {:?}, killing it",
                    self.timeout
                );
                if let Err(e) = signal_group(&child, Signal::SIGKILL) {
                    debug!("killpg for {name} hook failed: {e}");
                    let _ = child.kill();
                }
                let _ = child.wait();
                None
            }
            Err(e) => {
                error!("Failed to wait for {name} hook `{command}`: {e}");
                let _ = child.kill();
                let _ = child.wait();
                None
            }
        };

        let stdout = stdout.map(join_output).unwrap_or_default();
        let stderr = stderr.map(join_output).unwrap_or_default();

        match status {
            Some(status) if status.success() => {
                debug!("{name} hook output: {}", stdout.trim_end());
                HookOutcome {
                    success: true,
                    exit_code: status.code(),
                    output: stdout,
                }
            }
            Some(status) => {
                let output = if stderr.trim().is_empty() { stdout } else { stderr };
                error!(
                    "{name} hook `{command}` failed with {}: {}",
                    describe(&status),
                    output.trim_end()
                );
                HookOutcome {
                    success: false,
                    exit_code: status.code(),
                    output,
                }
            }
            None => HookOutcome::failed(stderr),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

//! External encoder processes: the live segment recorder, the precapture encoder
//! and the concatenation tool, all driven from argv templates.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::DetectorConfig;
use crate::error::CoreError;
use crate::frame::{Frame, StreamInfo};
use crate::hooks::substitute;
use crate::process::{describe, signal_group, wait_or_kill};
use nix::sys::signal::Signal;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

/// Upper bound for the one-shot tools (precapture encode, concatenation).
const TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// A running recorder for one live segment.
pub trait SegmentRecorder: Send {
    fn id(&self) -> u32;

    fn is_alive(&mut self) -> bool;

    /// Ask the recorder to finalize its file. Does not wait.
    fn interrupt(&mut self);

    /// Wait up to `grace` for the recorder to exit, then force it down.
    fn finish(&mut self, grace: Duration) -> Result<(), CoreError>;
}

/// Everything the session manager and post-processing need from the encoder tooling.
pub trait EncoderBackend: Send + Sync {
    fn launch_segment(
        &self,
        output: &Path,
        stream: &StreamInfo,
    ) -> Result<Box<dyn SegmentRecorder>, CoreError>;

    fn encode_precapture(
        &self,
        frames: &[Frame],
        output: &Path,
        stream: &StreamInfo,
    ) -> Result<(), CoreError>;

    /// Join `first` then `second` into `output`.
    fn concatenate(&self, first: &Path, second: &Path, output: &Path) -> Result<(), CoreError>;
}

/// Child process in its own process group, so signals reach the whole pipeline it spawns.
pub struct EncoderProcess {
    child: Child,
    program: String,
    output: PathBuf,
    interrupted: bool,
}

impl EncoderProcess {
    pub fn spawn(argv: &[String], output: &Path) -> Result<Self, CoreError> {
        let (program, args) = argv
            .split_first()
            .ok_or(CoreError::EmptyCommand("segment recorder"))?;
        debug!("Launching recorder: {}", argv.join(" "));
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| CoreError::Launch {
                program: program.clone(),
                output: output.to_path_buf(),
                source,
            })?;
        Ok(Self {
            child,
            program: program.clone(),
            output: output.to_path_buf(),
            interrupted: false,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl SegmentRecorder for EncoderProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn interrupt(&mut self) {
        if self.interrupted {
            return;
        }
        self.interrupted = true;
        if let Err(e) = signal_group(&self.child, Signal::SIGINT) {
            debug!("SIGINT to {} ({}) failed: {e}", self.program, self.child.id());
        }
    }

    fn finish(&mut self, grace: Duration) -> Result<(), CoreError> {
        self.interrupt();
        let status = wait_or_kill(&mut self.child, grace)?;
        if status.success() {
            debug!("{} finished {}", self.program, self.output.display());
        } else {
            warn!(
                "{} recording {} exited with {}",
                self.program,
                self.output.display(),
                describe(&status)
            );
        }
        Ok(())
    }
}

/// Backend that runs configured command lines. Placeholders: `{device}`, `{width}`,
/// `{height}`, `{fps}`, `{output}`, plus `{list}`, `{first}`, `{second}` for concatenation.
pub struct CommandBackend {
    segment_command: Vec<String>,
    precapture_command: Vec<String>,
    concat_command: Vec<String>,
    device: String,
    repeat: u32,
    work_dir: PathBuf,
}

impl CommandBackend {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            segment_command: config.movie.segment_command.clone(),
            precapture_command: config.movie.precapture_command.clone(),
            concat_command: config.movie.concat_command.clone(),
            device: config.recording_device().to_string(),
            repeat: config.movie.precapture_repeat.max(1),
            work_dir: config.tmp_dir.dirpath.clone(),
        }
    }

    fn render(template: &[String], substitutions: &[(&str, &str)]) -> Vec<String> {
        template
            .iter()
            .map(|part| substitute(part, substitutions))
            .collect()
    }

    fn stream_substitutions<'a>(
        &'a self,
        stream: &'a StreamNumbers,
        output: &'a str,
    ) -> [(&'static str, &'a str); 5] {
        [
            ("device", self.device.as_str()),
            ("width", stream.width.as_str()),
            ("height", stream.height.as_str()),
            ("fps", stream.fps.as_str()),
            ("output", output),
        ]
    }
}

struct StreamNumbers {
    width: String,
    height: String,
    fps: String,
}

impl From<&StreamInfo> for StreamNumbers {
    fn from(stream: &StreamInfo) -> Self {
        Self {
            width: stream.width.to_string(),
            height: stream.height.to_string(),
            fps: stream.fps.to_string(),
        }
    }
}

/// A one-shot tool whose stderr is drained in the background.
struct Tool {
    child: Child,
    program: String,
    stderr: Option<thread::JoinHandle<String>>,
}

impl Tool {
    fn spawn(
        argv: &[String],
        stdin: Stdio,
        name: &'static str,
        output: &Path,
    ) -> Result<Self, CoreError> {
        let (program, args) = argv.split_first().ok_or(CoreError::EmptyCommand(name))?;
        debug!("Running {name}: {}", argv.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|source| CoreError::Launch {
                program: program.clone(),
                output: output.to_path_buf(),
                source,
            })?;
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        Ok(Self {
            child,
            program: program.clone(),
            stderr,
        })
    }

    /// Reap the tool; a non-zero exit becomes an error carrying its stderr.
    fn finish(mut self) -> Result<(), CoreError> {
        let status: ExitStatus = wait_or_kill(&mut self.child, TOOL_TIMEOUT)?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(CoreError::CommandFailed {
                program: self.program,
                status: describe(&status),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

/// Concat demuxer list entry. Single quotes are closed, escaped and reopened.
fn list_entry(path: &Path) -> String {
    format!("file '{}'\n", path.display().to_string().replace('\'', r"'\''"))
}

impl EncoderBackend for CommandBackend {
    fn launch_segment(
        &self,
        output: &Path,
        stream: &StreamInfo,
    ) -> Result<Box<dyn SegmentRecorder>, CoreError> {
        let numbers = StreamNumbers::from(stream);
        let output_str = output.display().to_string();
        let argv = Self::render(
            &self.segment_command,
            &self.stream_substitutions(&numbers, &output_str),
        );
        Ok(Box::new(EncoderProcess::spawn(&argv, output)?))
    }

    fn encode_precapture(
        &self,
        frames: &[Frame],
        output: &Path,
        stream: &StreamInfo,
    ) -> Result<(), CoreError> {
        let numbers = StreamNumbers::from(stream);
        let output_str = output.display().to_string();
        let argv = Self::render(
            &self.precapture_command,
            &self.stream_substitutions(&numbers, &output_str),
        );
        let mut tool = Tool::spawn(&argv, Stdio::piped(), "precapture encoder", output)?;

        if let Some(mut stdin) = tool.child.stdin.take() {
            let mut written = 0usize;
            'frames: for frame in frames {
                if frame.width() != stream.width || frame.height() != stream.height {
                    warn!(
                        "Skipping {}x{} frame in {}x{} precapture",
                        frame.width(),
                        frame.height(),
                        stream.width,
                        stream.height
                    );
                    continue;
                }
                for _ in 0..self.repeat {
                    if let Err(e) = stdin.write_all(frame.as_bytes()) {
                        // The encoder died; its exit status below tells why.
                        warn!("Precapture encoder stopped reading input: {e}");
                        break 'frames;
                    }
                    written += 1;
                }
            }
            debug!("Wrote {written} precapture frames to {}", output.display());
        }

        tool.finish()
    }

    fn concatenate(&self, first: &Path, second: &Path, output: &Path) -> Result<(), CoreError> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "movie".into());
        let list = self.work_dir.join(format!("concat_{stem}.txt"));
        fs::write(&list, list_entry(first) + &list_entry(second))?;

        let list_str = list.display().to_string();
        let first_str = first.display().to_string();
        let second_str = second.display().to_string();
        let output_str = output.display().to_string();
        let argv = Self::render(
            &self.concat_command,
            &[
                ("list", list_str.as_str()),
                ("first", first_str.as_str()),
                ("second", second_str.as_str()),
                ("output", output_str.as_str()),
            ],
        );

        let result =
            Tool::spawn(&argv, Stdio::null(), "concatenation", output).and_then(Tool::finish);
        if let Err(e) = fs::remove_file(&list) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {e}", list.display());
            }
        }
        result
    }
}

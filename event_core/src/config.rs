//! Detector configuration: every section has defaults so partial files load.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::CoreError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub movie: MovieConfig,
    pub picture: PictureConfig,
    pub tmp_dir: TmpDirConfig,
    pub event: EventConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_area: u32,
    pub max_area: u32,
    /// Per-pixel difference (0-255) counted as foreground.
    pub threshold: u8,
    pub background_history: u32,
    /// Odd Gaussian kernel size.
    pub blur_size: u32,
    pub dilate_iterations: u8,
    /// Debounce threshold.
    pub consecutive_frames: u32,
    pub soak_seconds: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: 500,
            max_area: 5000,
            threshold: 25,
            background_history: 500,
            blur_size: 21,
            dilate_iterations: 2,
            consecutive_frames: 3,
            soak_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovieConfig {
    pub enable: bool,
    pub dirpath: PathBuf,
    /// Recording device; falls back to `camera.device`.
    pub device: Option<String>,
    pub precapture_seconds: f64,
    pub record_precapture: bool,
    /// Each buffered frame is submitted this many times to the precapture encoder.
    pub precapture_repeat: u32,
    pub max_duration: f64,
    pub launch_retry_seconds: f64,
    pub stop_grace_seconds: f64,
    pub shutdown_wait_seconds: f64,
    pub precapture_poll_seconds: f64,
    pub precapture_wait_retries: u32,
    pub segment_command: Vec<String>,
    pub precapture_command: Vec<String>,
    pub concat_command: Vec<String>,
}

impl Default for MovieConfig {
    fn default() -> Self {
        Self {
            enable: true,
            dirpath: PathBuf::from("/tmp/motionwatch/movies"),
            device: None,
            precapture_seconds: 5.0,
            record_precapture: true,
            precapture_repeat: 4,
            max_duration: 60.0,
            launch_retry_seconds: 5.0,
            stop_grace_seconds: 10.0,
            shutdown_wait_seconds: 180.0,
            precapture_poll_seconds: 1.0,
            precapture_wait_retries: 30,
            segment_command: argv(&[
                "gst-launch-1.0",
                "-e",
                "v4l2src",
                "device={device}",
                "!",
                "video/x-raw,framerate={fps}/1,width={width},height={height}",
                "!",
                "videoconvert",
                "!",
                "clockoverlay",
                "time-format=%Y-%m-%d_%H:%M:%S",
                "!",
                "x264enc",
                "speed-preset=ultrafast",
                "tune=zerolatency",
                "!",
                "mp4mux",
                "!",
                "queue",
                "!",
                "filesink",
                "location={output}",
            ]),
            precapture_command: argv(&[
                "ffmpeg",
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                "{width}x{height}",
                "-r",
                "{fps}",
                "-i",
                "pipe:0",
                "-vf",
                "drawtext=text=TRIGGER:x=10:y=10:fontcolor=white",
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-pix_fmt",
                "yuv420p",
                "{output}",
            ]),
            concat_command: argv(&[
                "ffmpeg",
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                "{list}",
                "-c",
                "copy",
                "{output}",
            ]),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PictureConfig {
    pub enable: bool,
    pub dirpath: PathBuf,
}

impl Default for PictureConfig {
    fn default() -> Self {
        Self {
            enable: true,
            dirpath: PathBuf::from("/tmp/motionwatch/pictures"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TmpDirConfig {
    pub dirpath: PathBuf,
}

impl Default for TmpDirConfig {
    fn default() -> Self {
        Self {
            dirpath: PathBuf::from("/tmp/motionwatch/tmp"),
        }
    }
}

/// Hook templates are run through `sh -c` with `{filename}` substituted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub no_motion_timeout: f64,
    pub hook_timeout_seconds: f64,
    pub on_event_start: String,
    pub on_event_end: String,
    pub on_movie_start: String,
    pub on_movie_end: String,
    pub on_picture_save: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            no_motion_timeout: 20.0,
            hook_timeout_seconds: 30.0,
            on_event_start: String::new(),
            on_event_end: String::new(),
            on_movie_start: String::new(),
            on_movie_end: String::new(),
            on_picture_save: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Longest duration any setting may take: one week.
const MAX_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: String| Err(CoreError::InvalidConfig(msg));

        if self.camera.width == 0 || self.camera.height == 0 {
            return invalid(format!(
                "camera size {}x{} must be non-zero",
                self.camera.width, self.camera.height
            ));
        }
        if self.camera.fps == 0 {
            return invalid("camera.fps must be positive".into());
        }
        if self.detection.consecutive_frames == 0 {
            return invalid("detection.consecutive_frames must be at least 1".into());
        }
        if self.detection.min_area >= self.detection.max_area {
            return invalid(format!(
                "detection.min_area ({}) must be below detection.max_area ({})",
                self.detection.min_area, self.detection.max_area
            ));
        }
        if self.detection.background_history == 0 {
            return invalid("detection.background_history must be positive".into());
        }

        let durations = [
            ("detection.soak_seconds", self.detection.soak_seconds),
            ("movie.precapture_seconds", self.movie.precapture_seconds),
            ("movie.launch_retry_seconds", self.movie.launch_retry_seconds),
            ("movie.stop_grace_seconds", self.movie.stop_grace_seconds),
            ("movie.shutdown_wait_seconds", self.movie.shutdown_wait_seconds),
            ("movie.precapture_poll_seconds", self.movie.precapture_poll_seconds),
            ("event.no_motion_timeout", self.event.no_motion_timeout),
            ("event.hook_timeout_seconds", self.event.hook_timeout_seconds),
            ("movie.max_duration", self.movie.max_duration),
        ];
        for (name, value) in durations {
            if !value.is_finite() || !(0.0..=MAX_SECONDS).contains(&value) {
                return invalid(format!(
                    "{name} must be between 0 and {MAX_SECONDS} seconds, got {value}"
                ));
            }
        }
        if self.movie.max_duration <= 0.0 {
            return invalid("movie.max_duration must be positive".into());
        }

        if self.movie.enable {
            if self.movie.segment_command.is_empty() {
                return Err(CoreError::EmptyCommand("movie.segment_command"));
            }
            if self.precapture_enabled() {
                if self.movie.precapture_command.is_empty() {
                    return Err(CoreError::EmptyCommand("movie.precapture_command"));
                }
                if self.movie.concat_command.is_empty() {
                    return Err(CoreError::EmptyCommand("movie.concat_command"));
                }
            }
        }

        // The temporary directory is emptied on shutdown.
        let tmp = &self.tmp_dir.dirpath;
        if tmp.as_os_str().is_empty() || tmp == &self.movie.dirpath || tmp == &self.picture.dirpath
        {
            return invalid(format!(
                "tmp_dir.dirpath {} must be a dedicated directory",
                tmp.display()
            ));
        }
        Ok(())
    }

    pub fn precapture_enabled(&self) -> bool {
        self.movie.record_precapture && self.precapture_capacity() > 0
    }

    /// Frames kept in the precapture buffer: `precapture_seconds * fps`.
    pub fn precapture_capacity(&self) -> usize {
        (self.movie.precapture_seconds.max(0.0) * self.camera.fps as f64).round() as usize
    }

    pub fn recording_device(&self) -> &str {
        self.movie.device.as_deref().unwrap_or(&self.camera.device)
    }

    pub fn soak_period(&self) -> Duration {
        seconds(self.detection.soak_seconds)
    }

    pub fn no_motion_timeout(&self) -> Duration {
        seconds(self.event.no_motion_timeout)
    }

    pub fn max_duration(&self) -> Duration {
        seconds(self.movie.max_duration)
    }

    pub fn launch_retry(&self) -> Duration {
        seconds(self.movie.launch_retry_seconds)
    }

    pub fn stop_grace(&self) -> Duration {
        seconds(self.movie.stop_grace_seconds)
    }

    pub fn shutdown_wait(&self) -> Duration {
        seconds(self.movie.shutdown_wait_seconds)
    }

    pub fn precapture_poll(&self) -> Duration {
        seconds(self.movie.precapture_poll_seconds)
    }

    pub fn hook_timeout(&self) -> Duration {
        seconds(self.event.hook_timeout_seconds)
    }
}

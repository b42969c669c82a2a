//! Frame source backed by an ffmpeg process that decodes the camera into raw RGB24 frames
//! on its stdout.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{anyhow, Error};
use image::RgbImage;
use motionwatch_event_core::config::CameraConfig;
use motionwatch_event_core::process::{describe, signal_group, wait_or_kill};
use motionwatch_event_core::{Frame, FrameSource, StreamInfo};
use nix::sys::signal::Signal;
use std::io::{BufReader, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct FfmpegCamera {
    child: Child,
    reader: BufReader<ChildStdout>,
    stream: StreamInfo,
    frame_size: usize,
    seq: u64,
}

impl FfmpegCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, Error> {
        let stream = StreamInfo {
            width: config.width,
            height: config.height,
            fps: config.fps,
        };
        Self::spawn(&Self::command_line(config), stream)
    }

    /// ffmpeg arguments: v4l2 input for `/dev/` devices, anything ffmpeg can open otherwise.
    pub fn command_line(config: &CameraConfig) -> Vec<String> {
        let size = format!("{}x{}", config.width, config.height);
        let fps = config.fps.to_string();
        let mut argv: Vec<String> = ["ffmpeg", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if config.device.starts_with("/dev/") {
            argv.extend(
                ["-f", "v4l2", "-framerate", &fps, "-video_size", &size]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        argv.extend(
            [
                "-i",
                &config.device,
                "-an",
                "-vf",
                &format!("scale={}:{},fps={}", config.width, config.height, fps),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        argv
    }

    pub(crate) fn spawn(argv: &[String], stream: StreamInfo) -> Result<Self, Error> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Empty camera command"))?;
        info!("Opening camera: {}", argv.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture stdout from {program}"))?;

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
            frame_size: stream.width as usize * stream.height as usize * 3,
            stream,
            seq: 0,
        })
    }

    /// Pid of the ffmpeg process, which is also its process group id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl FrameSource for FfmpegCamera {
    fn stream_info(&self) -> StreamInfo {
        self.stream
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let mut data = vec![0u8; self.frame_size];
        if let Err(e) = self.reader.read_exact(&mut data) {
            error!("Camera stream ended after {} frames: {e}", self.seq);
            return None;
        }
        self.seq += 1;
        let image = RgbImage::from_raw(self.stream.width, self.stream.height, data)?;
        Some(Frame::new(image, Instant::now()))
    }

    fn close(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        debug!("Stopping camera process {}", self.child.id());
        if let Err(e) = signal_group(&self.child, Signal::SIGTERM) {
            debug!("SIGTERM to camera process failed: {e}");
        }
        match wait_or_kill(&mut self.child, CLOSE_GRACE) {
            Ok(status) => debug!("Camera process exited with {}", describe(&status)),
            Err(e) => warn!("Failed to reap camera process: {e}"),
        }
    }
}

//! motionwatch camera hub.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

mod camera;
mod config;
mod motion;

use crate::camera::FfmpegCamera;
use crate::motion::BackgroundMotionEngine;
use anyhow::Context;
use docopt::Docopt;
use env_logger::{Builder, Env, Target};
use motionwatch_event_core::recording::CommandBackend;
use motionwatch_event_core::{
    DetectorConfig, EventController, FrameLoop, FrameSource, LoopExit, MonotonicClock,
    ProcessGroups, RuntimeContext, ShutdownHandle,
};
use nix::sys::signal::{SigSet, Signal};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::exit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const USAGE: &str = "
motionwatch camera hub: watches a camera for motion, records each event to a movie and runs hooks.

Usage:
  motionwatch-camera-hub --config=<file> [--dry-run] [--log-output=<file>]
  motionwatch-camera-hub (--version | -v)
  motionwatch-camera-hub (--help | -h)

Options:
    --config=<file>       YAML configuration file
    --dry-run             Load the configuration, create directories and exit
    --log-output=<file>   Append log lines to a file instead of stderr
    --version, -v         Show version
    --help, -h            Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    flag_config: String,
    flag_dry_run: bool,
    flag_log_output: Option<String>,
}

fn init_logging(level: &str, output: Option<&str>) -> io::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    builder.format_timestamp_millis();
    if let Some(path) = output {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

const FORCED_STOP_GRACE: Duration = Duration::from_secs(2);

/// First signal requests a clean stop. A second one stops every live recorder and camera
/// process group, then exits.
struct SignalPolicy {
    received: AtomicUsize,
    shutdown: ShutdownHandle,
    recorders: ProcessGroups,
}

impl SignalPolicy {
    fn new(shutdown: ShutdownHandle, recorders: ProcessGroups) -> Self {
        Self {
            received: AtomicUsize::new(0),
            shutdown,
            recorders,
        }
    }

    /// Returns true when the process should exit now.
    fn on_signal(&self) -> bool {
        if self.received.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("Received termination signal, shutting down");
            self.shutdown.stop();
            return false;
        }
        warn!(
            "Received second termination signal, stopping {} process groups and exiting",
            self.recorders.len()
        );
        self.recorders.terminate_all(FORCED_STOP_GRACE);
        true
    }
}

/// ctrlc covers SIGINT, SIGTERM and SIGHUP. SIGQUIT is blocked here and taken by a
/// dedicated thread, so this must run before any other thread is spawned.
fn install_signal_handlers(policy: Arc<SignalPolicy>) -> anyhow::Result<()> {
    let mut quit = SigSet::empty();
    quit.add(Signal::SIGQUIT);
    quit.thread_block().context("Failed to block SIGQUIT")?;
    let quit_policy = Arc::clone(&policy);
    thread::Builder::new()
        .name("sigquit".into())
        .spawn(move || loop {
            match quit.wait() {
                Ok(_) => {
                    if quit_policy.on_signal() {
                        exit(130);
                    }
                }
                Err(e) => {
                    error!("Waiting for SIGQUIT failed: {e}");
                    return;
                }
            }
        })
        .context("Failed to start SIGQUIT thread")?;

    ctrlc::set_handler(move || {
        if policy.on_signal() {
            exit(130);
        }
    })
    .context("Failed to install signal handler")
}

fn run(config: DetectorConfig) -> anyhow::Result<LoopExit> {
    let shutdown = ShutdownHandle::new();
    let ctx = RuntimeContext::new(config, Arc::new(MonotonicClock));
    install_signal_handlers(Arc::new(SignalPolicy::new(
        shutdown.clone(),
        ctx.recorders.clone(),
    )))?;

    let camera = FfmpegCamera::open(&ctx.config.camera).context("Failed to open camera")?;
    ctx.recorders.insert(camera.id());
    let stream = camera.stream_info();
    info!(
        "Camera stream {}x{} at {} fps",
        stream.width, stream.height, stream.fps
    );

    let engine = BackgroundMotionEngine::new(&ctx.config.detection);
    let backend = Arc::new(CommandBackend::from_config(&ctx.config));
    let controller = EventController::new(&ctx, stream, backend);

    let mut frame_loop = FrameLoop::new(ctx, camera, engine, controller, shutdown);
    Ok(frame_loop.run())
}

fn main() {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config = match config::load_config(Path::new(&args.flag_config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            exit(1);
        }
    };

    if let Err(e) = init_logging(&config.log.level, args.flag_log_output.as_deref()) {
        eprintln!("Error: cannot open log output: {e}");
        exit(1);
    }

    if let Err(e) = config::prepare_dirs(&config) {
        error!("Failed to create output directories: {e}");
        exit(1);
    }

    if args.flag_dry_run {
        println!("Configuration {} is valid", args.flag_config);
        return;
    }

    match run(config) {
        Ok(LoopExit::Stopped) => info!("Stopped"),
        Ok(LoopExit::EndOfStream) => {
            error!("Camera stream ended unexpectedly");
            exit(1);
        }
        Err(e) => {
            error!("{e:#}");
            exit(1);
        }
    }
}

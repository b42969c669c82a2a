//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod completion;
pub mod encoder;
pub mod postprocess;
pub mod session;

pub use completion::{PrecaptureCompletions, PrecaptureStatus};
pub use encoder::{CommandBackend, EncoderBackend, EncoderProcess, SegmentRecorder};
pub use postprocess::{MovieOutcome, PostProcessReport, PostProcessor};
pub use session::{RecordingSession, SessionManager};

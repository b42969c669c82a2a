//! Error types shared by the event core.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("command template for {0} is empty")]
    EmptyCommand(&'static str),

    #[error("failed to launch `{program}` for {output}: {source}")]
    Launch {
        program: String,
        output: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

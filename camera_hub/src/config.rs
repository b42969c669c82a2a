//! Camera hub configuration file loading
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use motionwatch_event_core::{CoreError, DetectorConfig};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

pub fn load_config(path: &Path) -> Result<DetectorConfig, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: DetectorConfig = serde_yml::from_reader(file).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the movie, picture and temporary directories if missing.
pub fn prepare_dirs(config: &DetectorConfig) -> io::Result<()> {
    for dir in [
        &config.movie.dirpath,
        &config.picture.dirpath,
        &config.tmp_dir.dirpath,
    ] {
        fs::create_dir_all(dir)?;
        debug!("Using directory {}", dir.display());
    }
    Ok(())
}

//! Error types for drift detection and repair

use config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for drift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Drift errors
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Block device query failed with exit code {code}")]
    DeviceQuery { code: i32, stderr: String },

    #[error("Unexpected block device listing: {0}")]
    DeviceOutput(#[from] serde_json::Error),

    #[error("No boot entries found in {}", .0.display())]
    NoEntries(PathBuf),

    #[error("Settings are corrupted ({0}), repair recommended")]
    CorruptedSettings(String),
}

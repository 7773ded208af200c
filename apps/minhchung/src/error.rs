//! Application-level errors returned from CLI commands and server startup.

use crate::config::ConfigError;
use minhchung_core::McError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] McError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Usage(String),

    /// `verify` found violations.
    #[error("Integrity audit failed with {0} violation(s)")]
    IntegrityFailed(usize),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

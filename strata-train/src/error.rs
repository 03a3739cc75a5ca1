//! Error types for training, persistence and feature extraction.

use std::path::PathBuf;
use strata_data::{DataError, ErrorKind};
use thiserror::Error;

/// Errors produced by the CDBN engine and the classifier bridge.
#[derive(Debug, Error)]
pub enum CdbnError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("Could not create parent directory of {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed model file {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl CdbnError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        CdbnError::Config(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        CdbnError::State(message.into())
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CdbnError::Config(_) | CdbnError::ThreadPool(_) => ErrorKind::Configuration,
            CdbnError::State(_) => ErrorKind::State,
            CdbnError::OutputExists(_)
            | CdbnError::CreateDir { .. }
            | CdbnError::Io { .. }
            | CdbnError::Format { .. } => ErrorKind::Io,
            CdbnError::Data(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CdbnError>;

//! Error types for segment loading.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classification shared by every error in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid arguments, hyperparameters, or malformed inputs.
    Configuration,
    /// Unreadable inputs or unwritable outputs.
    Io,
    /// An operation called in the wrong lifecycle state.
    State,
}

/// Errors that can occur while loading training segments.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PCD parsing error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported PCD data encoding '{encoding}' in {path}")]
    UnsupportedEncoding { path: PathBuf, encoding: String },

    #[error("No label found for {0} (add a '# label <n>' header comment or a '_<n>' file name suffix)")]
    MissingLabel(PathBuf),

    #[error("No training files found in {0}")]
    NoTrainingFiles(PathBuf),

    #[error("Expecting training files to be files, not directories: {0}")]
    NotAFile(PathBuf),

    #[error("Invalid voxel grid: {0}")]
    InvalidGrid(String),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DataError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Io { .. } | DataError::Parse { .. } | DataError::UnsupportedEncoding { .. } => {
                ErrorKind::Io
            }
            DataError::MissingLabel(_)
            | DataError::NoTrainingFiles(_)
            | DataError::NotAFile(_)
            | DataError::InvalidGrid(_) => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

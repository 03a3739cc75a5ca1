//! Errors surfaced by the command-line driver.

use std::path::PathBuf;
use strata_data::{DataError, ErrorKind};
use strata_train::CdbnError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Config(String),

    #[error("{message}: {}", path.display())]
    Input { path: PathBuf, message: String },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Cdbn(#[from] CdbnError),
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Configuration,
            AppError::Input { .. } => ErrorKind::Io,
            AppError::Data(e) => e.kind(),
            AppError::Cdbn(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

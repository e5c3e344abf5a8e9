//! Error types for scanning operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when starting or running a scan.
///
/// Only scan-level failures are represented here. Failures on individual
/// entries are recovered where they happen and never surface as a `ScanError`.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Path does not exist.
    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },

    /// Permission denied for a path.
    #[error("Access denied: {path}")]
    AccessDenied { path: PathBuf },

    /// Root path is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation was interrupted.
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied { path },
            std::io::ErrorKind::NotFound => Self::InvalidPath { path },
            std::io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }

    /// Whether this error rejects the requested root path itself.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. } | Self::AccessDenied { .. } | Self::NotADirectory { .. }
        )
    }
}

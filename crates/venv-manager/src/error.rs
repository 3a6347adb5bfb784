//! Error types for venv-manager

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a Python environment
#[derive(Error, Debug)]
pub enum VenvError {
    /// Python interpreter not found
    #[error("Python interpreter '{0}' is not installed or not in PATH")]
    PythonNotFound(String),

    /// Virtual environment creation failed
    #[error("venv creation failed: {0}")]
    CreateFailed(String),

    /// Package installation failed
    #[error("package installation failed: {0}")]
    InstallFailed(String),

    /// An external command exceeded its time budget
    #[error("command '{command}' timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    /// Installed package directory could not be located
    #[error("site-packages directory not found under {0}")]
    SitePackagesNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for venv-manager operations
pub type Result<T> = std::result::Result<T, VenvError>;

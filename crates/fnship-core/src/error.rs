//! Deployment error taxonomy for fnship.

use std::path::PathBuf;

use crate::remote::RemoteError;
use venv_manager::VenvError;

/// Errors produced by deployment-spec validation.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("function name must not be empty")]
    EmptyFunctionName,

    #[error("region must not be empty")]
    EmptyRegion,

    #[error("no source files listed")]
    NoSources,

    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("smoke event file not found: {0}")]
    EventNotFound(PathBuf),

    #[error("smoke event is not valid JSON: {path}: {reason}")]
    EventNotJson { path: PathBuf, reason: String },

    #[error("manifest error: {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

/// fnship deployment errors.
///
/// One variant per failure class: configuration, staging setup, dependency
/// installation, archive construction, and remote platform calls. No variant
/// is retried anywhere; the pipeline aborts at the first failure.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid deployment spec: {0}")]
    Spec(#[from] SpecError),

    #[error("staging workspace error: {0}")]
    Staging(String),

    #[error("environment error: {0}")]
    Env(#[from] VenvError),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fnship deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

//! Remote function-management client.
//!
//! The platform's management interface is the one value-bearing external
//! system here; fnship is a thin client over it. The [`FunctionService`]
//! trait is the seam: [`platform::PlatformCli`] drives the vendor CLI as a
//! subprocess, and [`fakes::MemoryFunctionService`] satisfies the contract
//! in-memory for tests.

pub mod fakes;
pub mod platform;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use platform::PlatformCli;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors from the function-management client
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Platform CLI not found
    #[error("platform CLI '{0}' is not installed or not in PATH")]
    CliNotFound(String),

    /// Code update call failed
    #[error("update-function-code failed: {0}")]
    UpdateFailed(String),

    /// Invocation call failed
    #[error("invoke failed: {0}")]
    InvokeFailed(String),

    /// The platform answered with an unexpected status code
    #[error("unexpected invocation status: expected {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    /// A remote call exceeded its time budget
    #[error("remote call timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Response parsing error
    #[error("malformed platform response: {0}")]
    MalformedResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invocation mode for a function call.
///
/// `Event` is asynchronous fire-and-forget (the platform acknowledges with
/// HTTP 202 and runs the function in the background); `RequestResponse`
/// blocks until the function returns (HTTP 200).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    #[default]
    Event,
    RequestResponse,
}

impl InvocationMode {
    /// Value for the platform's invocation-type parameter.
    pub fn invocation_type(&self) -> &'static str {
        match self {
            InvocationMode::Event => "Event",
            InvocationMode::RequestResponse => "RequestResponse",
        }
    }

    /// Status code the platform returns for a successful dispatch.
    pub fn expected_status(&self) -> u16 {
        match self {
            InvocationMode::Event => 202,
            InvocationMode::RequestResponse => 200,
        }
    }
}

/// Parsed result of a code update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUpdate {
    /// Function whose code was replaced.
    pub function: String,

    /// Digest the platform reports for the uploaded archive, if any.
    pub code_sha256: Option<String>,

    /// Uploaded archive size as reported by the platform, if any.
    pub code_size: Option<u64>,
}

/// Result of an invocation dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutcome {
    /// Status code returned by the platform.
    pub status_code: u16,

    /// Error marker the platform sets when the function itself failed
    /// (only meaningful for synchronous invocations).
    pub function_error: Option<String>,

    /// Local file the invocation output was written to.
    pub output_path: PathBuf,
}

/// Function-management operations against the execution platform.
///
/// Guarantees:
/// - `update_code` replaces the function's deployed code with the archive's
///   contents; the function must already exist (last writer wins, no
///   optimistic concurrency check).
/// - `invoke` dispatches one invocation in the given mode and writes the
///   platform's response body to `output`.
#[async_trait]
pub trait FunctionService: Send + Sync {
    /// Upload an archive as the new code for `function`.
    async fn update_code(&self, function: &str, archive: &Path) -> RemoteResult<CodeUpdate>;

    /// Invoke `function` with the given JSON payload.
    async fn invoke(
        &self,
        function: &str,
        mode: InvocationMode,
        payload: &[u8],
        output: &Path,
    ) -> RemoteResult<InvokeOutcome>;
}

//! Platform CLI client.
//!
//! Drives the vendor command-line interface (`aws lambda ...`) as a
//! subprocess. Region and credentials profile are passed explicitly on
//! every call rather than inherited from ambient shell state, so two
//! deployments with different targets can never cross-contaminate.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CodeUpdate, FunctionService, InvocationMode, InvokeOutcome, RemoteError, RemoteResult};

/// Default platform CLI executable.
pub const DEFAULT_CLI: &str = "aws";

/// Response of `lambda update-function-code`.
#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(rename = "FunctionName")]
    function_name: Option<String>,
    #[serde(rename = "CodeSha256")]
    code_sha256: Option<String>,
    #[serde(rename = "CodeSize")]
    code_size: Option<u64>,
}

/// Response of `lambda invoke` (written to stdout; the function output
/// itself goes to the outfile argument).
#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(rename = "StatusCode")]
    status_code: u16,
    #[serde(rename = "FunctionError")]
    function_error: Option<String>,
}

/// CLI-backed [`FunctionService`] implementation.
#[derive(Debug, Clone)]
pub struct PlatformCli {
    cli: String,
    region: String,
    profile: Option<String>,
    timeout: Duration,
}

impl PlatformCli {
    /// Create a client for the given region using the default CLI binary.
    pub fn new(region: impl Into<String>, profile: Option<String>, timeout: Duration) -> Self {
        Self {
            cli: DEFAULT_CLI.to_string(),
            region: region.into(),
            profile,
            timeout,
        }
    }

    /// Override the CLI executable (used to point tests at a stub).
    pub fn with_cli(mut self, cli: impl Into<String>) -> Self {
        self.cli = cli.into();
        self
    }

    /// Common trailing arguments carrying explicit client configuration.
    fn scope_args(&self) -> Vec<String> {
        let mut args = vec!["--region".to_string(), self.region.clone()];
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Run the CLI; a non-zero exit becomes the error produced by `on_fail`
    /// with the command's stderr attached.
    async fn run(
        &self,
        args: &[String],
        on_fail: fn(String) -> RemoteError,
    ) -> RemoteResult<std::process::Output> {
        debug!(cli = %self.cli, ?args, "Running platform CLI");

        let child = Command::new(&self.cli)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RemoteError::CliNotFound(self.cli.clone())
                } else {
                    RemoteError::Io(e)
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RemoteError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(RemoteError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(on_fail(stderr));
        }

        Ok(output)
    }
}

#[async_trait]
impl FunctionService for PlatformCli {
    async fn update_code(&self, function: &str, archive: &Path) -> RemoteResult<CodeUpdate> {
        let mut args = vec![
            "lambda".to_string(),
            "update-function-code".to_string(),
            "--function-name".to_string(),
            function.to_string(),
            "--zip-file".to_string(),
            format!("fileb://{}", archive.display()),
        ];
        args.extend(self.scope_args());

        let output = self.run(&args, RemoteError::UpdateFailed).await?;

        let response: UpdateResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        info!(
            function,
            code_sha256 = response.code_sha256.as_deref().unwrap_or("-"),
            "Function code updated"
        );

        Ok(CodeUpdate {
            function: response.function_name.unwrap_or_else(|| function.to_string()),
            code_sha256: response.code_sha256,
            code_size: response.code_size,
        })
    }

    async fn invoke(
        &self,
        function: &str,
        mode: InvocationMode,
        payload: &[u8],
        output: &Path,
    ) -> RemoteResult<InvokeOutcome> {
        // The CLI takes the payload by file reference; stage it next to the
        // output so it shares the run's cleanup.
        let mut payload_file = tempfile::NamedTempFile::new_in(
            output.parent().unwrap_or_else(|| Path::new(".")),
        )?;
        payload_file.write_all(payload)?;
        payload_file.flush()?;

        let mut args = vec![
            "lambda".to_string(),
            "invoke".to_string(),
            "--function-name".to_string(),
            function.to_string(),
            "--invocation-type".to_string(),
            mode.invocation_type().to_string(),
            "--payload".to_string(),
            format!("fileb://{}", payload_file.path().display()),
            output.display().to_string(),
        ];
        args.extend(self.scope_args());

        let cli_output = self.run(&args, RemoteError::InvokeFailed).await?;

        let response: InvokeResponse = serde_json::from_slice(&cli_output.stdout)
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        if response.status_code != mode.expected_status() {
            return Err(RemoteError::UnexpectedStatus {
                expected: mode.expected_status(),
                actual: response.status_code,
            });
        }

        info!(
            function,
            status = response.status_code,
            mode = mode.invocation_type(),
            "Invocation dispatched"
        );

        Ok(InvokeOutcome {
            status_code: response.status_code,
            function_error: response.function_error,
            output_path: output.to_path_buf(),
        })
    }
}

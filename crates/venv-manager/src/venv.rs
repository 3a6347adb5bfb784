//! Virtual environment creation and package installation.
//!
//! Wraps the `venv` stdlib module and pip as subprocesses. Every external
//! command runs with a time budget and captured output; failures carry the
//! tail of the installer's stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, VenvError};

/// Maximum number of captured output bytes preserved in messages.
const OUTPUT_TAIL_BYTES: usize = 2048;

/// Outcome of a package installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Number of packages requested (not the transitive install set).
    pub requested: usize,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Tail of the installer's stdout, for diagnostics.
    pub log_tail: String,
}

/// Handle to a created Python virtual environment.
///
/// The environment lives entirely under `root`; the caller owns the
/// directory and its lifetime. Nothing outside `root` is touched.
#[derive(Debug)]
pub struct VirtualEnv {
    root: PathBuf,
    interpreter: PathBuf,
}

impl VirtualEnv {
    /// Create a new virtual environment at `root` using the given base
    /// interpreter (e.g. `python3`).
    pub async fn create(python: &str, root: &Path, timeout: Duration) -> Result<VirtualEnv> {
        info!("Creating virtual environment at {:?}", root);

        let root_arg = root.to_string_lossy();
        let output = run_command(python, &["-m", "venv", root_arg.as_ref()], timeout)
            .await
            .map_err(|e| match e {
                VenvError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    VenvError::PythonNotFound(python.to_string())
                }
                other => other,
            })?;

        if !output.status.success() {
            return Err(VenvError::CreateFailed(output_tail(&output.stderr)));
        }

        let interpreter = root.join("bin").join("python");
        if !interpreter.exists() {
            return Err(VenvError::CreateFailed(format!(
                "venv produced no interpreter at {:?}",
                interpreter
            )));
        }

        Ok(VirtualEnv { root: root.to_path_buf(), interpreter })
    }

    /// Environment root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install the named packages into this environment via pip.
    ///
    /// An empty package list is a no-op and never spawns pip.
    pub async fn install(&self, packages: &[String], timeout: Duration) -> Result<InstallReport> {
        if packages.is_empty() {
            debug!("No packages requested, skipping pip");
            return Ok(InstallReport {
                requested: 0,
                duration_ms: 0,
                log_tail: String::new(),
            });
        }

        info!(count = packages.len(), "Installing packages");
        let start = Instant::now();

        let mut args: Vec<&str> = vec!["-m", "pip", "install", "--disable-pip-version-check"];
        args.extend(packages.iter().map(String::as_str));

        let output = run_command(&self.interpreter.to_string_lossy(), &args, timeout).await?;

        if !output.status.success() {
            return Err(VenvError::InstallFailed(output_tail(&output.stderr)));
        }

        Ok(InstallReport {
            requested: packages.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            log_tail: output_tail(&output.stdout),
        })
    }

    /// Locate the installed-package directory tree for this environment.
    ///
    /// Asks the environment's own interpreter first (authoritative), then
    /// falls back to scanning `lib/python*/site-packages`.
    pub async fn site_packages(&self) -> Result<PathBuf> {
        if let Ok(path) = self.query_site_packages().await {
            return Ok(path);
        }

        debug!("Interpreter query failed, scanning lib/ for site-packages");
        scan_site_packages(&self.root)
    }

    /// Resolve site-packages by asking the venv interpreter via sysconfig.
    async fn query_site_packages(&self) -> Result<PathBuf> {
        let output = run_command(
            &self.interpreter.to_string_lossy(),
            &[
                "-c",
                "import sysconfig; print(sysconfig.get_paths()['purelib'])",
            ],
            Duration::from_secs(30),
        )
        .await?;

        if !output.status.success() {
            return Err(VenvError::SitePackagesNotFound(self.root.clone()));
        }

        let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        if path.is_dir() {
            Ok(path)
        } else {
            Err(VenvError::SitePackagesNotFound(self.root.clone()))
        }
    }
}

/// Scan `<root>/lib/python*/site-packages` (fallback resolution).
fn scan_site_packages(root: &Path) -> Result<PathBuf> {
    let lib_dir = root.join("lib");
    let mut entries: Vec<_> = std::fs::read_dir(&lib_dir)
        .map_err(|_| VenvError::SitePackagesNotFound(root.to_path_buf()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    // Sort for deterministic selection when several interpreter dirs exist.
    entries.sort();

    for entry in entries {
        let name = entry.file_name().unwrap_or_default().to_string_lossy().to_string();
        if entry.is_dir() && name.starts_with("python") {
            let candidate = entry.join("site-packages");
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
    }

    Err(VenvError::SitePackagesNotFound(root.to_path_buf()))
}

/// Check whether the given Python interpreter can be executed.
pub fn is_python_available(python: &str) -> bool {
    std::process::Command::new(python)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Execute a command with piped output and a time budget.
async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<std::process::Output> {
    debug!(program, ?args, "Running command");

    let child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| VenvError::Timeout {
            command: program.to_string(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(VenvError::Io)
}

/// Lossy tail of captured command output, bounded for error messages.
fn output_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.len() <= OUTPUT_TAIL_BYTES {
        trimmed.to_string()
    } else {
        let start = trimmed.len() - OUTPUT_TAIL_BYTES;
        // Avoid splitting a UTF-8 sequence.
        let mut idx = start;
        while !trimmed.is_char_boundary(idx) {
            idx += 1;
        }
        trimmed[idx..].to_string()
    }
}

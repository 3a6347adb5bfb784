//! fnship - Serverless function deployment packager
//!
//! The `fnship` command packages Python sources and third-party dependencies
//! into a zip archive and publishes it as the code of an existing platform
//! function.
//!
//! ## Commands
//!
//! - `deploy`: Run the full pipeline (install, package, upload, smoke test)
//! - `package`: Build the archive only, without touching the platform
//! - `invoke`: Fire a test invocation against the deployed function

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use fnship_core::{
    DeployPipeline, DeploySpec, FunctionService, InvocationMode, Manifest, PlatformCli,
    SmokeOutcome,
};
use venv_manager::is_python_available;

#[derive(Parser)]
#[command(name = "fnship")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serverless function deployment packager", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package and publish the function, then fire a smoke-test invocation
    Deploy {
        /// Path to the deployment manifest
        #[arg(short, long, default_value = "fnship.toml")]
        manifest: PathBuf,
    },

    /// Build the deployable archive without any remote call
    Package {
        /// Path to the deployment manifest
        #[arg(short, long, default_value = "fnship.toml")]
        manifest: PathBuf,

        /// Where to write the archive
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Invoke the deployed function with the configured test event
    Invoke {
        /// Path to the deployment manifest
        #[arg(short, long, default_value = "fnship.toml")]
        manifest: PathBuf,

        /// Block on the invocation and print its output
        #[arg(long)]
        sync: bool,

        /// Override top-level payload fields (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Keep the invocation output at this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fnship_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Deploy { manifest } => {
            let spec = load_spec(&manifest)?;
            let service = platform_client(&spec);
            cmd_deploy(&spec, &service).await
        }
        Commands::Package { manifest, output } => {
            let spec = load_spec(&manifest)?;
            cmd_package(&spec, &output).await
        }
        Commands::Invoke {
            manifest,
            sync,
            overrides,
            output,
        } => {
            let spec = load_spec(&manifest)?;
            let service = platform_client(&spec);
            cmd_invoke(&spec, &service, sync, &overrides, output.as_deref()).await
        }
    }
}

fn load_spec(manifest: &Path) -> Result<DeploySpec> {
    Manifest::load_spec(manifest)
        .with_context(|| format!("Failed to load manifest: {:?}", manifest))
}

fn platform_client(spec: &DeploySpec) -> PlatformCli {
    PlatformCli::new(
        spec.region.clone(),
        spec.profile.clone(),
        Duration::from_secs(spec.timeouts.remote_secs),
    )
}

/// Run the full deployment pipeline and print the report.
async fn cmd_deploy(spec: &DeploySpec, service: &dyn FunctionService) -> Result<()> {
    if !spec.dependencies.is_empty() && !is_python_available(&spec.python) {
        bail!(
            "Python interpreter '{}' not found; required to install {} dependencies",
            spec.python,
            spec.dependencies.len()
        );
    }

    println!("Deploying {} ({})", spec.function, spec.region);

    let report = DeployPipeline::run(spec, service)
        .await
        .context("Deployment failed")?;

    for stage in &report.stages {
        println!(
            "  ✓ {} ({}ms) {}",
            stage.stage.name(),
            stage.duration_ms,
            stage.detail
        );
    }

    println!();
    println!("Run ID:  {}", report.run_id);
    println!(
        "Archive: {} entries, {} bytes, sha256 {}",
        report.archive.entries, report.archive.bytes, report.archive.digest
    );

    match &report.smoke {
        SmokeOutcome::Dispatched { status_code } => {
            println!("Smoke:   dispatched (status {})", status_code);
        }
        SmokeOutcome::Failed { error } => {
            println!("Smoke:   ✗ failed ({})", error);
            println!("The code update stands; inspect the function logs.");
        }
    }

    Ok(())
}

/// Build the archive only.
async fn cmd_package(spec: &DeploySpec, output: &Path) -> Result<()> {
    let summary = DeployPipeline::package(spec, output)
        .await
        .context("Packaging failed")?;

    println!("Archive written to {:?}", summary.path);
    println!("  entries: {}", summary.entries);
    println!("  bytes:   {}", summary.bytes);
    println!("  sha256:  {}", summary.digest);

    Ok(())
}

/// Fire a standalone invocation with the configured test event.
async fn cmd_invoke(
    spec: &DeploySpec,
    service: &dyn FunctionService,
    sync: bool,
    overrides: &[String],
    keep_output: Option<&Path>,
) -> Result<()> {
    let mode = if sync {
        InvocationMode::RequestResponse
    } else {
        spec.smoke_mode
    };

    let payload = build_payload(&spec.smoke_event, overrides)?;

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let out_path = scratch.path().join("invoke-output.json");

    let outcome = service
        .invoke(&spec.function, mode, &payload, &out_path)
        .await
        .context("Invocation failed")?;

    println!(
        "Invoked {} ({}) status {}",
        spec.function,
        mode.invocation_type(),
        outcome.status_code
    );

    if let Some(function_error) = &outcome.function_error {
        println!("Function error: {}", function_error);
    }

    if mode == InvocationMode::RequestResponse {
        let body = std::fs::read_to_string(&out_path).unwrap_or_default();
        if !body.is_empty() {
            println!("{}", body);
        }
    }

    if let Some(keep) = keep_output {
        std::fs::copy(&out_path, keep)
            .with_context(|| format!("Failed to write output to {:?}", keep))?;
        println!("Output kept at {:?}", keep);
    }

    Ok(())
}

/// Parse a `key=value` payload override.
fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid override '{}', expected KEY=VALUE", raw),
    }
}

/// Load the event template and merge scalar overrides into the top-level
/// object.
fn build_payload(event_path: &Path, overrides: &[String]) -> Result<Vec<u8>> {
    let raw = std::fs::read(event_path)
        .with_context(|| format!("Failed to read event file: {:?}", event_path))?;
    let mut event: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("Event file is not valid JSON: {:?}", event_path))?;

    if overrides.is_empty() {
        return Ok(raw);
    }

    let object = event
        .as_object_mut()
        .with_context(|| "Payload overrides require a JSON object event")?;
    for raw_override in overrides {
        let (key, value) = parse_override(raw_override)?;
        object.insert(key, serde_json::Value::String(value));
    }

    serde_json::to_vec(&event).context("Failed to serialize payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnship_core::remote::fakes::MemoryFunctionService;
    use fnship_core::{InvocationMode, Timeouts};

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn test_spec(dir: &Path) -> DeploySpec {
        let source = write_file(dir, "features_day.py", b"def handler(event, context):\n    return {}\n");
        let event = write_file(dir, "event.json", br#"{"dates": ["2020-01-02"]}"#);
        DeploySpec {
            function: "features-day".to_string(),
            region: "us-east-1".to_string(),
            profile: None,
            dependencies: vec![],
            sources: vec![source],
            python: "python3".to_string(),
            smoke_event: event,
            smoke_mode: InvocationMode::Event,
            timeouts: Timeouts::default(),
        }
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("date=2020-01-02").unwrap(),
            ("date".to_string(), "2020-01-02".to_string())
        );
        // Values may contain '='.
        assert_eq!(
            parse_override("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_override("no-separator").is_err());
        assert!(parse_override("=value").is_err());
    }

    #[test]
    fn test_build_payload_without_overrides_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let event = write_file(dir.path(), "event.json", br#"{"dates": []}"#);

        let payload = build_payload(&event, &[]).unwrap();
        assert_eq!(payload, br#"{"dates": []}"#);
    }

    #[test]
    fn test_build_payload_merges_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let event = write_file(dir.path(), "event.json", br#"{"dates": [], "symbol": "MSFT"}"#);

        let payload = build_payload(&event, &["symbol=AAPL".to_string()]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["dates"], serde_json::json!([]));
    }

    #[test]
    fn test_build_payload_rejects_non_object_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let event = write_file(dir.path(), "event.json", b"[1, 2, 3]");

        assert!(build_payload(&event, &["k=v".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_cmd_deploy_with_fake_service() {
        let dir = tempfile::tempdir().unwrap();
        let spec = test_spec(dir.path());
        let service = MemoryFunctionService::new();

        cmd_deploy(&spec, &service).await.unwrap();

        assert_eq!(service.updates().len(), 1);
        assert_eq!(service.invokes().len(), 1);
    }

    #[tokio::test]
    async fn test_cmd_invoke_sync_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = test_spec(dir.path());
        let service = MemoryFunctionService::new();
        let keep = dir.path().join("smoke-result.json");

        cmd_invoke(
            &spec,
            &service,
            true,
            &["symbol=AAPL".to_string()],
            Some(keep.as_path()),
        )
        .await
        .unwrap();

        assert!(keep.exists());
        assert_eq!(service.invokes().len(), 1);
        assert_eq!(service.invokes()[0].mode, InvocationMode::RequestResponse);
        let payload: serde_json::Value =
            serde_json::from_slice(&service.invokes()[0].payload).unwrap();
        assert_eq!(payload["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn test_cmd_package_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let spec = test_spec(dir.path());
        let output = dir.path().join("function.zip");

        cmd_package(&spec, &output).await.unwrap();
        assert!(output.exists());
    }
}

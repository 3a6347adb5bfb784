//! Deploy pipeline orchestration.
//!
//! An explicit sequential pipeline: validate, install, package, upload,
//! smoke. Each stage returns a result and the pipeline short-circuits on the
//! first failure; the staging workspace is owned by the executing scope, so
//! temporary artifacts are released on every exit path, including failures.
//!
//! The smoke stage is non-fatal: the test invocation is an asynchronous
//! dispatch whose result carries no execution verdict, so a failed dispatch
//! is logged and recorded but never reverses the code update.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use venv_manager::VirtualEnv;

use crate::archive::{flatten_plan, ArchiveBuilder, ArchiveSummary};
use crate::error::Result;
use crate::remote::{CodeUpdate, FunctionService, InvokeOutcome};
use crate::spec::DeploySpec;
use crate::staging::Staging;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Validate,
    Install,
    Package,
    Upload,
    Smoke,
}

impl DeployStage {
    /// Stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            DeployStage::Validate => "validate",
            DeployStage::Install => "install",
            DeployStage::Package => "package",
            DeployStage::Upload => "upload",
            DeployStage::Smoke => "smoke",
        }
    }
}

/// Timing and detail for one executed stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: DeployStage,
    pub duration_ms: u64,
    pub detail: String,
}

/// Outcome of the smoke-test invocation.
#[derive(Debug, Clone)]
pub enum SmokeOutcome {
    /// The platform accepted the invocation.
    Dispatched { status_code: u16 },

    /// Dispatch failed; the code update stands.
    Failed { error: String },
}

impl SmokeOutcome {
    pub fn dispatched(&self) -> bool {
        matches!(self, SmokeOutcome::Dispatched { .. })
    }
}

/// Result of a complete deployment.
#[derive(Debug, Clone)]
pub struct DeployReport {
    /// Unique id for this run.
    pub run_id: String,

    /// Function whose code was updated.
    pub function: String,

    /// Summary of the uploaded archive. The file itself lives in the
    /// staging workspace and is gone by the time the report is returned.
    pub archive: ArchiveSummary,

    /// Platform response to the code update.
    pub code_update: CodeUpdate,

    /// Smoke-test outcome.
    pub smoke: SmokeOutcome,

    /// Per-stage timing, in execution order.
    pub stages: Vec<StageReport>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}

/// Deployment pipeline orchestrator.
pub struct DeployPipeline;

impl DeployPipeline {
    /// Run the full deployment: package the configured archive, upload it as
    /// the function's new code, and fire the smoke-test invocation.
    pub async fn run(spec: &DeploySpec, service: &dyn FunctionService) -> Result<DeployReport> {
        let staging = Staging::create()?;
        Self::execute(spec, service, staging).await
    }

    /// Build the archive only, copying it to `output`. Stops before any
    /// remote call.
    pub async fn package(spec: &DeploySpec, output: &Path) -> Result<ArchiveSummary> {
        spec.validate()?;

        let staging = Staging::create()?;
        let site_packages = Self::install_stage(spec, &staging).await?;
        let summary = Self::package_stage(spec, &staging, site_packages.as_deref())?;

        std::fs::copy(&summary.path, output)?;
        info!(output = %output.display(), digest = %summary.digest.short(), "Archive written");

        Ok(ArchiveSummary {
            path: output.to_path_buf(),
            ..summary
        })
    }

    /// Execute all stages against an owned staging workspace. The workspace
    /// is dropped when this function returns, on success and on error alike.
    async fn execute(
        spec: &DeploySpec,
        service: &dyn FunctionService,
        staging: Staging,
    ) -> Result<DeployReport> {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut stages = Vec::new();

        info!(run_id = %run_id, function = %spec.function, "Starting deployment");

        // Validate: abort before any side effect.
        let stage_start = Instant::now();
        spec.validate()?;
        stages.push(StageReport {
            stage: DeployStage::Validate,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            detail: format!(
                "{} sources, {} dependencies",
                spec.sources.len(),
                spec.dependencies.len()
            ),
        });

        // Install: skipped entirely when no dependencies are requested.
        let stage_start = Instant::now();
        let site_packages = Self::install_stage(spec, &staging).await?;
        if let Some(site) = &site_packages {
            stages.push(StageReport {
                stage: DeployStage::Install,
                duration_ms: stage_start.elapsed().as_millis() as u64,
                detail: format!("{} packages into {}", spec.dependencies.len(), site.display()),
            });
        } else {
            info!("No dependencies requested, skipping install stage");
        }

        // Package: the archive must exist and be non-empty before upload.
        let stage_start = Instant::now();
        let archive = Self::package_stage(spec, &staging, site_packages.as_deref())?;
        stages.push(StageReport {
            stage: DeployStage::Package,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            detail: format!(
                "{} entries, {} bytes, sha256 {}",
                archive.entries,
                archive.bytes,
                archive.digest.short()
            ),
        });

        // Upload: failure aborts; staging cleanup still happens on return.
        let stage_start = Instant::now();
        let code_update = service.update_code(&spec.function, &archive.path).await?;
        stages.push(StageReport {
            stage: DeployStage::Upload,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            detail: format!(
                "code sha256 {}",
                code_update.code_sha256.as_deref().unwrap_or("-")
            ),
        });

        // Smoke: fire-and-forget; failure is logged and recorded only.
        let stage_start = Instant::now();
        let smoke = Self::smoke_stage(spec, service, &staging).await;
        stages.push(StageReport {
            stage: DeployStage::Smoke,
            duration_ms: stage_start.elapsed().as_millis() as u64,
            detail: match &smoke {
                SmokeOutcome::Dispatched { status_code } => format!("status {status_code}"),
                SmokeOutcome::Failed { error } => format!("failed: {error}"),
            },
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(run_id = %run_id, duration_ms, "Deployment complete");

        Ok(DeployReport {
            run_id,
            function: spec.function.clone(),
            archive,
            code_update,
            smoke,
            stages,
            duration_ms,
            completed_at: Utc::now(),
        })
    }

    /// Create the dependency environment and install packages. Returns the
    /// installed tree, or `None` when the dependency list is empty.
    async fn install_stage(spec: &DeploySpec, staging: &Staging) -> Result<Option<std::path::PathBuf>> {
        if spec.dependencies.is_empty() {
            return Ok(None);
        }

        let venv = VirtualEnv::create(
            &spec.python,
            &staging.venv_dir(),
            Duration::from_secs(spec.timeouts.venv_secs),
        )
        .await?;

        let report = venv
            .install(
                &spec.dependencies,
                Duration::from_secs(spec.timeouts.install_secs),
            )
            .await?;
        info!(
            packages = report.requested,
            duration_ms = report.duration_ms,
            "Dependencies installed"
        );

        let site_packages = venv.site_packages().await?;
        Ok(Some(site_packages))
    }

    /// Build the archive: installed tree first, then sources flattened to
    /// their base names (shadowing colliding top-level tree entries).
    fn package_stage(
        spec: &DeploySpec,
        staging: &Staging,
        site_packages: Option<&Path>,
    ) -> Result<ArchiveSummary> {
        let plan = flatten_plan(&spec.sources);
        let shadowed: HashSet<String> = plan.iter().map(|(name, _)| name.clone()).collect();

        let mut builder = ArchiveBuilder::create(&staging.archive_path())?;

        if let Some(site) = site_packages {
            let added = builder.add_tree(site, &shadowed)?;
            info!(entries = added, "Archived installed dependency tree");
        }

        for (_, source) in &plan {
            builder.add_flattened(source)?;
        }

        builder.finish()
    }

    /// Dispatch the smoke-test invocation. Never fails the pipeline.
    async fn smoke_stage(
        spec: &DeploySpec,
        service: &dyn FunctionService,
        staging: &Staging,
    ) -> SmokeOutcome {
        let payload = match std::fs::read(&spec.smoke_event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Smoke test skipped, event unreadable: {e}");
                return SmokeOutcome::Failed { error: e.to_string() };
            }
        };

        match service
            .invoke(
                &spec.function,
                spec.smoke_mode,
                &payload,
                &staging.smoke_output_path(),
            )
            .await
        {
            Ok(InvokeOutcome { status_code, .. }) => SmokeOutcome::Dispatched { status_code },
            Err(e) => {
                warn!("Smoke invocation failed (code update stands): {e}");
                SmokeOutcome::Failed { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fakes::MemoryFunctionService;
    use crate::remote::InvocationMode;
    use crate::spec::Timeouts;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn spec_without_deps(dir: &Path) -> DeploySpec {
        let source = dir.join("features_day.py");
        std::fs::write(&source, b"def handler(event, context):\n    return {}\n").unwrap();
        let event = dir.join("event.json");
        std::fs::write(&event, br#"{"dates": ["2020-01-02"], "symbols": ["AAPL"]}"#).unwrap();

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

    #[tokio::test]
    async fn test_deploy_ships_archive_and_smokes() {
        let dir = tempdir().unwrap();
        let spec = spec_without_deps(dir.path());
        let service = MemoryFunctionService::new();

        let report = DeployPipeline::run(&spec, &service).await.unwrap();

        assert_eq!(report.function, "features-day");
        assert!(report.smoke.dispatched());
        assert_eq!(report.archive.entries, 1);

        // No install stage for an empty dependency list.
        let names: Vec<&str> = report.stages.iter().map(|s| s.stage.name()).collect();
        assert_eq!(names, vec!["validate", "package", "upload", "smoke"]);

        let updates = service.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].function, "features-day");
        assert!(updates[0].archive_bytes > 0);
        assert_eq!(updates[0].archive_digest, report.archive.digest);

        let invokes = service.invokes();
        assert_eq!(invokes.len(), 1);
        assert_eq!(invokes[0].mode, InvocationMode::Event);
        assert_eq!(
            invokes[0].payload,
            std::fs::read(&spec.smoke_event).unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_source_aborts_before_remote_call() {
        let dir = tempdir().unwrap();
        let mut spec = spec_without_deps(dir.path());
        spec.sources.push(PathBuf::from("/does/not/exist.py"));
        let service = MemoryFunctionService::new();

        let err = DeployPipeline::run(&spec, &service).await.unwrap_err();
        assert!(err.to_string().contains("invalid deployment spec"));

        assert!(service.updates().is_empty(), "no remote mutation on preflight failure");
        assert!(service.invokes().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_cleans_staging() {
        let dir = tempdir().unwrap();
        let spec = spec_without_deps(dir.path());
        let service = MemoryFunctionService::failing_updates();

        let staging = Staging::create().unwrap();
        let staging_path = staging.path().to_path_buf();

        let err = DeployPipeline::execute(&spec, &service, staging)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("remote error"));

        assert!(!staging_path.exists(), "staging removed on the failure path");
        assert!(service.invokes().is_empty(), "no invocation after failed upload");
    }

    #[tokio::test]
    async fn test_smoke_failure_does_not_fail_deploy() {
        let dir = tempdir().unwrap();
        let spec = spec_without_deps(dir.path());
        let service = MemoryFunctionService::failing_invokes();

        let report = DeployPipeline::run(&spec, &service).await.unwrap();

        assert!(!report.smoke.dispatched());
        assert!(matches!(report.smoke, SmokeOutcome::Failed { .. }));
        assert_eq!(service.updates().len(), 1, "code update stands");
    }

    #[tokio::test]
    async fn test_package_copies_archive_out() {
        let dir = tempdir().unwrap();
        let spec = spec_without_deps(dir.path());
        let output = dir.path().join("function.zip");

        let summary = DeployPipeline::package(&spec, &output).await.unwrap();

        assert_eq!(summary.path, output);
        assert!(output.exists());
        assert_eq!(
            summary.digest,
            crate::digest::ArchiveDigest::from_file(&output).unwrap()
        );
    }

    #[tokio::test]
    async fn test_sync_smoke_mode_reaches_service() {
        let dir = tempdir().unwrap();
        let mut spec = spec_without_deps(dir.path());
        spec.smoke_mode = InvocationMode::RequestResponse;
        let service = MemoryFunctionService::new();

        let report = DeployPipeline::run(&spec, &service).await.unwrap();

        assert!(matches!(
            report.smoke,
            SmokeOutcome::Dispatched { status_code: 200 }
        ));
        assert_eq!(service.invokes()[0].mode, InvocationMode::RequestResponse);
    }
}

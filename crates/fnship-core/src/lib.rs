//! fnship-core - Function deployment packaging and publishing
//!
//! Provides the deployment pipeline that:
//! - Builds an isolated dependency environment and installs packages
//! - Archives the installed tree plus flattened source files into a zip
//! - Uploads the archive as a function's new code
//! - Fires a fire-and-forget smoke-test invocation

pub mod archive;
pub mod digest;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod spec;
pub mod staging;
pub mod telemetry;

// Re-export key types
pub use archive::{flatten_plan, ArchiveBuilder, ArchiveSummary};
pub use digest::ArchiveDigest;
pub use error::{DeployError, Result, SpecError};
pub use pipeline::{DeployPipeline, DeployReport, DeployStage, SmokeOutcome, StageReport};
pub use remote::{CodeUpdate, FunctionService, InvocationMode, InvokeOutcome, PlatformCli, RemoteError};
pub use spec::{DeploySpec, Manifest, Timeouts, DEFAULT_PYTHON};
pub use staging::Staging;
pub use telemetry::init_tracing;

//! Deployment specification and manifest loading.
//!
//! A [`DeploySpec`] is the immutable configuration record for one deployment:
//! which packages to install, which source files to ship, which remote
//! function to update, and which event to fire as a smoke test. Specs are
//! normally produced from a TOML manifest (`fnship.toml`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::remote::InvocationMode;

/// Default base interpreter used to build the dependency environment.
pub const DEFAULT_PYTHON: &str = "python3";

/// Per-stage time budgets in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    /// Virtual environment creation.
    pub venv_secs: u64,

    /// Package installation (dominated by dependency download/build time).
    pub install_secs: u64,

    /// Each remote platform call (code update, invocation).
    pub remote_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            venv_secs: 120,
            install_secs: 900,
            remote_secs: 300,
        }
    }
}

/// Immutable configuration for a single deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploySpec {
    /// Target function identifier. The function must already exist on the
    /// platform; fnship updates code, it never creates functions.
    pub function: String,

    /// Platform region, passed explicitly on every remote call.
    pub region: String,

    /// Optional named credentials profile for the platform client.
    pub profile: Option<String>,

    /// Third-party package names to install. May be empty, in which case
    /// the archive contains only the listed sources.
    pub dependencies: Vec<String>,

    /// Local source files appended to the archive under their base names.
    pub sources: Vec<PathBuf>,

    /// Base interpreter used for the dependency environment.
    pub python: String,

    /// JSON document used as the smoke-test invocation payload.
    pub smoke_event: PathBuf,

    /// Invocation mode for the smoke test.
    pub smoke_mode: InvocationMode,

    /// Stage time budgets.
    pub timeouts: Timeouts,
}

impl DeploySpec {
    /// Preflight validation. Runs before any side effect: a spec that fails
    /// here has mutated nothing, locally or remotely.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.function.trim().is_empty() {
            return Err(SpecError::EmptyFunctionName);
        }
        if self.region.trim().is_empty() {
            return Err(SpecError::EmptyRegion);
        }
        if self.sources.is_empty() {
            return Err(SpecError::NoSources);
        }

        for source in &self.sources {
            if !source.is_file() {
                return Err(SpecError::SourceNotFound(source.clone()));
            }
        }

        if !self.smoke_event.is_file() {
            return Err(SpecError::EventNotFound(self.smoke_event.clone()));
        }

        let raw = std::fs::read(&self.smoke_event).map_err(|e| SpecError::EventNotJson {
            path: self.smoke_event.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice::<serde_json::Value>(&raw).map_err(|e| SpecError::EventNotJson {
            path: self.smoke_event.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Base names under which the sources will appear in the archive, in
    /// list order. Duplicates resolve last-writer-wins at archive time.
    pub fn flattened_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Manifest (fnship.toml)
// ---------------------------------------------------------------------------

/// `[function]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionSection {
    name: String,
    region: String,
    profile: Option<String>,
}

/// `[package]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackageSection {
    #[serde(default)]
    dependencies: Vec<String>,
    sources: Vec<PathBuf>,
    python: Option<String>,
}

/// `[smoke]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SmokeSection {
    event: PathBuf,
    #[serde(default)]
    mode: InvocationMode,
}

/// On-disk deployment manifest.
///
/// Relative paths in the manifest are resolved against the manifest file's
/// parent directory, so a manifest can be deployed from any working
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    function: FunctionSection,
    package: PackageSection,
    smoke: SmokeSection,
    #[serde(default)]
    timeouts: Timeouts,
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Manifest, SpecError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SpecError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| SpecError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load a manifest and resolve it into a [`DeploySpec`], anchoring
    /// relative paths at the manifest's parent directory.
    pub fn load_spec(path: &Path) -> Result<DeploySpec, SpecError> {
        let manifest = Self::load(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(manifest.into_spec(base))
    }

    /// Resolve into a [`DeploySpec`] with relative paths anchored at `base`.
    pub fn into_spec(self, base: &Path) -> DeploySpec {
        let anchor = |p: PathBuf| -> PathBuf {
            if p.is_absolute() {
                p
            } else {
                base.join(p)
            }
        };

        DeploySpec {
            function: self.function.name,
            region: self.function.region,
            profile: self.function.profile,
            dependencies: self.package.dependencies,
            sources: self.package.sources.into_iter().map(&anchor).collect(),
            python: self
                .package
                .python
                .unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            smoke_event: anchor(self.smoke.event),
            smoke_mode: self.smoke.mode,
            timeouts: self.timeouts,
        }
    }
}

//! Per-run staging workspace.
//!
//! Every deployment gets a uniquely-named temporary directory holding the
//! dependency environment, the archive under construction, and the
//! smoke-test output file. The directory is removed when the [`Staging`]
//! value is dropped, on every exit path including failures, so concurrent
//! and repeated runs never collide and never leak artifacts.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{DeployError, Result};

/// Scoped temporary workspace for a single deployment run.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a fresh staging directory.
    pub fn create() -> Result<Staging> {
        let dir = tempfile::Builder::new()
            .prefix("fnship-")
            .tempdir()
            .map_err(|e| DeployError::Staging(e.to_string()))?;
        Ok(Staging { dir })
    }

    /// Staging root path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Root for the dependency environment.
    pub fn venv_dir(&self) -> PathBuf {
        self.dir.path().join("venv")
    }

    /// Path of the archive under construction.
    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join("function.zip")
    }

    /// Path capturing the smoke-test invocation output.
    pub fn smoke_output_path(&self) -> PathBuf {
        self.dir.path().join("invoke-output.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_paths_live_under_root() {
        let staging = Staging::create().unwrap();
        assert!(staging.venv_dir().starts_with(staging.path()));
        assert!(staging.archive_path().starts_with(staging.path()));
        assert!(staging.smoke_output_path().starts_with(staging.path()));
    }

    #[test]
    fn test_staging_dirs_are_unique() {
        let a = Staging::create().unwrap();
        let b = Staging::create().unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let staging = Staging::create().unwrap();
        let root = staging.path().to_path_buf();
        std::fs::write(staging.archive_path(), b"partial archive").unwrap();
        assert!(root.exists());

        drop(staging);
        assert!(!root.exists());
    }
}

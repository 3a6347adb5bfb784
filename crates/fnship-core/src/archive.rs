//! Deployable zip archive construction.
//!
//! The archive carries the installed dependency tree at its root plus the
//! configured source files flattened to their base names. Tree traversal is
//! sorted so identical inputs produce byte-identical archives.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::digest::ArchiveDigest;
use crate::error::{DeployError, Result};

/// Summary of a finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Archive file location.
    pub path: PathBuf,

    /// Number of file entries.
    pub entries: usize,

    /// Archive size in bytes.
    pub bytes: u64,

    /// SHA-256 digest of the archive file.
    pub digest: ArchiveDigest,
}

/// Incremental zip archive writer.
pub struct ArchiveBuilder {
    writer: ZipWriter<File>,
    path: PathBuf,
    entries: usize,
}

impl ArchiveBuilder {
    /// Create a new archive at `path`.
    pub fn create(path: &Path) -> Result<ArchiveBuilder> {
        let file = File::create(path)?;
        Ok(ArchiveBuilder {
            writer: ZipWriter::new(file),
            path: path.to_path_buf(),
            entries: 0,
        })
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
    }

    /// Add every file under `root`, named relative to `root`.
    ///
    /// Top-level entries whose name appears in `shadowed` are skipped: a
    /// flattened source appended later takes their place, which is the
    /// overwrite behavior of appending to an existing archive.
    pub fn add_tree(&mut self, root: &Path, shadowed: &HashSet<String>) -> Result<usize> {
        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        files.sort();

        let mut added = 0usize;
        for file in files {
            let rel = file
                .strip_prefix(root)
                .map_err(|e| DeployError::Archive(e.to_string()))?;
            let name = entry_name(rel);

            if !name.contains('/') && shadowed.contains(&name) {
                debug!(entry = %name, "Skipping tree entry shadowed by source file");
                continue;
            }

            self.write_entry(&name, &file)?;
            added += 1;
        }

        Ok(added)
    }

    /// Add a single file under its base name, directory components stripped.
    pub fn add_flattened(&mut self, file: &Path) -> Result<()> {
        let name = file
            .file_name()
            .ok_or_else(|| DeployError::Archive(format!("no file name in {:?}", file)))?
            .to_string_lossy()
            .to_string();
        self.write_entry(&name, file)
    }

    fn write_entry(&mut self, name: &str, file: &Path) -> Result<()> {
        let mut contents = Vec::new();
        File::open(file)?.read_to_end(&mut contents)?;

        self.writer
            .start_file(name, Self::options())
            .map_err(|e| DeployError::Archive(e.to_string()))?;
        self.writer.write_all(&contents)?;
        self.entries += 1;
        Ok(())
    }

    /// Close the archive and return its summary.
    ///
    /// A finished archive must be non-empty: zero entries means nothing
    /// would be deployed, which is always a configuration error upstream.
    pub fn finish(mut self) -> Result<ArchiveSummary> {
        if self.entries == 0 {
            return Err(DeployError::Archive("archive has no entries".to_string()));
        }

        self.writer
            .finish()
            .map_err(|e| DeployError::Archive(e.to_string()))?;

        let bytes = std::fs::metadata(&self.path)?.len();
        let digest = ArchiveDigest::from_file(&self.path)?;

        Ok(ArchiveSummary {
            path: self.path,
            entries: self.entries,
            bytes,
            digest,
        })
    }
}

/// Deduplicate sources by base name, keeping the last occurrence, in a
/// stable order. This is the append-with-overwrite rule for flattened
/// entries.
pub fn flatten_plan(sources: &[PathBuf]) -> Vec<(String, PathBuf)> {
    let mut plan: Vec<(String, PathBuf)> = Vec::new();
    for source in sources {
        let name = match source.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if let Some(existing) = plan.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = source.clone();
        } else {
            plan.push((name, source.clone()));
        }
    }
    plan
}

/// Zip entry name for a relative path (forward slashes on every platform).
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Simple recursive directory walker (no external dependency).
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                collect_files(&path, out)?;
            } else {
                out.push(path);
            }
        }
    }
    Ok(())
}

//! Integration tests for the deploy pipeline with MemoryFunctionService.

use std::io::Read;
use std::path::{Path, PathBuf};

use fnship_core::remote::fakes::MemoryFunctionService;
use fnship_core::{DeployPipeline, Manifest};

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_manifest(dir: &Path, sources: &[&str]) -> PathBuf {
    let listed = sources
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    write_file(
        dir,
        "fnship.toml",
        format!(
            r#"
[function]
name = "features-day"
region = "us-east-1"

[package]
dependencies = []
sources = [{listed}]

[smoke]
event = "lambda_event.json"
"#
        )
        .as_bytes(),
    )
}

fn archive_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        entries.push((entry.name().to_string(), contents));
    }
    entries.sort();
    entries
}

/// Test: a manifest-driven deployment updates the function and smokes it.
#[tokio::test]
async fn test_manifest_driven_deploy() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "features_day.py",
        b"def handler(event, context):\n    return {}\n",
    );
    write_file(dir.path(), "lambda_event.json", br#"{"dates": [], "symbols": []}"#);
    let manifest_path = write_manifest(dir.path(), &["features_day.py"]);

    let spec = Manifest::load_spec(&manifest_path).unwrap();
    let service = MemoryFunctionService::new();

    let report = DeployPipeline::run(&spec, &service).await.unwrap();

    assert!(report.smoke.dispatched());
    assert_eq!(service.updates().len(), 1);
    assert_eq!(service.updates()[0].function, "features-day");
    assert_eq!(service.invokes().len(), 1);
    assert_eq!(
        service.invokes()[0].payload,
        br#"{"dates": [], "symbols": []}"#
    );
}

/// Test: the packaged archive carries every source under its base name,
/// byte-for-byte, with duplicate base names resolved last-writer-wins.
#[tokio::test]
async fn test_package_flattens_sources() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "features_day.py", b"# v1 handler\n");
    write_file(dir.path(), "common/reup_utils.py", b"# shared utils\n");
    write_file(dir.path(), "patched/features_day.py", b"# v2 handler\n");
    write_file(dir.path(), "lambda_event.json", b"{}");
    let manifest_path = write_manifest(
        dir.path(),
        &[
            "features_day.py",
            "common/reup_utils.py",
            "patched/features_day.py",
        ],
    );

    let spec = Manifest::load_spec(&manifest_path).unwrap();
    let output = dir.path().join("function.zip");
    let summary = DeployPipeline::package(&spec, &output).await.unwrap();

    assert_eq!(summary.entries, 2);
    let entries = archive_entries(&output);
    assert_eq!(
        entries,
        vec![
            ("features_day.py".to_string(), b"# v2 handler\n".to_vec()),
            ("reup_utils.py".to_string(), b"# shared utils\n".to_vec()),
        ]
    );
}

/// Test: packaging the same spec twice from clean state produces
/// byte-identical archives.
#[tokio::test]
async fn test_package_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "features_day.py", b"# handler\n");
    write_file(dir.path(), "lambda_event.json", b"{}");
    let manifest_path = write_manifest(dir.path(), &["features_day.py"]);
    let spec = Manifest::load_spec(&manifest_path).unwrap();

    let out_a = dir.path().join("a.zip");
    let out_b = dir.path().join("b.zip");
    let summary_a = DeployPipeline::package(&spec, &out_a).await.unwrap();
    let summary_b = DeployPipeline::package(&spec, &out_b).await.unwrap();

    assert_eq!(summary_a.digest, summary_b.digest);
    assert_eq!(std::fs::read(&out_a).unwrap(), std::fs::read(&out_b).unwrap());
}

/// Test: a failed upload aborts the pipeline before any invocation.
#[tokio::test]
async fn test_failed_upload_stops_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "features_day.py", b"# handler\n");
    write_file(dir.path(), "lambda_event.json", b"{}");
    let manifest_path = write_manifest(dir.path(), &["features_day.py"]);
    let spec = Manifest::load_spec(&manifest_path).unwrap();

    let service = MemoryFunctionService::failing_updates();
    let err = DeployPipeline::run(&spec, &service).await.unwrap_err();

    assert!(err.to_string().contains("remote error"));
    assert!(service.invokes().is_empty());
}

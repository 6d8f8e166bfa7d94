use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use uuid::Uuid;

use crate::artifacts::{DeviceType, RunSummary};
use crate::constants::SUMMARY_FILE_NAME;
use crate::search::SourceKind;

/// Facts about the run that the scheduler does not know
#[derive(Debug, Clone)]
pub struct RunDetails<'a> {
    pub hostname: &'a str,
    pub started: &'a str,
    pub finished: &'a str,
    pub device: DeviceType,
    pub source_kind: SourceKind,
    pub input: &'a Path,
    pub container_sha256: Option<&'a str>,
    pub indexed: usize,
    pub extraction_failures: usize,
}

/// Create a JSON summary of the run.
///
/// # Example Output
///
/// ```json
/// {
///   "run_id": "550e8400-e29b-41d4-a716-446655440000",
///   "analysis_host": "examiner-01",
///   "started": "2024-01-15T14:30:52Z",
///   "device_type": "ios",
///   "source": { "kind": "tar", "path": "...", "sha256": "...", ... },
///   "artifacts": { "processed": 4, "selected": 5, "failed": 1, "outcomes": [...] }
/// }
/// ```
pub fn create_run_summary(details: &RunDetails<'_>, run: &RunSummary) -> Result<String> {
    let summary = json!({
        "run_id": Uuid::new_v4().to_string(),
        "analysis_host": details.hostname,
        "started": details.started,
        "finished": details.finished,
        "engine_version": env!("CARGO_PKG_VERSION"),
        "device_type": details.device,
        "source": {
            "kind": details.source_kind,
            "path": details.input.display().to_string(),
            "sha256": details.container_sha256,
            "indexed": details.indexed,
            "extraction_failures": details.extraction_failures,
        },
        "artifacts": {
            "processed": run.processed,
            "selected": run.selected,
            "failed": run.failed,
            "elapsed_secs": run.elapsed_secs,
            "outcomes": run.outcomes,
        },
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
}

/// Write the run summary into `output_dir`
pub fn write_run_summary(output_dir: &Path, details: &RunDetails<'_>, run: &RunSummary) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE_NAME);
    let summary = create_run_summary(details, run)?;
    fs::write(&path, summary).context(format!("Failed to write run summary to {}", path.display()))?;
    Ok(path)
}

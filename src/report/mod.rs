//! Report sinks.
//!
//! The scheduler hands every processed artifact with rows to a
//! [`ReportSink`] exactly once, plus optional timeline and geolocation
//! exports when the artifact asks for them. Rendering documents from these
//! records is left to downstream tooling; the bundled [`JsonReportSink`]
//! writes them as JSON so a run leaves a machine-readable result tree.
//!
//! ```text
//! <report>/
//! ├── Address Book/
//! │   └── ADDRESS_BOOK.json
//! ├── Data Usage/
//! │   └── DATA_USAGE_PROCESS.json
//! ├── _timeline.jsonl
//! └── _kml.jsonl
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::artifacts::{ArtifactDescriptor, Row};

/// Timeline export file below the report folder
pub const TIMELINE_FILE_NAME: &str = "_timeline.jsonl";

/// Geolocation export file below the report folder
pub const KML_FILE_NAME: &str = "_kml.jsonl";

/// Everything a sink learns about one processed artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub category: &'a str,
    pub description: &'a str,
    pub headers: &'a [&'static str],
    pub rows: &'a [Row],
    pub source_paths: &'a [PathBuf],
}

impl<'a> ArtifactReport<'a> {
    pub fn from_descriptor(descriptor: &'a ArtifactDescriptor) -> Self {
        let info = descriptor.info();
        ArtifactReport {
            id: descriptor.id(),
            name: info.name,
            category: info.category,
            description: info.description,
            headers: info.headers,
            rows: descriptor.rows(),
            source_paths: descriptor.source_paths(),
        }
    }

    /// Rows keyed by header name
    pub fn records(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        self.rows.iter().map(move |row| {
            self.headers
                .iter()
                .zip(row.iter())
                .map(|(header, value)| (header.to_string(), value.clone()))
                .collect()
        })
    }
}

/// Destination for artifact results
pub trait ReportSink {
    /// Called once per processed artifact with report output enabled
    fn write_artifact(&mut self, report: &ArtifactReport<'_>) -> Result<()>;

    /// Called when the artifact exports to the timeline
    fn write_timeline(&mut self, _report: &ArtifactReport<'_>) -> Result<()> {
        Ok(())
    }

    /// Called when the artifact exports geolocation records
    fn write_geolocation(&mut self, _report: &ArtifactReport<'_>) -> Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn write_artifact(&mut self, _report: &ArtifactReport<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON document per artifact, grouped by category
#[derive(Debug)]
pub struct JsonReportSink {
    root: PathBuf,
    written: usize,
    timeline: bool,
    kml: bool,
}

impl JsonReportSink {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .context(format!("Failed to create report folder: {}", root.display()))?;
        Ok(JsonReportSink {
            root: root.to_path_buf(),
            written: 0,
            timeline: true,
            kml: true,
        })
    }

    /// Turn the timeline and geolocation exports on or off
    pub fn with_exports(mut self, timeline: bool, kml: bool) -> Self {
        self.timeline = timeline;
        self.kml = kml;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of artifact documents written so far
    pub fn written(&self) -> usize {
        self.written
    }

    fn append_records(&self, file_name: &str, report: &ArtifactReport<'_>) -> Result<()> {
        let path = self.root.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for record in report.records() {
            let line = json!({
                "artifact": report.id,
                "name": report.name,
                "category": report.category,
                "data": record,
            });
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ReportSink for JsonReportSink {
    fn write_artifact(&mut self, report: &ArtifactReport<'_>) -> Result<()> {
        let folder = self.root.join(folder_name(report.category));
        fs::create_dir_all(&folder)
            .context(format!("Failed to create report folder: {}", folder.display()))?;

        let path = folder.join(format!("{}.json", report.id));
        let file = File::create(&path).context(format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)
            .context(format!("Failed to write {}", path.display()))?;
        writer.flush()?;

        self.written += 1;
        debug!("Wrote {} rows to {}", report.rows.len(), path.display());
        Ok(())
    }

    fn write_timeline(&mut self, report: &ArtifactReport<'_>) -> Result<()> {
        if !self.timeline {
            return Ok(());
        }
        self.append_records(TIMELINE_FILE_NAME, report)
    }

    fn write_geolocation(&mut self, report: &ArtifactReport<'_>) -> Result<()> {
        if !self.kml {
            return Ok(());
        }
        self.append_records(KML_FILE_NAME, report)
    }
}

/// Category names become folder names; path separators are not allowed
fn folder_name(category: &str) -> String {
    category
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            _ => c,
        })
        .collect()
}

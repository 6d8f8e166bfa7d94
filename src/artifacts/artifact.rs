use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use log::{debug, info};

use crate::error::SeekerError;
use crate::search::{Found, SearchOptions, Seeker};

/// One result row, ordered like the artifact's report headers
pub type Row = Vec<serde_json::Value>;

/// Static metadata an artifact declares about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Display name used in logs and reports
    pub name: &'static str,
    /// Report section the artifact belongs to
    pub category: &'static str,
    pub description: &'static str,
    /// Column names every row is ordered by
    pub headers: &'static [&'static str],
    /// Always runs regardless of selection
    pub core: bool,
    /// Deselected by bulk selection unless explicitly opted in
    pub long_running: bool,
    /// Rows are written to the report sink
    pub report: bool,
    /// Rows are exported to the timeline
    pub timeline: bool,
    /// Rows are exported as geolocation records
    pub kml: bool,
}

impl ArtifactInfo {
    pub const fn new(name: &'static str, category: &'static str) -> Self {
        ArtifactInfo {
            name,
            category,
            description: "",
            headers: &[],
            core: false,
            long_running: false,
            report: true,
            timeline: false,
            kml: false,
        }
    }

    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn headers(mut self, headers: &'static [&'static str]) -> Self {
        self.headers = headers;
        self
    }

    pub const fn core(mut self) -> Self {
        self.core = true;
        self
    }

    pub const fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    pub const fn timeline(mut self) -> Self {
        self.timeline = true;
        self
    }

    pub const fn kml(mut self) -> Self {
        self.kml = true;
        self
    }

    pub const fn without_report(mut self) -> Self {
        self.report = false;
        self
    }
}

/// Contract every parser plugin implements.
///
/// An artifact declares the patterns it needs; by the time `process` runs
/// at least one of them has matched, and the handles are available through
/// [`ArtifactContext::found`].
pub trait Artifact {
    fn info(&self) -> ArtifactInfo;

    /// Glob patterns locating the evidence this artifact parses
    fn patterns(&self) -> &'static [&'static str];

    fn search_options(&self) -> SearchOptions {
        SearchOptions::default()
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>>;
}

/// What an artifact gets to see while it runs
pub struct ArtifactContext<'a> {
    seeker: &'a mut Seeker,
    patterns: &'static [&'static str],
    options: SearchOptions,
    report_folder: Option<&'a Path>,
}

impl<'a> ArtifactContext<'a> {
    pub fn new(
        seeker: &'a mut Seeker,
        patterns: &'static [&'static str],
        options: SearchOptions,
        report_folder: Option<&'a Path>,
    ) -> Self {
        ArtifactContext {
            seeker,
            patterns,
            options,
            report_folder,
        }
    }

    /// Handles resolved for the declared patterns
    pub fn found(&mut self) -> Result<Found<'_>, SeekerError> {
        self.seeker.find(self.patterns, self.options)
    }

    /// Seeker for lookups beyond the declared patterns
    pub fn seeker(&mut self) -> &mut Seeker {
        self.seeker
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.patterns
    }

    /// Folder reports are written to, when reporting is enabled
    pub fn report_folder(&self) -> Option<&Path> {
        self.report_folder
    }
}

/// Registry entry: an artifact instance plus its scheduling and result state
pub struct ArtifactDescriptor {
    id: String,
    type_name: &'static str,
    info: ArtifactInfo,
    patterns: &'static [&'static str],
    options: SearchOptions,
    artifact: Box<dyn Artifact>,
    selected: bool,
    processed: bool,
    elapsed: Duration,
    rows: Vec<Row>,
    source_paths: Vec<PathBuf>,
    error: Option<String>,
}

impl ArtifactDescriptor {
    pub fn new(id: impl Into<String>, artifact: Box<dyn Artifact>) -> Self {
        let info = artifact.info();
        let patterns = artifact.patterns();
        let options = artifact.search_options();
        ArtifactDescriptor {
            id: id.into(),
            type_name: "",
            info,
            patterns,
            options,
            artifact,
            selected: false,
            processed: false,
            elapsed: Duration::ZERO,
            rows: Vec::new(),
            source_paths: Vec::new(),
            error: None,
        }
    }

    /// Record the plugin type name the artifact was registered from
    pub fn with_type_name(mut self, type_name: &'static str) -> Self {
        self.type_name = type_name;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Plugin type name, `AddressBook` for `ADDRESS_BOOK`
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }

    pub fn name(&self) -> &'static str {
        self.info.name
    }

    pub fn category(&self) -> &'static str {
        self.info.category
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.patterns
    }

    pub fn is_core(&self) -> bool {
        self.info.core
    }

    pub fn is_long_running(&self) -> bool {
        self.info.long_running
    }

    /// Core artifacts count as selected whatever their flag says
    pub fn is_selected(&self) -> bool {
        self.info.core || self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn processed(&self) -> bool {
        self.processed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Evidence paths the rows were parsed from
    pub fn source_paths(&self) -> &[PathBuf] {
        &self.source_paths
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Run the artifact against `seeker`
    pub fn process(&mut self, seeker: &mut Seeker) -> (Duration, bool) {
        self.process_in(seeker, None)
    }

    /// Run the artifact, returning elapsed time and whether it processed.
    ///
    /// Errors and panics inside the plugin are recorded on the descriptor.
    /// No matching evidence is not a failure: the artifact is marked
    /// processed with zero rows.
    pub fn process_in(&mut self, seeker: &mut Seeker, report_folder: Option<&Path>) -> (Duration, bool) {
        self.processed = false;
        self.rows.clear();
        self.source_paths.clear();
        self.error = None;

        let start = Instant::now();
        let result = self.run(seeker, report_folder);
        self.elapsed = start.elapsed();

        match result {
            Ok(()) => self.processed = true,
            Err(e) => self.error = Some(format!("{:#}", e)),
        }
        (self.elapsed, self.processed)
    }

    fn run(&mut self, seeker: &mut Seeker, report_folder: Option<&Path>) -> Result<()> {
        self.source_paths = {
            let found = seeker.find(self.patterns, self.options)?;
            found.paths().into_iter().map(Path::to_path_buf).collect()
        };
        if self.source_paths.is_empty() {
            info!("No files found for {} [{}]", self.info.category, self.info.name);
            return Ok(());
        }

        let mut ctx = ArtifactContext::new(seeker, self.patterns, self.options, report_folder);
        let artifact = &mut self.artifact;
        let rows = match panic::catch_unwind(AssertUnwindSafe(|| artifact.process(&mut ctx))) {
            Ok(rows) => rows?,
            Err(payload) => bail!("artifact panicked: {}", panic_message(payload.as_ref())),
        };

        let width = self.info.headers.len();
        if width > 0 {
            if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
                bail!("row {} has {} columns, expected {}", index, row.len(), width);
            }
        }

        debug!("{} [{}] produced {} rows", self.info.category, self.info.name, rows.len());
        self.rows = rows;
        Ok(())
    }
}

impl fmt::Debug for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactDescriptor")
            .field("id", &self.id)
            .field("name", &self.info.name)
            .field("category", &self.info.category)
            .field("selected", &self.is_selected())
            .field("processed", &self.processed)
            .field("rows", &self.rows.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

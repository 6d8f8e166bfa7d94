use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::artifacts::artifact::ArtifactDescriptor;
use crate::artifacts::registry::ArtifactRegistry;
use crate::constants::{CORE_PRIORITY, DEFAULT_PRIORITY};
use crate::report::{ArtifactReport, ReportSink};
use crate::search::Seeker;

/// Progress of one scheduling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Done,
}

/// Status of one artifact after it ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactOutcome {
    pub id: String,
    pub name: String,
    pub category: String,
    pub processed: bool,
    pub elapsed_secs: f64,
    pub rows: usize,
    pub error: Option<String>,
}

impl ArtifactOutcome {
    fn from_descriptor(descriptor: &ArtifactDescriptor) -> Self {
        ArtifactOutcome {
            id: descriptor.id().to_string(),
            name: descriptor.name().to_string(),
            category: descriptor.category().to_string(),
            processed: descriptor.processed(),
            elapsed_secs: descriptor.elapsed().as_secs_f64(),
            rows: descriptor.rows().len(),
            error: descriptor.error().map(str::to_string),
        }
    }
}

/// Aggregate counts for a finished run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub selected: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub outcomes: Vec<ArtifactOutcome>,
}

/// Runs the selected artifacts of a registry one at a time, core ones first.
///
/// The queue is ordered by `(priority, identifier)`; selection is checked
/// when an entry is popped, so selection changes made before the first
/// `step` are honoured.
pub struct Scheduler {
    registry: ArtifactRegistry,
    queue: BinaryHeap<Reverse<(u8, String)>>,
    state: RunState,
    started: Option<Instant>,
    elapsed: Duration,
    outcomes: Vec<ArtifactOutcome>,
    report_folder: Option<PathBuf>,
}

impl Scheduler {
    pub fn new(registry: ArtifactRegistry) -> Self {
        let queue = registry
            .iter()
            .map(|artifact| {
                let priority = if artifact.is_core() {
                    CORE_PRIORITY
                } else {
                    DEFAULT_PRIORITY
                };
                Reverse((priority, artifact.id().to_string()))
            })
            .collect();

        Scheduler {
            registry,
            queue,
            state: RunState::NotStarted,
            started: None,
            elapsed: Duration::ZERO,
            outcomes: Vec::new(),
            report_folder: None,
        }
    }

    /// Folder artifacts may write their own side files to
    pub fn with_report_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.report_folder = Some(folder.into());
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    /// Registry access for selection changes before the run starts
    pub fn registry_mut(&mut self) -> &mut ArtifactRegistry {
        &mut self.registry
    }

    /// Run the next selected artifact. Returns `None` once the queue is empty.
    pub fn step(&mut self, seeker: &mut Seeker, sink: &mut dyn ReportSink) -> Option<ArtifactOutcome> {
        match self.state {
            RunState::Done => return None,
            RunState::NotStarted => {
                self.state = RunState::Running;
                self.started = Some(Instant::now());
                info!(
                    "Processing {} of {} artifacts...",
                    self.registry.selected().len(),
                    self.registry.len()
                );
            }
            RunState::Running => {}
        }

        let id = loop {
            let Some(Reverse((_, id))) = self.queue.pop() else {
                self.finish();
                return None;
            };
            if self.registry.get(&id).map_or(false, |a| a.is_selected()) {
                break id;
            }
        };
        let descriptor = self.registry.get_mut(&id)?;

        info!("{} [{}] artifact processing...", descriptor.category(), descriptor.name());
        let (elapsed, processed) = descriptor.process_in(seeker, self.report_folder.as_deref());
        if processed {
            info!(
                "{} [{}] artifact completed in {:.2}s",
                descriptor.category(),
                descriptor.name(),
                elapsed.as_secs_f64()
            );
        } else {
            warn!(
                "{} [{}] artifact failed: {}",
                descriptor.category(),
                descriptor.name(),
                descriptor.error().unwrap_or("unknown error")
            );
        }

        let mut outcome = ArtifactOutcome::from_descriptor(descriptor);
        if processed && !descriptor.rows().is_empty() {
            if let Err(e) = forward(descriptor, sink) {
                warn!("{} [{}] report failed: {:#}", descriptor.category(), descriptor.name(), e);
                outcome.error = Some(format!("report: {:#}", e));
            }
        }

        self.outcomes.push(outcome.clone());
        Some(outcome)
    }

    /// Run every remaining selected artifact
    pub fn run(&mut self, seeker: &mut Seeker, sink: &mut dyn ReportSink) -> RunSummary {
        while self.step(seeker, sink).is_some() {}
        self.summary()
    }

    /// Counts over the artifacts that ran so far
    pub fn summary(&self) -> RunSummary {
        let processed = self.outcomes.iter().filter(|o| o.processed).count();
        let elapsed = match (self.state, self.started) {
            (RunState::Running, Some(started)) => started.elapsed(),
            _ => self.elapsed,
        };
        RunSummary {
            processed,
            selected: self.outcomes.len(),
            failed: self.outcomes.len() - processed,
            elapsed_secs: elapsed.as_secs_f64(),
            outcomes: self.outcomes.clone(),
        }
    }

    fn finish(&mut self) {
        if self.state == RunState::Done {
            return;
        }
        self.state = RunState::Done;
        if let Some(started) = self.started {
            self.elapsed = started.elapsed();
        }
        let processed = self.outcomes.iter().filter(|o| o.processed).count();
        info!(
            "Processes completed: {} of {} artifacts processed in {:.2}s",
            processed,
            self.outcomes.len(),
            self.elapsed.as_secs_f64()
        );
    }
}

fn forward(descriptor: &ArtifactDescriptor, sink: &mut dyn ReportSink) -> Result<()> {
    let info = descriptor.info();
    let report = ArtifactReport::from_descriptor(descriptor);
    if info.report {
        sink.write_artifact(&report)?;
    }
    if info.timeline {
        sink.write_timeline(&report)?;
    }
    if info.kml {
        sink.write_geolocation(&report)?;
    }
    Ok(())
}

//! Artifact plugins, their registry and the scheduler that runs them.
//!
//! An artifact is any type implementing [`Artifact`] + `Default`. Plugin
//! modules group their artifacts in a [`PluginSet`] for one device type;
//! [`ArtifactRegistry::build`] turns the sets for the target device into
//! descriptors keyed by an uppercase identifier derived from the type name.
//!
//! ## Architecture
//!
//! ```text
//!  PluginSet (ios) ─┐
//!  PluginSet (...) ─┼─> ArtifactRegistry ──> Scheduler ──> ReportSink
//!                   │    id -> descriptor     │  priority queue
//!                   │                         │  core (1) before optional (10)
//!                   │                         v
//!                   │                       Seeker (shared handle cache)
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use leapp_engine::artifacts::{builtin_plugins, ArtifactRegistry, DeviceType, Scheduler};
//! use leapp_engine::report::NullSink;
//! use leapp_engine::search::{CacheOptions, Seeker, SourceKind};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut registry = ArtifactRegistry::build(DeviceType::Ios, &builtin_plugins())?;
//! registry.select(&["ADDRESS_BOOK"], true)?;
//!
//! let mut seeker = Seeker::open(
//!     SourceKind::Fs,
//!     Path::new("/evidence/extraction"),
//!     Path::new("/tmp/case/data"),
//!     CacheOptions::default(),
//! )?;
//! let summary = Scheduler::new(registry).run(&mut seeker, &mut NullSink);
//! println!("{} of {} artifacts processed", summary.processed, summary.selected);
//! # Ok(())
//! # }
//! ```

mod artifact;
pub mod ios;
mod registry;
mod scheduler;

pub use artifact::{Artifact, ArtifactContext, ArtifactDescriptor, ArtifactInfo, Row};
pub use registry::{
    artifact_identifier, identifier_from_type_name, ArtifactRegistry, DeviceType, PluginSet,
};
pub use scheduler::{ArtifactOutcome, RunState, RunSummary, Scheduler};

/// Plugin sets compiled into this crate
pub fn builtin_plugins() -> Vec<PluginSet> {
    vec![ios::plugins()]
}

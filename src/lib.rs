//! # leapp-engine
//!
//! Evidence source abstraction and artifact scheduler for mobile forensic
//! parsers.
//!
//! ## Overview
//!
//! A forensic extraction arrives in one of several containers: an extracted
//! filesystem tree, a tar (optionally gzip compressed) or zip archive, or an
//! iTunes style backup whose files are indexed by `Manifest.db`. Parser
//! plugins ("artifacts") should not care which one. This crate puts every
//! container behind the same glob search, keeps the files an artifact opened
//! in a per-run cache so other artifacts reuse them, and runs the selected
//! artifacts one after another.
//!
//! ## Features
//!
//! - **Uniform search**: `*`, `?`, `**` and character classes over
//!   forward-slash relative paths, whatever the container
//! - **Extract once**: archive members are extracted to a scratch folder the
//!   first time a pattern needs them
//! - **Handle cache**: small SQLite databases are copied into memory, large
//!   ones stay read-only on disk, other files are opened as byte streams
//! - **Plugin registry**: explicit registration lists per device type with
//!   identifiers derived from the type name
//! - **Scheduler**: core artifacts first, failures isolated per artifact
//! - **Reports**: JSON documents per artifact plus timeline and geolocation
//!   exports, and a run summary with the container hash
//!
//! ## Usage
//!
//! ```no_run
//! use leapp_engine::artifacts::{builtin_plugins, ArtifactRegistry, DeviceType, Scheduler};
//! use leapp_engine::report::JsonReportSink;
//! use leapp_engine::search::{CacheOptions, Seeker, SourceKind};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut registry = ArtifactRegistry::build(DeviceType::Ios, &builtin_plugins())?;
//! registry.select_all(false);
//!
//! let mut seeker = Seeker::open(
//!     SourceKind::Zip,
//!     Path::new("/evidence/phone.zip"),
//!     Path::new("/cases/1/data"),
//!     CacheOptions::default(),
//! )?;
//! let mut sink = JsonReportSink::new(Path::new("/cases/1/reports"))?;
//!
//! let summary = Scheduler::new(registry).run(&mut seeker, &mut sink);
//! println!("{} processed, {} failed", summary.processed, summary.failed);
//! seeker.cleanup()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`search`]: evidence sources, patterns and the handle cache
//! - [`artifacts`]: plugin contract, registry, scheduler and reference plugins
//! - [`report`]: report sinks
//! - [`config`]: YAML run configuration
//! - [`error`]: typed errors at the library seams
//! - [`utils`]: container hashing and the run summary

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Evidence containers, search patterns and the handle cache
pub mod search;

/// Artifact plugins, registry and scheduler
pub mod artifacts;

/// Destinations for artifact results
pub mod report;

/// Run configuration
pub mod config;

/// Typed errors for the evidence and artifact layers
pub mod error;

/// Container hashing and run summary
pub mod utils;

/// Application constants and configuration values
pub mod constants;

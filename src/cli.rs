use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::artifacts::DeviceType;
use crate::config::RunConfig;
use crate::search::SourceKind;

/// Command-line arguments for the leapp tool.
///
/// Values given here override the configuration file.
#[derive(Parser, Debug)]
#[clap(name = "leapp", about = "Mobile forensic artifact parser", version)]
pub struct Args {
    /// Kind of evidence container (fs, tar, zip, itunes)
    #[clap(short = 't', long, value_enum)]
    pub input_type: Option<SourceKind>,

    /// Path to the evidence container
    #[clap(short, long)]
    pub input: Option<PathBuf>,

    /// Output folder for reports, extracted files and the run log
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Device type the extraction comes from
    #[clap(short, long, value_enum)]
    pub device: Option<DeviceType>,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Artifacts to run (comma-separated identifiers, e.g. ADDRESS_BOOK)
    #[clap(short = 'a', long)]
    pub artifacts: Option<String>,

    /// Run every artifact except long running ones
    #[clap(long)]
    pub all: bool,

    /// With --all, also run long running artifacts
    #[clap(long)]
    pub long_running: bool,

    /// Do not write reports
    #[clap(long)]
    pub no_report: bool,

    /// Do not hash the evidence container
    #[clap(long)]
    pub no_hash: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "leapp.yaml")]
        path: PathBuf,
    },

    /// List the artifacts available for a device type
    List {
        /// Device type (defaults to ios)
        #[clap(long, value_enum)]
        device: Option<DeviceType>,
    },
}

impl Args {
    /// Artifact identifiers or type names given with --artifacts
    pub fn artifact_list(&self) -> Vec<String> {
        self.artifacts
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Apply the command-line overrides to a loaded configuration
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(kind) = self.input_type {
            config.input_kind = kind;
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }

        let artifacts = self.artifact_list();
        if !artifacts.is_empty() {
            config.selection.artifacts = artifacts;
        }
        if self.all {
            config.selection.all = true;
        }
        if self.long_running {
            config.selection.include_long_running = true;
        }
        if self.no_report {
            config.report.enabled = false;
        }
        if self.no_hash {
            config.hash_container = false;
        }
    }
}

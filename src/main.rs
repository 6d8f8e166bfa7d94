use std::fs::{self, File};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use leapp_engine::artifacts::{builtin_plugins, ArtifactRegistry, DeviceType, RunSummary, Scheduler};
use leapp_engine::cli::{Args, Commands};
use leapp_engine::config::{load_or_create_config, RunConfig};
use leapp_engine::constants::{LOG_FILE_NAME, MAX_HASH_SIZE_MB, REPORT_DIR_NAME, SCRATCH_DIR_NAME};
use leapp_engine::report::{JsonReportSink, NullSink, ReportSink};
use leapp_engine::search::Seeker;
use leapp_engine::utils::hash::calculate_sha256;
use leapp_engine::utils::summary::{write_run_summary, RunDetails};

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Handle subcommands
    if let Some(cmd) = &args.command {
        initialize_logging(args.verbose, None)?;
        return handle_subcommand(cmd);
    }

    // Setup the output folder first so the run log lands in it
    let output_dir = args
        .output
        .clone()
        .ok_or_else(|| anyhow!("An output folder is required (--output)"))?;
    fs::create_dir_all(&output_dir)
        .context(format!("Failed to create output directory {}", output_dir.display()))?;
    initialize_logging(args.verbose, Some(&output_dir))?;

    let input = args
        .input
        .clone()
        .ok_or_else(|| anyhow!("An evidence container is required (--input)"))?;

    // Load configuration, command line wins
    let mut config = load_or_create_config(args.config.as_deref())?;
    args.apply_to(&mut config);

    info!("Starting {} processing of {}", config.input_kind, input.display());
    let started = chrono::Utc::now().to_rfc3339();

    // Registry errors are fatal before anything is opened
    let registry = build_registry(&config)?;

    // Container errors are fatal before scheduling
    let scratch = output_dir.join(SCRATCH_DIR_NAME);
    let mut seeker = Seeker::open(config.input_kind, &input, &scratch, config.cache_options())
        .context(format!("Failed to open evidence {}", input.display()))?;

    let report_dir = output_dir.join(REPORT_DIR_NAME);
    let run = process_artifacts(registry, &mut seeker, &config, &report_dir)?;

    let indexed = seeker.source().indexed();
    let extraction_failures = seeker.source().extraction_failures();
    seeker.cleanup().context("Failed to release the evidence container")?;

    let container_sha256 = hash_container(&input, &config);
    let hostname = hostname::get()
        .map_err(|e| anyhow!("Failed to get hostname: {}", e))?
        .to_string_lossy()
        .to_string();
    let finished = chrono::Utc::now().to_rfc3339();

    let details = RunDetails {
        hostname: &hostname,
        started: &started,
        finished: &finished,
        device: config.device_type,
        source_kind: config.input_kind,
        input: &input,
        container_sha256: container_sha256.as_deref(),
        indexed,
        extraction_failures,
    };
    let summary_path = write_run_summary(&output_dir, &details, &run)?;
    info!("Run summary written to {}", summary_path.display());

    if run.failed > 0 {
        warn!("{} of {} artifacts failed, see {}", run.failed, run.selected, LOG_FILE_NAME);
    }
    if extraction_failures > 0 {
        warn!("{} evidence files could not be extracted", extraction_failures);
    }

    info!("Processing completed successfully");
    Ok(())
}

/// Initialize logging with the specified verbosity level.
///
/// With an output folder the full debug log is also written to it.
fn initialize_logging(verbose: bool, output_dir: Option<&Path>) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(dir) = output_dir {
        let path = dir.join(LOG_FILE_NAME);
        let file = File::create(&path).context(format!("Failed to create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
    }

    CombinedLogger::init(loggers).context("Failed to initialize logger")?;
    Ok(())
}

/// Handle subcommands (init-config and list)
fn handle_subcommand(cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            RunConfig::default().save_to_yaml_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::List { device } => {
            let device = device.unwrap_or(DeviceType::Ios);
            let registry = ArtifactRegistry::build(device, &builtin_plugins())?;
            for artifact in &registry {
                let info = artifact.info();
                println!(
                    "{:<28} {:<24} {:<24} {}{}",
                    artifact.id(),
                    artifact.type_name(),
                    info.category,
                    info.name,
                    if info.long_running { " (long running)" } else { "" }
                );
            }
            info!("{} artifacts available for {}", registry.len(), device);
            Ok(())
        }
    }
}

/// Build the registry for the configured device and apply the selection
fn build_registry(config: &RunConfig) -> Result<ArtifactRegistry> {
    let mut registry = ArtifactRegistry::build(config.device_type, &builtin_plugins())
        .context("Failed to load artifacts")?;

    let selection = &config.selection;
    if selection.all {
        registry.select_all(selection.include_long_running);
    }
    let ids: Vec<&str> = selection.artifacts.iter().map(String::as_str).collect();
    registry.select(&ids, true)?;

    if registry.selected().is_empty() {
        warn!("No artifacts selected, use --artifacts or --all");
    }
    Ok(registry)
}

/// Run the scheduler over the selected artifacts
fn process_artifacts(
    registry: ArtifactRegistry,
    seeker: &mut Seeker,
    config: &RunConfig,
    report_dir: &Path,
) -> Result<RunSummary> {
    let mut sink: Box<dyn ReportSink> = if config.report.enabled {
        Box::new(JsonReportSink::new(report_dir)?.with_exports(config.report.timeline, config.report.kml))
    } else {
        Box::new(NullSink)
    };

    let mut scheduler = Scheduler::new(registry);
    if config.report.enabled {
        scheduler = scheduler.with_report_folder(report_dir);
    }
    Ok(scheduler.run(seeker, sink.as_mut()))
}

/// SHA-256 of the container when it is a single file and hashing is enabled
fn hash_container(input: &Path, config: &RunConfig) -> Option<String> {
    if !config.hash_container {
        return None;
    }
    match calculate_sha256(input, MAX_HASH_SIZE_MB) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Failed to hash {}: {}", input.display(), e);
            None
        }
    }
}

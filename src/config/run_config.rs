use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::artifacts::DeviceType;
use crate::constants::{DEFAULT_MEMORY_DB_THRESHOLD, DEFAULT_NAMES_ONLY_THRESHOLD};
use crate::search::{CacheOptions, SourceKind};

/// Which artifacts run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Identifiers to select, e.g. `ADDRESS_BOOK`
    pub artifacts: Vec<String>,
    /// Select every optional artifact
    pub all: bool,
    /// With `all`, also select long running artifacts
    pub include_long_running: bool,
}

/// What the report sink receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    pub timeline: bool,
    pub kml: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            enabled: true,
            timeline: true,
            kml: true,
        }
    }
}

/// Settings for one processing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub device_type: DeviceType,
    pub input_kind: SourceKind,
    /// Patterns matching more files than this keep paths only
    pub names_only_threshold: usize,
    /// Databases under this size (in MB) are copied into memory
    pub memory_db_threshold_mb: u64,
    pub selection: SelectionConfig,
    pub report: ReportConfig,
    /// Record the SHA-256 of the container in the run summary
    pub hash_container: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            device_type: DeviceType::Ios,
            input_kind: SourceKind::Fs,
            names_only_threshold: DEFAULT_NAMES_ONLY_THRESHOLD,
            memory_db_threshold_mb: DEFAULT_MEMORY_DB_THRESHOLD / (1024 * 1024),
            selection: SelectionConfig::default(),
            report: ReportConfig::default(),
            hash_container: true,
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: RunConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config folder {}", parent.display()))?;
        }
        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Handle cache settings derived from this config
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            names_only_threshold: self.names_only_threshold,
            memory_db_threshold: self.memory_db_threshold_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Load configuration from a file, or create a default one
///
/// A path that does not exist yet receives the default configuration so the
/// next run can be tuned by editing it.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<RunConfig> {
    match config_path {
        Some(path) if path.exists() => RunConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let config = RunConfig::default();
            config.save_to_yaml_file(path)?;
            Ok(config)
        }
        None => {
            debug!("No config path provided, using default configuration");
            Ok(RunConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("leapp.yaml");

        let mut config = RunConfig::default();
        config.device_type = DeviceType::Android;
        config.input_kind = SourceKind::Tar;
        config.selection.artifacts = vec!["ADDRESS_BOOK".to_string()];
        config.save_to_yaml_file(&path).unwrap();

        let loaded = RunConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(fs::read_to_string(&path).unwrap().contains("input_kind: tar"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: RunConfig = serde_yaml::from_str("input_kind: zip\nreport:\n  kml: false\n").unwrap();
        assert_eq!(config.input_kind, SourceKind::Zip);
        assert_eq!(config.device_type, DeviceType::Ios);
        assert!(config.report.enabled);
        assert!(!config.report.kml);
        assert_eq!(config.names_only_threshold, DEFAULT_NAMES_ONLY_THRESHOLD);
    }

    #[test]
    fn test_cache_options() {
        let mut config = RunConfig::default();
        assert_eq!(config.cache_options(), CacheOptions::default());
        config.memory_db_threshold_mb = 1;
        assert_eq!(config.cache_options().memory_db_threshold, 1024 * 1024);
    }

    #[test]
    fn test_load_or_create_config_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/leapp.yaml");

        let config = load_or_create_config(Some(&path)).unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_or_create_config_no_path() {
        assert_eq!(load_or_create_config(None).unwrap(), RunConfig::default());
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "device_type: [unclosed").unwrap();
        assert!(RunConfig::from_yaml_file(&path).is_err());
    }
}

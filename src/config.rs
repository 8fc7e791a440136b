use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use csv_shuttle_core::classify::DEFAULT_MARKER;
use csv_shuttle_core::naming::{DEFAULT_OTHER_OUTPUT, DEFAULT_TRUTH_OUTPUT};

use crate::split::{DEFAULT_MIN_CHUNK_ROWS, DEFAULT_PROBE_INTERVAL};

/// Default config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./shuttle.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub split: SplitSettings,
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub azure: AzureSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitSettings {
    #[serde(default = "default_true")]
    pub keep_header: bool,
    #[serde(default = "default_probe_interval")]
    pub probe_interval: usize,
    #[serde(default = "default_min_chunk_rows")]
    pub min_rows_per_chunk: usize,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            keep_header: true,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            min_rows_per_chunk: DEFAULT_MIN_CHUNK_ROWS,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_probe_interval() -> usize {
    DEFAULT_PROBE_INTERVAL
}
fn default_min_chunk_rows() -> usize {
    DEFAULT_MIN_CHUNK_ROWS
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeSettings {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub add_metadata: bool,
    #[serde(default)]
    pub extended_metadata: bool,
    #[serde(default = "default_truth_output")]
    pub truth_output: String,
    #[serde(default = "default_other_output")]
    pub other_output: String,
    #[serde(default)]
    pub timestamped_outputs: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            case_sensitive: false,
            add_metadata: false,
            extended_metadata: false,
            truth_output: default_truth_output(),
            other_output: default_other_output(),
            timestamped_outputs: false,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}
fn default_truth_output() -> String {
    DEFAULT_TRUTH_OUTPUT.to_string()
}
fn default_other_output() -> String {
    DEFAULT_OTHER_OUTPUT.to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.csv".to_string()]
}

/// How credentials for the remote store are obtained.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Environment variables, then a SAS embedded in the URL.
    #[default]
    Ambient,
    ConnectionString,
    Token,
    Key,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AzureSettings {
    /// Blob service endpoint override (e.g. Azurite).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub account_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Write the log file as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load the configuration.
///
/// An explicit `path` must exist. Without one, `./shuttle.toml` is used when
/// present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => parse_file(path)?,
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_PATH);
            if fallback.exists() {
                parse_file(fallback)?
            } else {
                Config::minimal()
            }
        }
    };
    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    if config.split.probe_interval == 0 {
        anyhow::bail!("split.probe_interval must be > 0");
    }

    let merge = &config.merge;
    if merge.marker.is_empty() {
        anyhow::bail!("merge.marker must not be empty");
    }
    for name in [&merge.truth_output, &merge.other_output] {
        if !name.to_ascii_lowercase().ends_with(".csv") {
            anyhow::bail!("merge output name '{}' must end in .csv", name);
        }
    }
    if merge.truth_output == merge.other_output {
        anyhow::bail!("merge.truth_output and merge.other_output must differ");
    }
    if merge.include_globs.is_empty() {
        anyhow::bail!("merge.include_globs must list at least one pattern");
    }

    match config.logging.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown log level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    Ok(())
}

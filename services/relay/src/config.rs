//! Relay configuration.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use level2_wire::Compression;
use pipeline::OutputConfig;
use transport::{TapeConfig, TcpConfig};

/// Top-level relay configuration, loaded from YAML with environment
/// fallbacks for the file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub queue: QueueConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::Archive {
                files: Vec::new(),
                compression: Compression::Uncompressed,
                one_file_per_volume: true,
            },
            output: OutputConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Which transport feeds the pipeline, and its knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputConfig {
    /// A fixed, ordered file list.
    Archive {
        files: Vec<PathBuf>,
        #[serde(default)]
        compression: Compression,
        /// Off only for file lists captured from a segmented AR2V feed,
        /// where the title-bearing file holds metadata alone.
        #[serde(default = "default_one_file_per_volume")]
        one_file_per_volume: bool,
    },
    /// Scan a directory tree for arriving files.
    Realtime {
        base_dir: PathBuf,
        /// Dated subdirectory template (`Y`/`M`/`D`/`h` tokens), optional.
        dir_template: Option<String>,
        /// Filename template (`YMDhms` time tokens plus `S` for sequence).
        name_template: String,
        #[serde(default)]
        compression: Compression,
        #[serde(default = "default_quiescence_secs")]
        quiescence_secs: u64,
        #[serde(default)]
        min_file_size: u64,
        #[serde(default = "default_max_valid_age_secs")]
        max_valid_age_secs: u64,
        #[serde(default = "default_max_search_minutes")]
        max_search_minutes: u64,
        #[serde(default)]
        one_file_per_volume: bool,
    },
    Tcp(TcpConfig),
    Tape(TapeConfig),
}

fn default_one_file_per_volume() -> bool {
    true
}

fn default_quiescence_secs() -> u64 {
    2
}

fn default_max_valid_age_secs() -> u64 {
    3600
}

fn default_max_search_minutes() -> u64 {
    10
}

/// Where published beams go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// JSON-lines output file; stdout when unset.
    pub path: Option<PathBuf>,
}

impl RelayConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config path from the CLI, the `RADAR_RELAY_CONFIG`
    /// environment variable, or fall back to defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }
        if let Ok(path) = env::var("RADAR_RELAY_CONFIG") {
            return Self::from_file(Path::new(&path));
        }
        Ok(Self::default())
    }
}

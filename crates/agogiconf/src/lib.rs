//! Layered configuration loading for agogic.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/agogic/config.toml` (system)
//! 2. `~/.config/agogic/config.toml` (user)
//! 3. `./agogic.toml` (local override), or the path given with `--config`
//! 4. Environment variables (`AGOGIC_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! dataset_dir = "~/data/asap-dataset"
//! cache_dir = "~/.cache/agogic"
//!
//! [corpus]
//! composers = ["Bach"]
//! time_signature = "4/4"
//! excluded = ["Bach/Prelude/bwv_885/"]
//!
//! [model]
//! estimator = "random"
//! test_fraction = 0.2
//! split_seed = 1
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{CorpusConfig, ModelConfig, PathsConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete agogic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgogicConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AgogicConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, reading `config_path` in place of the local
    /// `./agogic.toml`. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = AgogicConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let quoted = |items: &[String]| {
            items
                .iter()
                .map(|s| format!("{s:?}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut output = String::new();
        output.push_str("# agogic configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "dataset_dir = {:?}\n",
            self.paths.dataset_dir.display().to_string()
        ));
        output.push_str(&format!(
            "cache_dir = {:?}\n",
            self.paths.cache_dir.display().to_string()
        ));

        output.push_str("\n[corpus]\n");
        output.push_str(&format!("composers = [{}]\n", quoted(&self.corpus.composers)));
        output.push_str(&format!("time_signature = {:?}\n", self.corpus.time_signature));
        output.push_str(&format!("excluded = [{}]\n", quoted(&self.corpus.excluded)));

        output.push_str("\n[model]\n");
        output.push_str(&format!("estimator = {:?}\n", self.model.estimator));
        output.push_str(&format!("test_fraction = {:?}\n", self.model.test_fraction));
        output.push_str(&format!("split_seed = {}\n", self.model.split_seed));
        match self.model.sample_seed {
            Some(seed) => output.push_str(&format!("sample_seed = {seed}\n")),
            None => output.push_str("# sample_seed unset: sampling draws from entropy\n"),
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {:?}\n", self.telemetry.log_level));

        output
    }
}

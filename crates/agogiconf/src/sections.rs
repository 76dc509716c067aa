//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the corpus lives and where derived beat lists are cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Corpus root holding `metadata.csv` and `asap_annotations.json`.
    /// Default: data/asap-dataset
    #[serde(default = "PathsConfig::default_dataset_dir")]
    pub dataset_dir: PathBuf,

    /// Beat list cache.
    /// Default: ~/.cache/agogic
    #[serde(default = "PathsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl PathsConfig {
    fn default_dataset_dir() -> PathBuf {
        PathBuf::from("data/asap-dataset")
    }

    fn default_cache_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.cache_dir().join("agogic"))
            .unwrap_or_else(|| PathBuf::from(".cache/agogic"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_dir: Self::default_dataset_dir(),
            cache_dir: Self::default_cache_dir(),
        }
    }
}

/// Which performances form the subcorpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Composers to keep. Empty keeps everyone.
    #[serde(default)]
    pub composers: Vec<String>,

    /// Default: 4/4
    #[serde(default = "CorpusConfig::default_time_signature")]
    pub time_signature: String,

    /// Path fragments of performances with known-bad annotations.
    #[serde(default = "CorpusConfig::default_excluded")]
    pub excluded: Vec<String>,
}

impl CorpusConfig {
    fn default_time_signature() -> String {
        "4/4".to_string()
    }

    fn default_excluded() -> Vec<String> {
        vec!["Bach/Prelude/bwv_885/".to_string()]
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            composers: Vec::new(),
            time_signature: Self::default_time_signature(),
            excluded: Self::default_excluded(),
        }
    }
}

/// Estimator choice and random seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// random or linear. Default: random
    #[serde(default = "ModelConfig::default_estimator")]
    pub estimator: String,

    /// Share of pieces held out for averaging. Default: 0.2
    #[serde(default = "ModelConfig::default_test_fraction")]
    pub test_fraction: f64,

    /// Default: 1
    #[serde(default = "ModelConfig::default_split_seed")]
    pub split_seed: u64,

    /// Seed for Gaussian sampling; unset draws from entropy.
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

impl ModelConfig {
    fn default_estimator() -> String {
        "random".to_string()
    }

    fn default_test_fraction() -> f64 {
        0.2
    }

    fn default_split_seed() -> u64 {
        1
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            estimator: Self::default_estimator(),
            test_fraction: Self::default_test_fraction(),
            split_seed: Self::default_split_seed(),
            sample_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

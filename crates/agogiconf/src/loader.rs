//! Config file discovery, loading, and environment variable overlay.

use crate::{AgogicConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/agogic/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("agogic/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("agogic.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay the keys it sets over `config`.
pub fn apply_file(config: &mut AgogicConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    apply_toml(config, &contents, path)
}

/// Lay the keys set in a TOML document over `config`. Keys the document
/// does not mention keep their current value.
pub fn apply_toml(config: &mut AgogicConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let section = Section { table: &table, path };

    if let Some(paths) = section.child("paths")? {
        if let Some(v) = paths.str("dataset_dir")? {
            config.paths.dataset_dir = expand_path(v);
        }
        if let Some(v) = paths.str("cache_dir")? {
            config.paths.cache_dir = expand_path(v);
        }
    }

    if let Some(corpus) = section.child("corpus")? {
        if let Some(v) = corpus.strings("composers")? {
            config.corpus.composers = v;
        }
        if let Some(v) = corpus.str("time_signature")? {
            config.corpus.time_signature = v.to_string();
        }
        if let Some(v) = corpus.strings("excluded")? {
            config.corpus.excluded = v;
        }
    }

    if let Some(model) = section.child("model")? {
        if let Some(v) = model.str("estimator")? {
            config.model.estimator = v.to_string();
        }
        if let Some(v) = model.float("test_fraction")? {
            config.model.test_fraction = v;
        }
        if let Some(v) = model.unsigned("split_seed")? {
            config.model.split_seed = v;
        }
        if let Some(v) = model.unsigned("sample_seed")? {
            config.model.sample_seed = Some(v);
        }
    }

    if let Some(telemetry) = section.child("telemetry")? {
        if let Some(v) = telemetry.str("log_level")? {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// Typed access to one TOML table, reporting mistyped keys.
struct Section<'a> {
    table: &'a toml::Table,
    path: &'a Path,
}

impl<'a> Section<'a> {
    fn mistyped(&self, key: &str, expected: &str) -> ConfigError {
        ConfigError::Parse {
            path: self.path.to_path_buf(),
            message: format!("{key}: expected {expected}"),
        }
    }

    fn child(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_table()
                .map(|table| Some(Section { table, path: self.path }))
                .ok_or_else(|| self.mistyped(key, "a table")),
        }
    }

    fn str(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| self.mistyped(key, "a string")),
        }
    }

    fn strings(&self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        let Some(v) = self.table.get(key) else {
            return Ok(None);
        };
        let items = v.as_array().ok_or_else(|| self.mistyped(key, "an array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.mistyped(key, "an array of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn float(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Float(f)) => Ok(Some(*f)),
            Some(toml::Value::Integer(i)) => Ok(Some(*i as f64)),
            Some(_) => Err(self.mistyped(key, "a number")),
        }
    }

    fn unsigned(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_integer()
                .and_then(|i| u64::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| self.mistyped(key, "a non-negative integer")),
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut AgogicConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any key lookup. Unparseable numbers are ignored.
pub fn apply_overrides_from(
    config: &mut AgogicConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let mut take = |key: &str| {
        let value = lookup(key);
        if value.is_some() {
            sources.env_overrides.push(key.to_string());
        }
        value
    };

    if let Some(v) = take("AGOGIC_DATASET_DIR") {
        config.paths.dataset_dir = expand_path(&v);
    }
    if let Some(v) = take("AGOGIC_CACHE_DIR") {
        config.paths.cache_dir = expand_path(&v);
    }
    if let Some(v) = take("AGOGIC_TIME_SIGNATURE") {
        config.corpus.time_signature = v;
    }
    if let Some(v) = take("AGOGIC_ESTIMATOR") {
        config.model.estimator = v;
    }
    if let Some(fraction) = take("AGOGIC_TEST_FRACTION").and_then(|v| v.parse().ok()) {
        config.model.test_fraction = fraction;
    }
    if let Some(seed) = take("AGOGIC_SPLIT_SEED").and_then(|v| v.parse().ok()) {
        config.model.split_seed = seed;
    }
    if let Some(seed) = take("AGOGIC_SAMPLE_SEED").and_then(|v| v.parse().ok()) {
        config.model.sample_seed = Some(seed);
    }
    if let Some(v) = take("AGOGIC_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    // Also support RUST_LOG
    if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        directories::BaseDirs::new()
            .map(|d| d.home_dir().join(stripped))
            .unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/corpus/asap");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("corpus/asap"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/data/asap"), PathBuf::from("/data/asap"));
    }

    #[test]
    fn test_expand_unknown_var_is_left_alone() {
        assert_eq!(
            expand_path("$AGOGIC_SURELY_UNSET_VAR/x"),
            PathBuf::from("$AGOGIC_SURELY_UNSET_VAR/x")
        );
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_partial_file_keeps_other_values() {
        let mut config = AgogicConfig::default();
        config.model.split_seed = 7;
        let toml = r#"
[paths]
dataset_dir = "/data/asap"
"#;
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.paths.dataset_dir, PathBuf::from("/data/asap"));
        assert_eq!(config.model.split_seed, 7);
        assert_eq!(config.corpus.time_signature, "4/4");
    }

    #[test]
    fn test_full_file() {
        let toml = r#"
[paths]
dataset_dir = "/data/asap"
cache_dir = "/tmp/agogic"

[corpus]
composers = ["Bach", "Chopin"]
time_signature = "3/4"
excluded = []

[model]
estimator = "linear"
test_fraction = 0.25
split_seed = 3
sample_seed = 42

[telemetry]
log_level = "debug"
"#;
        let mut config = AgogicConfig::default();
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.paths.cache_dir, PathBuf::from("/tmp/agogic"));
        assert_eq!(config.corpus.composers, vec!["Bach", "Chopin"]);
        assert_eq!(config.corpus.time_signature, "3/4");
        assert!(config.corpus.excluded.is_empty());
        assert_eq!(config.model.estimator, "linear");
        assert_eq!(config.model.test_fraction, 0.25);
        assert_eq!(config.model.split_seed, 3);
        assert_eq!(config.model.sample_seed, Some(42));
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_integer_fraction_is_accepted() {
        let mut config = AgogicConfig::default();
        apply_toml(&mut config, "[model]\ntest_fraction = 1\n", Path::new("t.toml")).unwrap();
        assert_eq!(config.model.test_fraction, 1.0);
    }

    #[test]
    fn test_mistyped_key_is_an_error() {
        let mut config = AgogicConfig::default();
        let err = apply_toml(&mut config, "[model]\nsplit_seed = \"one\"\n", Path::new("t.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("split_seed"));

        let err = apply_toml(&mut config, "corpus = 3\n", Path::new("t.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_are_recorded() {
        let env: HashMap<&str, &str> = [
            ("AGOGIC_ESTIMATOR", "linear"),
            ("AGOGIC_SPLIT_SEED", "9"),
            ("AGOGIC_TEST_FRACTION", "lots"),
        ]
        .into_iter()
        .collect();

        let mut config = AgogicConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.model.estimator, "linear");
        assert_eq!(config.model.split_seed, 9);
        assert_eq!(config.model.test_fraction, 0.2);
        assert_eq!(
            sources.env_overrides,
            vec!["AGOGIC_ESTIMATOR", "AGOGIC_TEST_FRACTION", "AGOGIC_SPLIT_SEED"]
        );
    }
}

//! Resolving configuration and flags into a loaded subcorpus.

use agogic::{
    BeatListCache, Corpus, CorpusFilter, CorpusLoader, CsvEventTables, EstimatorKind, LoadReport,
    TimeSignature, TransferSettings,
};
use agogiconf::AgogicConfig;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::CorpusArgs;

/// Flags layered over configuration for one command.
pub struct Session<'a> {
    pub config: &'a AgogicConfig,
    pub args: &'a CorpusArgs,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a AgogicConfig, args: &'a CorpusArgs) -> Self {
        Self { config, args }
    }

    pub fn time_signature(&self) -> Result<TimeSignature> {
        match self.args.time_signature {
            Some(ts) => Ok(ts),
            None => self
                .config
                .corpus
                .time_signature
                .parse()
                .with_context(|| {
                    format!("Invalid time_signature in config: {:?}", self.config.corpus.time_signature)
                }),
        }
    }

    pub fn estimator(&self) -> Result<EstimatorKind> {
        match self.args.estimator {
            Some(kind) => Ok(kind),
            None => self
                .config
                .model
                .estimator
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid estimator in config"),
        }
    }

    /// Composers from `--composer` and `--style`, else from config.
    pub fn composers(&self) -> Vec<String> {
        let mut composers = self.args.composers.clone();
        if let Some(style) = self.args.style {
            composers.extend(style.composers().iter().map(|c| c.to_string()));
        }
        if composers.is_empty() {
            composers = self.config.corpus.composers.clone();
        }
        composers.sort();
        composers.dedup();
        composers
    }

    pub fn filter(&self) -> Result<CorpusFilter> {
        let mut filter = CorpusFilter::new(self.composers(), self.time_signature()?);
        filter.excluded = self.config.corpus.excluded.clone();
        Ok(filter)
    }

    pub fn settings(&self) -> Result<TransferSettings> {
        Ok(TransferSettings {
            estimator: self.estimator()?,
            test_fraction: self.config.model.test_fraction,
            split_seed: self.config.model.split_seed,
        })
    }

    /// Sampling RNG from `seed`, else the configured seed, else entropy.
    pub fn rng(&self, seed: Option<u64>) -> StdRng {
        match seed.or(self.config.model.sample_seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Load the subcorpus through the cache, with a progress bar on stderr.
    pub fn load(&self) -> Result<LoadReport> {
        let filter = self.filter()?;
        let root = &self.config.paths.dataset_dir;
        let loader = CorpusLoader::new(root, CsvEventTables::new(root))
            .with_cache(BeatListCache::new(&self.config.paths.cache_dir));

        let loaded = if self.args.refresh {
            info!(key = %filter.cache_key(), "refreshing beat list cache");
            loader.refresh(&filter)
        } else {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:40.green/dim}] {pos}/{len} {msg:.dim}")
                    .context("Invalid progress template")?
                    .progress_chars("█▓▒░ "),
            );
            pb.set_message("reading annotations");
            let report = loader.load_with_progress(&filter, |done, total| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            });
            pb.finish_and_clear();
            report
        };

        let report =
            loaded.with_context(|| format!("Failed to load corpus from {}", root.display()))?;
        // fresh loads already log each skip as it happens
        if report.from_cache {
            for skipped in &report.skipped {
                warn!(piece = %skipped.piece, reason = %skipped.reason, "skipped piece");
            }
        }
        Ok(report)
    }

    /// Load and return only the pieces, failing when none qualify.
    pub fn corpus(&self) -> Result<Corpus> {
        let report = self.load()?;
        if report.corpus.is_empty() {
            anyhow::bail!(
                "No pieces in {} match the filter ({} skipped)",
                self.config.paths.dataset_dir.display(),
                report.skipped.len()
            );
        }
        Ok(report.corpus)
    }
}

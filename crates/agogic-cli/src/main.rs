//! agogic - expressive timing and dynamics transfer from a performance corpus
//!
//! Subcommands:
//! - `agogic corpus` - Load a subcorpus and list skipped pieces
//! - `agogic fit` - Fit an estimator and print its parameters
//! - `agogic transfer` - Apply learned velocities and tempi to an event table
//! - `agogic evaluate` - Error of averaged estimates against human performances
//! - `agogic expressiveness` - Per-composer inter-onset interval spread
//! - `agogic onsets` - Where in the measure notes start
//! - `agogic config` - Print the effective configuration

use std::path::PathBuf;

use agogic::{EstimatorKind, PerformanceType, Style, TimeSignature};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

mod commands;
mod session;

#[derive(Parser)]
#[command(name = "agogic")]
#[command(about = "Corpus-driven expressive timing and dynamics transfer")]
#[command(version)]
struct Cli {
    /// Config file, read in place of ./agogic.toml
    #[arg(long, global = true, env = "AGOGIC_CONFIG")]
    config: Option<PathBuf>,

    /// Corpus root with metadata.csv and asap_annotations.json
    #[arg(long, global = true)]
    dataset_dir: Option<PathBuf>,

    /// Beat list cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcorpus selection and model choice shared by the corpus commands.
#[derive(Args, Debug, Clone, Default)]
pub struct CorpusArgs {
    /// Composer to include (repeatable)
    #[arg(long = "composer")]
    pub composers: Vec<String>,

    /// Style period whose composers to include
    #[arg(long)]
    pub style: Option<Style>,

    /// Time signature of the pieces to keep, e.g. 3/4
    #[arg(long)]
    pub time_signature: Option<TimeSignature>,

    /// Estimator: random or linear
    #[arg(long)]
    pub estimator: Option<EstimatorKind>,

    /// Ignore and rewrite the beat list cache
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a subcorpus and report skipped pieces
    Corpus {
        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Fit an estimator on the training split and print its parameters as JSON
    Fit {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// time or velocity
        #[arg(long, default_value = "time")]
        performance: PerformanceType,
    },

    /// Build transfer functions and apply them to a score event table
    Transfer {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Score event table (CSV)
        #[arg(long)]
        events: PathBuf,

        /// Where to write the performed event table
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave out performances whose path contains this (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Seed for Gaussian sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Nominal tempo of the score, for half beats without an estimate
        #[arg(long, default_value = "120")]
        tempo: f64,
    },

    /// Compare averaged estimates with averaged human performances
    Evaluate {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Seed for Gaussian sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Mean spread of inter-onset intervals per composer
    Expressiveness {
        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Average share of note onsets per location in the measure
    Onsets {
        /// Score event tables (CSV)
        #[arg(required = true)]
        events: Vec<PathBuf>,

        /// Time signature of the scores
        #[arg(long, default_value = "4/4")]
        time_signature: TimeSignature,

        /// Locations per beat
        #[arg(long, default_value = "4")]
        subdivision: u32,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = agogiconf::AgogicConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = cli.dataset_dir {
        config.paths.dataset_dir = dir;
    }
    if let Some(dir) = cli.cache_dir {
        config.paths.cache_dir = dir;
    }

    init_tracing(&config.telemetry.log_level);
    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Commands::Corpus { corpus } => {
            commands::corpus(&config, &corpus)?;
        }
        Commands::Fit {
            corpus,
            performance,
        } => {
            commands::fit(&config, &corpus, performance)?;
        }
        Commands::Transfer {
            corpus,
            events,
            output,
            exclude,
            seed,
            tempo,
        } => {
            commands::transfer(
                &config,
                &corpus,
                commands::TransferArgs {
                    events,
                    output,
                    exclude,
                    seed,
                    tempo,
                },
            )?;
        }
        Commands::Evaluate { corpus, seed } => {
            commands::evaluate(&config, &corpus, seed)?;
        }
        Commands::Expressiveness { corpus } => {
            commands::expressiveness(&config, &corpus)?;
        }
        Commands::Onsets {
            events,
            time_signature,
            subdivision,
        } => {
            commands::onsets(&events, time_signature, subdivision)?;
        }
        Commands::Config => {
            commands::config(&config, &sources);
        }
    }

    Ok(())
}

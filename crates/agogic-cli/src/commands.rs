//! Command implementations. Results go to stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use agogic::events::{read_event_table, write_event_table};
use agogic::{
    average_onset_distribution, build_transfer_functions, mean_expressiveness, Corpus, Evaluation,
    Piece, PerformanceType, ScoreEvent, TimeSignature,
};
use agogiconf::{AgogicConfig, ConfigSources};
use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use tracing::{info, warn};

use crate::session::Session;
use crate::CorpusArgs;

pub fn corpus(config: &AgogicConfig, args: &CorpusArgs) -> Result<()> {
    let session = Session::new(config, args);
    let report = session.load()?;
    let filter = session.filter()?;

    println!(
        "{} {} pieces in {}{}",
        "corpus:".if_supports_color(Stream::Stdout, |t| t.bold()),
        report.corpus.len(),
        filter.cache_key(),
        if report.from_cache { " (cached)" } else { "" }
    );
    if !report.skipped.is_empty() {
        println!(
            "{} {}",
            "skipped:".if_supports_color(Stream::Stdout, |t| t.yellow()),
            report.skipped.len()
        );
        for skipped in &report.skipped {
            println!("  {}  {}", skipped.piece, skipped.reason);
        }
    }
    Ok(())
}

pub fn fit(config: &AgogicConfig, args: &CorpusArgs, performance: PerformanceType) -> Result<()> {
    let session = Session::new(config, args);
    let corpus = session.corpus()?;
    let settings = session.settings()?;

    let (train, _test) =
        agogic::train_test_split(&corpus, settings.test_fraction, settings.split_seed)
            .context("Failed to split corpus")?;
    info!(train = train.len(), estimator = %settings.estimator, %performance, "fitting");

    let model = settings
        .estimator
        .build(performance)
        .fit(&train)
        .context("Failed to fit estimator")?;
    println!("{}", serde_json::to_string_pretty(&model.parameters())?);
    Ok(())
}

pub struct TransferArgs {
    pub events: PathBuf,
    pub output: Option<PathBuf>,
    pub exclude: Vec<String>,
    pub seed: Option<u64>,
    pub tempo: f64,
}

/// `score.events.csv` → `score.performed.csv`
fn default_output(events: &Path) -> PathBuf {
    let name = events
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("score.events.csv");
    let stem = name
        .strip_suffix(".events.csv")
        .or_else(|| name.strip_suffix(".csv"))
        .unwrap_or(name);
    events.with_file_name(format!("{stem}.performed.csv"))
}

/// Drop pieces whose id contains any of `fragments`.
fn without(corpus: Corpus, fragments: &[String]) -> Corpus {
    if fragments.is_empty() {
        return corpus;
    }
    let (kept, dropped): (Vec<_>, Vec<_>) = corpus
        .pieces
        .into_iter()
        .partition(|p| !fragments.iter().any(|f| p.id.contains(f.as_str())));
    for piece in &dropped {
        info!(piece = %piece.id, "excluded from transfer");
    }
    Corpus::new(kept)
}

pub fn transfer(config: &AgogicConfig, args: &CorpusArgs, transfer: TransferArgs) -> Result<()> {
    let session = Session::new(config, args);
    let score: Vec<ScoreEvent> = read_event_table(&transfer.events)
        .with_context(|| format!("Failed to read {}", transfer.events.display()))?;
    let corpus = without(session.corpus()?, &transfer.exclude);
    let settings = session.settings()?;
    let mut rng = session.rng(transfer.seed);

    let built = build_transfer_functions(&corpus, &settings, &mut rng)
        .context("Failed to build transfer functions")?;

    let performed = built.velocity.function.apply_velocity(&score);
    let output = transfer.output.unwrap_or_else(|| default_output(&transfer.events));
    write_event_table(&output, &performed)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output = %output.display(), events = performed.len(), "wrote performed event table");

    let tempo_map = built.time.function.tempo_map(&score, transfer.tempo);
    let missing = tempo_map.iter().filter(|p| !p.transferred).count();
    if missing > 0 {
        warn!(missing, nominal = transfer.tempo, "half beats without a tempo estimate");
    }
    println!("{}", serde_json::to_string_pretty(&tempo_map)?);
    Ok(())
}

fn print_evaluation(label: &str, estimated: &Evaluation, unperformed: &Evaluation) {
    println!(
        "{:<9} estimated  mae {:>8.3}  rmse {:>8.3}  points {}",
        label.if_supports_color(Stream::Stdout, |t| t.bold()),
        estimated.mean_absolute_error,
        estimated.root_mean_squared_error,
        estimated.compared
    );
    println!(
        "{:<9} score      mae {:>8.3}  rmse {:>8.3}  points {}",
        "",
        unperformed.mean_absolute_error,
        unperformed.root_mean_squared_error,
        unperformed.compared
    );
}

pub fn evaluate(config: &AgogicConfig, args: &CorpusArgs, seed: Option<u64>) -> Result<()> {
    let session = Session::new(config, args);
    let corpus = session.corpus()?;
    let settings = session.settings()?;
    let mut rng = session.rng(seed);

    let built = build_transfer_functions(&corpus, &settings, &mut rng)
        .context("Failed to build transfer functions")?;
    println!(
        "{} {} train, {} test, estimator {}",
        "split:".if_supports_color(Stream::Stdout, |t| t.bold()),
        built.split.train.len(),
        built.split.test.len(),
        settings.estimator
    );
    for (label, transfer) in [("time", &built.time), ("velocity", &built.velocity)] {
        print_evaluation(
            label,
            &transfer.average.evaluate(),
            &transfer.average.evaluate_unperformed(),
        );
    }
    Ok(())
}

/// First path component of a piece id, which names the composer.
fn composer_of(id: &str) -> &str {
    id.split('/').next().unwrap_or(id)
}

pub fn expressiveness(config: &AgogicConfig, args: &CorpusArgs) -> Result<()> {
    let session = Session::new(config, args);
    let corpus = session.corpus()?;
    let beats = session.time_signature()?.numerator as usize;

    let mut by_composer: BTreeMap<&str, Vec<&Piece>> = BTreeMap::new();
    for piece in &corpus {
        by_composer.entry(composer_of(&piece.id)).or_default().push(piece);
    }

    for (composer, pieces) in &by_composer {
        println!(
            "{:<16} {:>4} pieces  expressiveness {:.4}",
            composer.if_supports_color(Stream::Stdout, |t| t.bold()),
            pieces.len(),
            mean_expressiveness(pieces.iter().copied(), beats)
        );
    }
    Ok(())
}

pub fn onsets(events: &[PathBuf], time_signature: TimeSignature, subdivision: u32) -> Result<()> {
    let tables = events
        .iter()
        .map(|path| {
            read_event_table(path).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let distribution = average_onset_distribution(
        tables.iter().map(Vec::as_slice),
        time_signature,
        subdivision,
    );
    if distribution.scores == 0 {
        anyhow::bail!("No score has onsets on the {time_signature} grid");
    }
    println!("{}", serde_json::to_string_pretty(&distribution)?);
    Ok(())
}

pub fn config(config: &AgogicConfig, sources: &ConfigSources) {
    for file in &sources.files {
        println!("# loaded {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# overridden by ${var}");
    }
    print!("{}", config.to_toml());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/scores/bwv_846.events.csv")),
            PathBuf::from("/scores/bwv_846.performed.csv")
        );
        assert_eq!(
            default_output(Path::new("table.csv")),
            PathBuf::from("table.performed.csv")
        );
    }

    #[test]
    fn composer_is_first_path_component() {
        assert_eq!(composer_of("Bach/Fugue/bwv_846/Shi05M.mid"), "Bach");
        assert_eq!(composer_of("solo"), "solo");
    }

    #[test]
    fn exclusion_matches_fragments() {
        let piece = |id: &str| Piece {
            id: id.into(),
            tempo: 120.0,
            score_beats: vec![],
            score_downbeats: vec![],
            performance_beats: vec![],
            performance_downbeats: vec![],
            score_velocities: vec![],
            performance_velocities: vec![],
        };
        let corpus = Corpus::new(vec![
            piece("Bach/Fugue/bwv_846/a.mid"),
            piece("Bach/Fugue/bwv_848/a.mid"),
        ]);
        let kept = without(corpus, &["bwv_846".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.pieces[0].id, "Bach/Fugue/bwv_848/a.mid");
    }
}

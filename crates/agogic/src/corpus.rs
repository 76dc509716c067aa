//! Corpus loading: metadata, beat annotations and per-beat velocities.
//!
//! A corpus root holds `metadata.csv` (one row per performance) and
//! `asap_annotations.json` (beat annotations keyed by performance path).
//! Loading filters the rows by composer and time signature and turns each
//! qualifying performance into a [`Piece`]. Pieces with bad or unsuitable
//! annotations are skipped and reported, never fatal; unreadable files are.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::BeatListCache;
use crate::events::{velocities_at_beats, EventTableSource};
use crate::{Error, Result};

pub const METADATA_FILE: &str = "metadata.csv";
pub const ANNOTATIONS_FILE: &str = "asap_annotations.json";

/// Performances whose annotations are known to be wrong (midi beats of
/// 1.42 where 0.5 is expected). Matched as path fragments.
pub const KNOWN_CORRUPT: &[&str] = &["Bach/Prelude/bwv_885/"];

/// A `numerator/denominator` time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Tempo implied by the spacing of the first two downbeats.
    pub fn tempo(&self, downbeats: &[f64]) -> Option<f64> {
        let [first, second, ..] = downbeats else {
            return None;
        };
        let measure = second - first;
        (measure > 0.0).then(|| 60.0 * self.numerator as f64 / measure)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeSignature(s.to_string());
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator: u8 = num.trim().parse().map_err(|_| invalid())?;
        let denominator: u8 = den.trim().parse().map_err(|_| invalid())?;
        if numerator == 0 || denominator == 0 {
            return Err(invalid());
        }
        Ok(Self::new(numerator, denominator))
    }
}

/// Named style periods, each a fixed list of composers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    Baroque,
    Classical,
    Romantic,
    Impressionist,
    LateRussian,
}

impl Style {
    pub const ALL: [Style; 5] = [
        Style::Baroque,
        Style::Classical,
        Style::Romantic,
        Style::Impressionist,
        Style::LateRussian,
    ];

    pub fn composers(&self) -> &'static [&'static str] {
        match self {
            Style::Baroque => &["Bach"],
            Style::Classical => &["Haydn", "Mozart"],
            Style::Romantic => &[
                "Beethoven",
                "Schubert",
                "Chopin",
                "Glinka",
                "Schumann",
                "Liszt",
                "Brahms",
            ],
            Style::Impressionist => &["Debussy", "Ravel"],
            Style::LateRussian => &["Balakirev", "Prokofiev", "Rachmaninoff", "Scriabin"],
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Style::Baroque => "baroque",
            Style::Classical => "classical",
            Style::Romantic => "romantic",
            Style::Impressionist => "impressionist",
            Style::LateRussian => "late-russian",
        };
        f.write_str(name)
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown style: {s}"))
    }
}

/// Which performances make up a subcorpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFilter {
    /// Composers to keep; empty keeps everyone.
    pub composers: Vec<String>,
    pub time_signature: TimeSignature,
    /// Path fragments of performances to leave out.
    pub excluded: Vec<String>,
}

impl CorpusFilter {
    pub fn new(composers: Vec<String>, time_signature: TimeSignature) -> Self {
        Self {
            composers,
            time_signature,
            excluded: KNOWN_CORRUPT.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn for_style(style: Style, time_signature: TimeSignature) -> Self {
        Self::new(
            style.composers().iter().map(|c| c.to_string()).collect(),
            time_signature,
        )
    }

    pub fn excluding(mut self, fragment: impl Into<String>) -> Self {
        self.excluded.push(fragment.into());
        self
    }

    pub fn accepts_composer(&self, composer: &str) -> bool {
        self.composers.is_empty() || self.composers.iter().any(|c| c == composer)
    }

    /// Stable identifier used to name the cache directory.
    ///
    /// Filters that differ only in the order of their lists share a key.
    /// Exclusions beyond the known-corrupt defaults add a `_x<hash>` suffix.
    pub fn cache_key(&self) -> String {
        let composers = if self.composers.is_empty() {
            "all".to_string()
        } else {
            let mut sorted = self.composers.clone();
            sorted.sort();
            sorted.dedup();
            sorted.join("+")
        };
        let key = format!(
            "{}_{}-{}",
            composers, self.time_signature.numerator, self.time_signature.denominator
        );

        let mut excluded = self.excluded.clone();
        excluded.sort();
        excluded.dedup();
        if excluded.iter().map(String::as_str).eq(KNOWN_CORRUPT.iter().copied()) {
            key
        } else {
            let digest = blake3::hash(excluded.join("\n").as_bytes()).to_hex();
            format!("{key}_x{}", &digest.as_str()[..16])
        }
    }
}

/// One score paired with one human performance, beat-aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    /// Performance path relative to the corpus root
    pub id: String,
    /// Nominal tempo of the score in BPM
    pub tempo: f64,
    pub score_beats: Vec<f64>,
    pub score_downbeats: Vec<f64>,
    pub performance_beats: Vec<f64>,
    pub performance_downbeats: Vec<f64>,
    /// Score velocity around each score beat
    pub score_velocities: Vec<f64>,
    /// Performed velocity around each score beat
    pub performance_velocities: Vec<f64>,
}

impl Piece {
    /// Check the beat-alignment invariants.
    pub fn validate(&self) -> std::result::Result<(), SkipReason> {
        if self.score_downbeats.len() < 2 {
            return Err(SkipReason::TooFewDownbeats);
        }
        let score = self.score_beats.len();
        for other in [
            self.performance_beats.len(),
            self.score_velocities.len(),
            self.performance_velocities.len(),
        ] {
            if other != score {
                return Err(SkipReason::LengthMismatch {
                    score,
                    performance: other,
                });
            }
        }
        Ok(())
    }
}

/// An ordered set of pieces sharing a time signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub pieces: Vec<Piece>,
}

impl Corpus {
    pub fn new(pieces: Vec<Piece>) -> Self {
        Self { pieces }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Piece> {
        self.pieces.iter()
    }

    /// The pieces at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Corpus {
        Corpus::new(
            indices
                .iter()
                .filter_map(|&i| self.pieces.get(i).cloned())
                .collect(),
        )
    }

    pub fn score_beats(&self) -> Vec<&[f64]> {
        self.pieces.iter().map(|p| p.score_beats.as_slice()).collect()
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a Piece;
    type IntoIter = std::slice::Iter<'a, Piece>;

    fn into_iter(self) -> Self::IntoIter {
        self.pieces.iter()
    }
}

/// Why a performance was left out of a subcorpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// Matched an exclusion fragment
    Excluded { fragment: String },
    MissingAnnotation,
    MultipleTimeSignatures { count: usize },
    TimeSignatureMismatch { found: String },
    TooFewDownbeats,
    LengthMismatch { score: usize, performance: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded { fragment } => write!(f, "excluded ({fragment})"),
            SkipReason::MissingAnnotation => write!(f, "no annotation entry"),
            SkipReason::MultipleTimeSignatures { count } => {
                write!(f, "{count} time signatures")
            }
            SkipReason::TimeSignatureMismatch { found } => {
                write!(f, "time signature {found}")
            }
            SkipReason::TooFewDownbeats => write!(f, "fewer than two downbeats"),
            SkipReason::LengthMismatch { score, performance } => {
                write!(f, "{score} score beats vs {performance} aligned values")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPiece {
    pub piece: String,
    pub reason: SkipReason,
}

/// Result of loading a subcorpus.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub corpus: Corpus,
    pub skipped: Vec<SkippedPiece>,
    /// True when the pieces came from the beat list cache
    pub from_cache: bool,
}

/// One row of `metadata.csv`. Columns not listed here are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataRow {
    pub composer: String,
    pub performance_annotations: String,
    pub midi_performance: String,
    pub midi_score: String,
}

/// Beat annotations of one performance.
#[derive(Debug, Clone, Deserialize)]
pub struct Annotation {
    /// Onset → signature. Values are `"N/D"` or `["N/D", N]`.
    pub midi_score_time_signatures: BTreeMap<String, serde_json::Value>,
    pub midi_score_beats: Vec<f64>,
    pub midi_score_downbeats: Vec<f64>,
    pub performance_beats: Vec<f64>,
    #[serde(default)]
    pub performance_downbeats: Option<Vec<f64>>,
}

impl Annotation {
    /// The single time signature of the score, if it has exactly one.
    fn time_signature(&self) -> std::result::Result<String, SkipReason> {
        if self.midi_score_time_signatures.len() != 1 {
            return Err(SkipReason::MultipleTimeSignatures {
                count: self.midi_score_time_signatures.len(),
            });
        }
        let value = self
            .midi_score_time_signatures
            .values()
            .next()
            .ok_or(SkipReason::MultipleTimeSignatures { count: 0 })?;

        let text = match value {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()),
            _ => None,
        };
        text.map(str::to_string)
            .ok_or_else(|| SkipReason::TimeSignatureMismatch {
                found: value.to_string(),
            })
    }
}

/// Read the metadata table.
pub fn read_metadata(path: &Path) -> Result<Vec<MetadataRow>> {
    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<MetadataRow>, _>>()
        .map_err(csv_err)
}

/// Read the annotation file, keyed by performance path.
pub fn read_annotations(path: &Path) -> Result<BTreeMap<String, Annotation>> {
    let file = std::fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads subcorpora from a corpus root, through an optional cache.
pub struct CorpusLoader<S> {
    root: PathBuf,
    events: S,
    cache: Option<BeatListCache>,
}

impl<S: EventTableSource> CorpusLoader<S> {
    pub fn new(root: impl Into<PathBuf>, events: S) -> Self {
        Self {
            root: root.into(),
            events,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: BeatListCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a subcorpus, reusing the cache when it holds this filter.
    pub fn load(&self, filter: &CorpusFilter) -> Result<LoadReport> {
        self.load_with_progress(filter, |_, _| {})
    }

    /// Load a subcorpus, ignoring and then replacing any cached copy.
    pub fn refresh(&self, filter: &CorpusFilter) -> Result<LoadReport> {
        let report = self.load_fresh(filter, |_, _| {})?;
        self.store(filter, &report)?;
        Ok(report)
    }

    /// Like [`load`](Self::load), calling `progress(done, total)` per
    /// metadata row when reading annotations.
    pub fn load_with_progress(
        &self,
        filter: &CorpusFilter,
        progress: impl FnMut(usize, usize),
    ) -> Result<LoadReport> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.load(&filter.cache_key())? {
                info!(
                    key = %filter.cache_key(),
                    pieces = cached.corpus.len(),
                    "beat list cache hit"
                );
                return Ok(LoadReport {
                    corpus: cached.corpus,
                    skipped: cached.skipped,
                    from_cache: true,
                });
            }
            info!(key = %filter.cache_key(), "beat list cache miss, reading annotations");
        }

        let report = self.load_fresh(filter, progress)?;
        self.store(filter, &report)?;
        Ok(report)
    }

    fn store(&self, filter: &CorpusFilter, report: &LoadReport) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.store(&filter.cache_key(), &report.corpus, &report.skipped)?;
        }
        Ok(())
    }

    fn load_fresh(
        &self,
        filter: &CorpusFilter,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<LoadReport> {
        if !self.root.is_dir() {
            return Err(Error::CorpusRootMissing(self.root.clone()));
        }

        let rows: Vec<MetadataRow> = read_metadata(&self.root.join(METADATA_FILE))?
            .into_iter()
            .filter(|row| filter.accepts_composer(&row.composer))
            .collect();
        let annotations = read_annotations(&self.root.join(ANNOTATIONS_FILE))?;

        let mut report = LoadReport::default();
        let total = rows.len();

        for (done, row) in rows.iter().enumerate() {
            match self.load_piece(row, &annotations, filter)? {
                Ok(piece) => {
                    debug!(piece = %piece.id, beats = piece.score_beats.len(), "loaded piece");
                    report.corpus.pieces.push(piece);
                }
                Err(reason) => {
                    warn!(piece = %row.midi_performance, %reason, "skipping piece");
                    report.skipped.push(SkippedPiece {
                        piece: row.midi_performance.clone(),
                        reason,
                    });
                }
            }
            progress(done + 1, total);
        }

        info!(
            pieces = report.corpus.len(),
            skipped = report.skipped.len(),
            time_signature = %filter.time_signature,
            "loaded subcorpus"
        );
        Ok(report)
    }

    /// Outer error is fatal I/O; inner error is a per-piece skip.
    fn load_piece(
        &self,
        row: &MetadataRow,
        annotations: &BTreeMap<String, Annotation>,
        filter: &CorpusFilter,
    ) -> Result<std::result::Result<Piece, SkipReason>> {
        let path = &row.midi_performance;

        if let Some(fragment) = filter.excluded.iter().find(|f| path.contains(f.as_str())) {
            return Ok(Err(SkipReason::Excluded {
                fragment: fragment.clone(),
            }));
        }

        let Some(annotation) = annotations.get(path) else {
            return Ok(Err(SkipReason::MissingAnnotation));
        };

        let signature = match annotation.time_signature() {
            Ok(s) => s,
            Err(reason) => return Ok(Err(reason)),
        };
        match signature.parse::<TimeSignature>() {
            Ok(ts) if ts == filter.time_signature => {}
            _ => return Ok(Err(SkipReason::TimeSignatureMismatch { found: signature })),
        }

        let Some(tempo) = filter.time_signature.tempo(&annotation.midi_score_downbeats) else {
            return Ok(Err(SkipReason::TooFewDownbeats));
        };

        let score_beats = annotation.midi_score_beats.clone();
        if annotation.performance_beats.len() != score_beats.len() {
            return Ok(Err(SkipReason::LengthMismatch {
                score: score_beats.len(),
                performance: annotation.performance_beats.len(),
            }));
        }

        let score_events = self.events.events(&row.midi_score)?;
        let performance_events = self.events.events(&row.midi_performance)?;

        let piece = Piece {
            id: path.clone(),
            tempo,
            score_velocities: velocities_at_beats(&score_beats, &score_events),
            performance_velocities: velocities_at_beats(&score_beats, &performance_events),
            score_downbeats: annotation.midi_score_downbeats.clone(),
            performance_beats: annotation.performance_beats.clone(),
            performance_downbeats: annotation
                .performance_downbeats
                .clone()
                .unwrap_or_else(|| annotation.performance_beats.clone()),
            score_beats,
        };

        Ok(piece.validate().map(|()| piece))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_time_signature() {
        assert_eq!("3/4".parse::<TimeSignature>().unwrap(), TimeSignature::new(3, 4));
        assert_eq!(" 6 / 8 ".parse::<TimeSignature>().unwrap(), TimeSignature::new(6, 8));
        assert!("4".parse::<TimeSignature>().is_err());
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("a/b".parse::<TimeSignature>().is_err());
        assert_eq!(TimeSignature::new(12, 8).to_string(), "12/8");
    }

    #[test]
    fn tempo_from_downbeats() {
        let ts = TimeSignature::new(4, 4);
        assert_eq!(ts.tempo(&[0.0, 2.0, 4.0]), Some(120.0));
        assert_eq!(TimeSignature::new(3, 4).tempo(&[1.0, 4.0]), Some(60.0));
        assert_eq!(ts.tempo(&[0.0]), None);
        assert_eq!(ts.tempo(&[2.0, 2.0]), None);
    }

    #[test]
    fn styles_round_trip_through_names() {
        for style in Style::ALL {
            assert_eq!(style.to_string().parse::<Style>(), Ok(style));
        }
        assert!(Style::Romantic.composers().contains(&"Chopin"));
    }

    #[test]
    fn cache_key_is_order_independent() {
        let a = CorpusFilter::new(vec!["Mozart".into(), "Haydn".into()], TimeSignature::new(3, 4));
        let b = CorpusFilter::new(vec!["Haydn".into(), "Mozart".into()], TimeSignature::new(3, 4));
        assert_eq!(a.cache_key(), "Haydn+Mozart_3-4");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(
            CorpusFilter::new(vec![], TimeSignature::default()).cache_key(),
            "all_4-4"
        );
    }

    #[test]
    fn cache_key_tracks_exclusions() {
        let default = CorpusFilter::new(vec!["Bach".into()], TimeSignature::default());
        let mut keep_all = default.clone();
        keep_all.excluded.clear();
        let extra = default.clone().excluding("bwv_846");
        let reordered = CorpusFilter {
            excluded: vec!["bwv_846".into(), "Bach/Prelude/bwv_885/".into()],
            ..default.clone()
        };

        assert_eq!(default.cache_key(), "Bach_4-4");
        assert_ne!(keep_all.cache_key(), default.cache_key());
        assert_ne!(extra.cache_key(), default.cache_key());
        assert_ne!(extra.cache_key(), keep_all.cache_key());
        assert!(extra.cache_key().starts_with("Bach_4-4_x"));
        assert_eq!(reordered.cache_key(), extra.cache_key());
    }

    #[test]
    fn default_filter_excludes_known_corrupt() {
        let filter = CorpusFilter::new(vec!["Bach".into()], TimeSignature::default());
        assert_eq!(filter.excluded, vec!["Bach/Prelude/bwv_885/".to_string()]);
        assert!(filter.accepts_composer("Bach"));
        assert!(!filter.accepts_composer("Chopin"));
    }

    #[test]
    fn annotation_signature_forms() {
        let json = r#"{
            "midi_score_time_signatures": {"0.0": ["4/4", 4]},
            "midi_score_beats": [0.0, 0.5],
            "midi_score_downbeats": [0.0],
            "performance_beats": [0.0, 0.6]
        }"#;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.time_signature(), Ok("4/4".to_string()));
        assert_eq!(annotation.performance_downbeats, None);

        let json = r#"{
            "midi_score_time_signatures": {"0.0": "3/4", "12.0": "4/4"},
            "midi_score_beats": [],
            "midi_score_downbeats": [],
            "performance_beats": []
        }"#;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(
            annotation.time_signature(),
            Err(SkipReason::MultipleTimeSignatures { count: 2 })
        );
    }

    #[test]
    fn validate_catches_misaligned_sequences() {
        let mut piece = Piece {
            id: "p".into(),
            tempo: 120.0,
            score_beats: vec![0.0, 0.5],
            score_downbeats: vec![0.0, 2.0],
            performance_beats: vec![0.0, 0.5],
            performance_downbeats: vec![0.0],
            score_velocities: vec![64.0, 64.0],
            performance_velocities: vec![70.0, 60.0],
        };
        assert_eq!(piece.validate(), Ok(()));

        piece.performance_velocities.pop();
        assert_eq!(
            piece.validate(),
            Err(SkipReason::LengthMismatch {
                score: 2,
                performance: 1
            })
        );

        piece.score_downbeats.truncate(1);
        assert_eq!(piece.validate(), Err(SkipReason::TooFewDownbeats));
    }

    #[test]
    fn select_keeps_requested_order() {
        let piece = |id: &str| Piece {
            id: id.into(),
            tempo: 60.0,
            score_beats: vec![],
            score_downbeats: vec![],
            performance_beats: vec![],
            performance_downbeats: vec![],
            score_velocities: vec![],
            performance_velocities: vec![],
        };
        let corpus = Corpus::new(vec![piece("a"), piece("b"), piece("c")]);
        let ids: Vec<_> = corpus.select(&[2, 0]).iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn missing_root_is_fatal() {
        let loader = CorpusLoader::new(
            "/nonexistent/agogic/corpus",
            crate::events::CsvEventTables::new("/nonexistent"),
        );
        let filter = CorpusFilter::new(vec![], TimeSignature::default());
        assert!(matches!(loader.load(&filter), Err(Error::CorpusRootMissing(_))));
    }
}

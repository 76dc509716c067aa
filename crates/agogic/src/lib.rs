//! Corpus-driven expressive performance transfer.
//!
//! Learns, per beat position within the measure, how human performers
//! deviate from a mechanical grid in timing (tempo) and dynamics
//! (velocity), then synthesizes plausible deviations for an unseen score.
//!
//! The pipeline:
//!
//! ```text
//! corpus (annotations + event tables) → split → fit → estimate
//!     → average over held-out pieces → TransferFunction → performed values
//! ```
//!
//! Score-format parsing and MIDI rendering live outside this crate: the
//! core consumes flat event tables ([`ScoreEvent`]) and beat annotations,
//! and emits performed values keyed by score onset.

pub mod aggregate;
pub mod beat_index;
pub mod cache;
pub mod corpus;
pub mod estimator;
pub mod evaluate;
pub mod events;
pub mod ioi;
pub mod onsets;
pub mod split;
pub mod transfer;
pub mod units;

#[cfg(test)]
mod testing;

pub use aggregate::{average_over_subcorpus, align_and_average, SubcorpusAverage};
pub use beat_index::{beat_indices, beats_per_measure};
pub use cache::BeatListCache;
pub use corpus::{
    Corpus, CorpusFilter, CorpusLoader, LoadReport, Piece, SkipReason, SkippedPiece, Style,
    TimeSignature,
};
pub use estimator::{
    BeatStatistics, Estimator, EstimatorKind, FittedModel, LinearEnsemble, LinearEstimator,
    RandomEstimator,
};
pub use evaluate::{compare, Evaluation};
pub use events::{CsvEventTables, EventKind, EventTableSource, ScoreEvent, Tie};
pub use ioi::{expressiveness, mean_expressiveness, IntervalStatistics};
pub use onsets::{average_onset_distribution, OnsetDistribution};
pub use split::{train_test_split, Split};
pub use transfer::{
    build_transfer, build_transfer_functions, HalfBeat, PerformedValue, Transfer, TransferFunction,
    TransferFunctions, TransferSettings,
};
pub use units::{positions_to_bpm, LastBeat, PerformanceType};

use std::path::PathBuf;

/// Errors from corpus loading and model construction.
///
/// Per-piece data problems are not errors; they surface as
/// [`SkippedPiece`] entries in a [`LoadReport`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing JSON {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("parsing CSV {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("corpus root does not exist: {0}")]
    CorpusRootMissing(PathBuf),

    #[error("invalid time signature: {0:?}")]
    InvalidTimeSignature(String),

    #[error("test fraction must be within [0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("cannot fit an estimator on an empty training set")]
    EmptyTrainingSet,

    #[error("cannot average over an empty subcorpus")]
    EmptySubcorpus,

    #[error("malformed piece {piece}: {reason}")]
    MalformedPiece { piece: String, reason: String },

    #[error("beat list cache is inconsistent: {0}")]
    CacheMismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

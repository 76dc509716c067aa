//! Estimators of performed timing and velocity.
//!
//! An [`Estimator`] is fitted once on a training subcorpus and yields an
//! immutable [`FittedModel`], which produces one sequence of estimated
//! performed values per test piece. Time estimates are in BPM and have
//! one entry per beat duration; velocity estimates have one entry per beat.

mod linear;
mod random;

pub use linear::{LinearEnsemble, LinearEstimator, LinearFit};
pub use random::{BeatMoments, BeatStatistics, RandomEstimator};

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::units::PerformanceType;
use crate::Result;

/// A strategy for learning performed values from a training subcorpus.
pub trait Estimator: Send + Sync {
    fn performance(&self) -> PerformanceType;

    fn fit(&self, training: &Corpus) -> Result<Box<dyn FittedModel>>;
}

/// A model fitted by an [`Estimator`].
pub trait FittedModel: fmt::Debug + Send + Sync {
    fn performance(&self) -> PerformanceType;

    /// One sequence of estimated values per piece of `test`, in order.
    ///
    /// Missing estimates are NaN. Stochastic models draw from `rng`.
    fn estimate(&self, test: &Corpus, rng: &mut dyn RngCore) -> Vec<Vec<f64>>;

    /// Fitted parameters, for reporting.
    fn parameters(&self) -> serde_json::Value;
}

/// The available estimator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Per-beat-index Gaussian noise around the piece tempo
    #[default]
    Random,
    /// Mean of per-piece linear regressions of performed on score beats
    Linear,
}

impl EstimatorKind {
    pub fn build(self, performance: PerformanceType) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Random => Box::new(RandomEstimator::new(performance)),
            EstimatorKind::Linear => Box::new(LinearEstimator::new(performance)),
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorKind::Random => write!(f, "random"),
            EstimatorKind::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "gaussian" => Ok(EstimatorKind::Random),
            "linear" => Ok(EstimatorKind::Linear),
            other => Err(format!("unknown estimator: {other}")),
        }
    }
}

/// Raw performed sequence of a piece for the given quantity.
pub(crate) fn performed_values(piece: &crate::corpus::Piece, performance: PerformanceType) -> &[f64] {
    match performance {
        PerformanceType::Time => &piece.performance_beats,
        PerformanceType::Velocity => &piece.performance_velocities,
    }
}

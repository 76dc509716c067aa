use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{performed_values, Estimator, FittedModel};
use crate::beat_index::{beat_indices, beats_per_measure};
use crate::corpus::{Corpus, Piece};
use crate::units::PerformanceType;
use crate::{Error, Result};

/// Gaussian noise estimator keyed by beat index.
///
/// Fitting pools, per beat index, the deviation of performed values from
/// the piece bias (its tempo for time, zero for velocity). Estimation
/// draws from `N(mean, sqrt(variance))` per beat and adds the test piece's
/// bias back.
#[derive(Debug, Clone)]
pub struct RandomEstimator {
    performance: PerformanceType,
}

impl RandomEstimator {
    pub fn new(performance: PerformanceType) -> Self {
        Self { performance }
    }

    /// Fit and return the concrete model.
    pub fn fit_statistics(&self, training: &Corpus) -> Result<BeatStatistics> {
        if training.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }

        let observations: Vec<PieceObservations> = training
            .iter()
            .filter_map(|piece| {
                let observed = PieceObservations::collect(piece, self.performance);
                if observed.is_none() {
                    warn!(piece = %piece.id, "no beat indices for piece, leaving it out of the fit");
                }
                observed
            })
            .collect();
        if observations.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }

        let width = observations.iter().map(|o| o.beats_per_measure).max().unwrap_or(0);
        if observations.iter().any(|o| o.beats_per_measure != width) {
            warn!(width, "training pieces disagree on beats per measure");
        }

        // Each piece contributes its own per-index mean and variance with
        // equal weight, regardless of how many beats it has. A piece with a
        // single observation at an index has no variance there and counts
        // toward the mean only.
        let sums = observations.iter().fold(
            vec![(0.0_f64, 0.0_f64, 0usize); width],
            |mut sums, observed| {
                for (index, (mean_sum, var_sum, var_count)) in sums.iter_mut().enumerate() {
                    let (mean, variance) = observed.moments_at(index);
                    *mean_sum += mean;
                    if let Some(variance) = variance {
                        *var_sum += variance;
                        *var_count += 1;
                    }
                }
                sums
            },
        );

        let count = observations.len() as f64;
        let moments: Vec<BeatMoments> = sums
            .into_iter()
            .map(|(mean_sum, var_sum, var_count)| BeatMoments {
                mean: mean_sum / count,
                variance: var_sum / var_count as f64,
            })
            .collect();

        let missing = moments.iter().filter(|m| m.mean.is_nan()).count();
        if missing > 0 {
            warn!(
                missing,
                width, "beat indices without observations in some training piece; their estimates are NaN"
            );
        }
        debug!(
            performance = %self.performance,
            pieces = observations.len(),
            width,
            "fitted random estimator"
        );

        Ok(BeatStatistics {
            performance: self.performance,
            moments,
        })
    }
}

impl Estimator for RandomEstimator {
    fn performance(&self) -> PerformanceType {
        self.performance
    }

    fn fit(&self, training: &Corpus) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(self.fit_statistics(training)?))
    }
}

/// Residuals of one training piece, tagged by beat index.
struct PieceObservations {
    beats_per_measure: usize,
    indices: Vec<usize>,
    residuals: Vec<f64>,
}

impl PieceObservations {
    fn collect(piece: &Piece, performance: PerformanceType) -> Option<Self> {
        let beats_per_measure = beats_per_measure(&piece.score_downbeats, piece.tempo)?;
        let indices = beat_indices(
            &piece.score_beats,
            &piece.score_downbeats,
            piece.tempo,
            performance.last_beat(),
        )?;
        let bias = performance.bias(piece.tempo);
        let residuals = performance
            .ingest(performed_values(piece, performance))
            .into_iter()
            .map(|v| v - bias)
            .collect();

        Some(Self {
            beats_per_measure,
            indices,
            residuals,
        })
    }

    /// Mean and unbiased variance of the residuals at one beat index.
    ///
    /// With no observations both are NaN. With exactly one the variance is
    /// `None`: the piece has no spread to report there.
    fn moments_at(&self, index: usize) -> (f64, Option<f64>) {
        let values: Vec<f64> = self
            .indices
            .iter()
            .zip(&self.residuals)
            .filter(|(i, _)| **i == index)
            .map(|(_, v)| *v)
            .collect();

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = match values.len() {
            0 => Some(f64::NAN),
            1 => None,
            _ => Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)),
        };
        (mean, variance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMoments {
    pub mean: f64,
    pub variance: f64,
}

/// Per-beat-index mean and variance of performed deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatStatistics {
    pub performance: PerformanceType,
    /// Indexed by beat index
    pub moments: Vec<BeatMoments>,
}

impl BeatStatistics {
    pub fn beats_per_measure(&self) -> usize {
        self.moments.len()
    }

    /// Draw one performed value for a beat of a piece with the given bias.
    ///
    /// Finite draws are floored at zero; NaN (no estimate) stays NaN.
    pub fn sample(&self, index: usize, bias: f64, rng: &mut dyn RngCore) -> f64 {
        let Some(moments) = self.moments.get(index) else {
            return f64::NAN;
        };
        let z: f64 = rng.sample(StandardNormal);
        let value = moments.variance.sqrt() * z + moments.mean + bias;
        if value.is_nan() {
            value
        } else {
            value.max(0.0)
        }
    }

    fn estimate_piece(&self, piece: &Piece, rng: &mut dyn RngCore) -> Vec<f64> {
        let Some(indices) = beat_indices(
            &piece.score_beats,
            &piece.score_downbeats,
            piece.tempo,
            self.performance.last_beat(),
        ) else {
            warn!(piece = %piece.id, "no beat indices for piece, nothing to estimate");
            return Vec::new();
        };

        let bias = self.performance.bias(piece.tempo);
        indices
            .into_iter()
            .map(|index| self.sample(index, bias, rng))
            .collect()
    }
}

impl FittedModel for BeatStatistics {
    fn performance(&self) -> PerformanceType {
        self.performance
    }

    fn estimate(&self, test: &Corpus, rng: &mut dyn RngCore) -> Vec<Vec<f64>> {
        test.iter().map(|piece| self.estimate_piece(piece, rng)).collect()
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "estimator": "random",
            "performance": self.performance,
            "beats_per_measure": self.beats_per_measure(),
            "moments": self.moments,
        })
    }
}

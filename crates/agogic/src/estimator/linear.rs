use linreg::linear_regression;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{performed_values, Estimator, FittedModel};
use crate::corpus::{Corpus, Piece};
use crate::units::PerformanceType;
use crate::{Error, Result};

/// Ordinary least squares of performed value on score beat, one fit per
/// training piece. Estimates use the mean of all fits.
#[derive(Debug, Clone)]
pub struct LinearEstimator {
    performance: PerformanceType,
}

impl LinearEstimator {
    pub fn new(performance: PerformanceType) -> Self {
        Self { performance }
    }

    pub fn fit_ensemble(&self, training: &Corpus) -> Result<LinearEnsemble> {
        let fits: Vec<LinearFit> = training
            .iter()
            .filter_map(|piece| {
                let fit = LinearFit::of_piece(piece, self.performance);
                if fit.is_none() {
                    warn!(piece = %piece.id, "degenerate regression, leaving piece out of the fit");
                }
                fit
            })
            .collect();

        if fits.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        debug!(performance = %self.performance, fits = fits.len(), "fitted linear estimator");

        Ok(LinearEnsemble {
            performance: self.performance,
            fits,
        })
    }
}

impl Estimator for LinearEstimator {
    fn performance(&self) -> PerformanceType {
        self.performance
    }

    fn fit(&self, training: &Corpus) -> Result<Box<dyn FittedModel>> {
        Ok(Box::new(self.fit_ensemble(training)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// `None` when the piece has too few beats or constant score beats.
    fn of_piece(piece: &Piece, performance: PerformanceType) -> Option<Self> {
        let xs = &piece.score_beats;
        let ys = performed_values(piece, performance);
        if xs.len() < 2 || xs.len() != ys.len() {
            return None;
        }
        let (slope, intercept) = linear_regression::<f64, f64, f64>(xs, ys).ok()?;
        (slope.is_finite() && intercept.is_finite()).then_some(Self { slope, intercept })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// The per-piece regressions of a training subcorpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEnsemble {
    pub performance: PerformanceType,
    pub fits: Vec<LinearFit>,
}

impl LinearEnsemble {
    /// Mean prediction of all fits at `x`, in raw units.
    pub fn predict(&self, x: f64) -> f64 {
        self.fits.iter().map(|fit| fit.predict(x)).sum::<f64>() / self.fits.len() as f64
    }
}

impl FittedModel for LinearEnsemble {
    fn performance(&self) -> PerformanceType {
        self.performance
    }

    fn estimate(&self, test: &Corpus, _rng: &mut dyn RngCore) -> Vec<Vec<f64>> {
        test.iter()
            .map(|piece| {
                let raw: Vec<f64> = piece.score_beats.iter().map(|&x| self.predict(x)).collect();
                self.performance.ingest(&raw)
            })
            .collect()
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "estimator": "linear",
            "performance": self.performance,
            "fits": self.fits,
        })
    }
}

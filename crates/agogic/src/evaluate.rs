use serde::{Deserialize, Serialize};

use crate::aggregate::SubcorpusAverage;

/// Error of averaged estimates against the averaged human performance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub mean_absolute_error: f64,
    pub root_mean_squared_error: f64,
    /// Grid points where both series are finite
    pub compared: usize,
}

/// Compare two series point by point, skipping points where either is
/// not finite. Both errors are NaN when nothing is comparable.
pub fn compare(estimated: &[f64], performed: &[f64]) -> Evaluation {
    let (abs_sum, sq_sum, compared) = estimated
        .iter()
        .zip(performed)
        .filter(|(e, p)| e.is_finite() && p.is_finite())
        .fold((0.0, 0.0, 0usize), |(abs_sum, sq_sum, n), (e, p)| {
            let diff = e - p;
            (abs_sum + diff.abs(), sq_sum + diff * diff, n + 1)
        });

    let n = compared as f64;
    Evaluation {
        mean_absolute_error: abs_sum / n,
        root_mean_squared_error: (sq_sum / n).sqrt(),
        compared,
    }
}

impl SubcorpusAverage {
    pub fn evaluate(&self) -> Evaluation {
        compare(&self.estimated, &self.performed)
    }

    /// The same error measures for the score taken as its own performance.
    pub fn evaluate_unperformed(&self) -> Evaluation {
        compare(&self.unperformed, &self.performed)
    }
}

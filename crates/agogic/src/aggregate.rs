//! Averaging per-piece beat sequences on a shared half-beat grid.
//!
//! Grid point `k` stands for score time `0.5 * k`. Each piece's values are
//! placed starting at the grid point of its first score beat. Non-finite
//! values are left out, so a grid point with no finite contribution
//! averages to `0 / 0 = NaN`.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::Corpus;
use crate::estimator::performed_values;
use crate::units::PerformanceType;
use crate::{Error, Result};

/// Score time between adjacent grid points.
pub const GRID_STEP: f64 = 0.5;

/// Grid point at or before a score time. Negative times clamp to zero.
pub fn grid_slot(onset: f64) -> usize {
    let slot = (onset / GRID_STEP).trunc();
    if slot.is_finite() && slot > 0.0 {
        slot as usize
    } else {
        0
    }
}

/// Running per-grid-point sums and counts.
#[derive(Debug, Clone, Default)]
struct GridAccumulator {
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl GridAccumulator {
    fn with_len(len: usize) -> Self {
        Self {
            sums: vec![0.0; len],
            counts: vec![0; len],
        }
    }

    fn place(mut self, start: usize, values: &[f64]) -> Self {
        let end = start + values.len();
        if end > self.sums.len() {
            self.sums.resize(end, 0.0);
            self.counts.resize(end, 0);
        }
        // NaN means "no estimate" and must not poison the other pieces.
        for (offset, value) in values.iter().enumerate().filter(|(_, v)| v.is_finite()) {
            self.sums[start + offset] += value;
            self.counts[start + offset] += 1;
        }
        self
    }

    fn mean(self, len: usize) -> Vec<f64> {
        let mut means: Vec<f64> = self
            .sums
            .iter()
            .zip(&self.counts)
            .map(|(sum, count)| sum / *count as f64)
            .collect();
        means.resize(len.max(means.len()), f64::NAN);
        means
    }
}

/// Length of the grid covering every piece's last score beat.
fn grid_len<'a>(score_beats: impl IntoIterator<Item = &'a [f64]>) -> usize {
    score_beats
        .into_iter()
        .filter_map(|beats| beats.last())
        .map(|&last| grid_slot(last) + 1)
        .max()
        .unwrap_or(0)
}

/// Place each value sequence at the grid point of its piece's first score
/// beat and average per grid point.
///
/// `values[i]` belongs to `score_beats[i]`. The result covers at least the
/// last score beat of every piece, and further if some sequence runs past
/// it.
pub fn align_and_average(score_beats: &[&[f64]], values: &[Vec<f64>]) -> Vec<f64> {
    if score_beats.len() != values.len() {
        warn!(
            pieces = score_beats.len(),
            sequences = values.len(),
            "score beats and value sequences differ in count; extra entries ignored"
        );
    }
    let len = grid_len(score_beats.iter().copied());

    score_beats
        .iter()
        .zip(values)
        .fold(GridAccumulator::with_len(len), |acc, (beats, values)| {
            let start = beats.first().map_or(0, |&first| grid_slot(first));
            acc.place(start, values)
        })
        .mean(len)
}

/// Grid-aligned averages of one test subcorpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcorpusAverage {
    pub performance: PerformanceType,
    /// Score time of each grid point
    pub grid: Vec<f64>,
    /// Averaged score values (BPM for time)
    pub unperformed: Vec<f64>,
    /// Averaged human performance
    pub performed: Vec<f64>,
    /// Averaged model estimates
    pub estimated: Vec<f64>,
}

impl SubcorpusAverage {
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }
}

/// Average the score, the performance and the estimates of a test
/// subcorpus on one grid.
///
/// Raw sequences are converted to model units first; `estimated` is
/// expected in model units already, one sequence per piece of `test`.
pub fn average_over_subcorpus(
    test: &Corpus,
    estimated: &[Vec<f64>],
    performance: PerformanceType,
) -> Result<SubcorpusAverage> {
    if test.is_empty() {
        return Err(Error::EmptySubcorpus);
    }

    let score_beats = test.score_beats();
    let unperformed: Vec<Vec<f64>> = test
        .iter()
        .map(|piece| match performance {
            PerformanceType::Time => performance.ingest(&piece.score_beats),
            PerformanceType::Velocity => performance.ingest(&piece.score_velocities),
        })
        .collect();
    let performed: Vec<Vec<f64>> = test
        .iter()
        .map(|piece| performance.ingest(performed_values(piece, performance)))
        .collect();

    let mut unperformed = align_and_average(&score_beats, &unperformed);
    let mut performed = align_and_average(&score_beats, &performed);
    let mut estimated = align_and_average(&score_beats, estimated);

    let len = unperformed.len().max(performed.len()).max(estimated.len());
    for series in [&mut unperformed, &mut performed, &mut estimated] {
        series.resize(len, f64::NAN);
    }
    let grid = (0..len).map(|k| k as f64 * GRID_STEP).collect();

    debug!(
        %performance,
        pieces = test.len(),
        grid_points = len,
        "averaged subcorpus"
    );

    Ok(SubcorpusAverage {
        performance,
        grid,
        unperformed,
        performed,
        estimated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::piece;
    use pretty_assertions::assert_eq;

    #[test]
    fn overlapping_pieces_average_per_grid_point() {
        let a = [0.0, 0.5, 1.0];
        let b = [0.5, 1.0];
        let means = align_and_average(&[&a[..], &b[..]], &[vec![10.0, 20.0, 30.0], vec![5.0, 15.0]]);
        assert_eq!(means, vec![10.0, 12.5, 22.5]);
    }

    #[test]
    fn missing_estimates_do_not_mask_other_pieces() {
        let beats = [0.0, 0.5];
        let means = align_and_average(
            &[&beats[..], &beats[..]],
            &[vec![f64::NAN, 1.0], vec![5.0, 3.0]],
        );
        assert_eq!(means, vec![5.0, 2.0]);

        let all_missing = align_and_average(&[&beats[..]], &[vec![f64::NAN, 4.0]]);
        assert!(all_missing[0].is_nan());
        assert_eq!(all_missing[1], 4.0);
    }

    #[test]
    fn unreached_grid_points_are_nan() {
        let a = [0.0, 0.5];
        let b = [2.0, 2.5];
        let means = align_and_average(&[&a[..], &b[..]], &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(means.len(), 6);
        assert_eq!(&means[..2], &[1.0, 2.0]);
        assert!(means[2].is_nan() && means[3].is_nan());
        assert_eq!(&means[4..], &[3.0, 4.0]);
    }

    #[test]
    fn grid_grows_to_fit_long_sequences() {
        let beats = [0.0, 0.5];
        let means = align_and_average(&[&beats[..]], &[vec![1.0, 2.0, 3.0]]);
        assert_eq!(means, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn slots_truncate_like_integer_division() {
        assert_eq!(grid_slot(0.0), 0);
        assert_eq!(grid_slot(0.74), 1);
        assert_eq!(grid_slot(1.0), 2);
        assert_eq!(grid_slot(-0.5), 0);
    }

    #[test]
    fn time_average_is_in_bpm_and_one_shorter() {
        let test = Corpus::new(vec![piece("a", 1, [0.5, 0.25, 1.0, 0.75], [60.0; 4])]);
        let estimates = vec![vec![100.0, 100.0, 100.0, 100.0]];
        let avg = average_over_subcorpus(&test, &estimates, PerformanceType::Time).unwrap();

        assert_eq!(avg.grid, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(&avg.unperformed[..4], &[120.0; 4]);
        assert_eq!(&avg.performed[..4], &[120.0, 240.0, 60.0, 80.0]);
        assert_eq!(&avg.estimated[..4], &[100.0; 4]);
        assert!(avg.performed[4].is_nan());
    }

    #[test]
    fn velocity_average_keeps_every_beat() {
        let test = Corpus::new(vec![
            piece("a", 1, [0.5; 4], [80.0, 40.0, 60.0, 40.0]),
            piece("b", 1, [0.5; 4], [60.0, 40.0, 60.0, 40.0]),
        ]);
        let estimates = vec![vec![1.0; 5], vec![3.0; 5]];
        let avg = average_over_subcorpus(&test, &estimates, PerformanceType::Velocity).unwrap();

        assert_eq!(avg.performed, vec![70.0, 40.0, 60.0, 40.0, 70.0]);
        assert_eq!(avg.unperformed, vec![64.0; 5]);
        assert_eq!(avg.estimated, vec![2.0; 5]);
    }

    #[test]
    fn empty_subcorpus_is_an_error() {
        assert!(matches!(
            average_over_subcorpus(&Corpus::default(), &[], PerformanceType::Velocity),
            Err(Error::EmptySubcorpus)
        ));
    }
}

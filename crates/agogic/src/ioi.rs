//! Inter-onset interval statistics of performed beats.
//!
//! A performance's expressiveness is summarized as the mean, over beat
//! positions in the measure, of the standard deviation of the time between
//! consecutive performed beats.

use serde::{Deserialize, Serialize};

use crate::corpus::Piece;

/// `[0, b1 - b0, b2 - b1, ...]`, same length as `beats`.
pub fn inter_onset_intervals(beats: &[f64]) -> Vec<f64> {
    if beats.is_empty() {
        return Vec::new();
    }
    std::iter::once(0.0)
        .chain(beats.windows(2).map(|w| w[1] - w[0]))
        .collect()
}

/// Intervals of a piece's performed beats, starting at its first
/// performed downbeat so that position 0 is a downbeat.
pub fn piece_intervals(piece: &Piece) -> Vec<f64> {
    let start = piece
        .performance_downbeats
        .first()
        .map_or(0, |&first| {
            piece
                .performance_beats
                .iter()
                .position(|&beat| beat >= first)
                .unwrap_or(0)
        });
    inter_onset_intervals(&piece.performance_beats)
        .into_iter()
        .skip(start)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalStatistics {
    pub mean: f64,
    /// Sample standard deviation; NaN with fewer than two intervals
    pub std: f64,
}

/// Mean and standard deviation of the intervals at each of `beats`
/// positions, grouping interval `i` under position `i % beats`.
pub fn interval_statistics(intervals: &[f64], beats: usize) -> Vec<IntervalStatistics> {
    (0..beats)
        .map(|position| {
            let values: Vec<f64> = intervals
                .iter()
                .skip(position)
                .step_by(beats.max(1))
                .copied()
                .collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = if values.len() < 2 {
                f64::NAN
            } else {
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
            };
            IntervalStatistics { mean, std }
        })
        .collect()
}

/// Mean of the per-position standard deviations, ignoring NaN.
pub fn expressiveness(intervals: &[f64], beats: usize) -> f64 {
    nan_mean(interval_statistics(intervals, beats).iter().map(|s| s.std))
}

/// Mean expressiveness of a set of pieces, each weighted equally.
pub fn mean_expressiveness<'a>(pieces: impl IntoIterator<Item = &'a Piece>, beats: usize) -> f64 {
    nan_mean(
        pieces
            .into_iter()
            .map(|piece| expressiveness(&piece_intervals(piece), beats)),
    )
}

/// Percentage deviation of every interval from the piece's median
/// interval, pooled per beat position over `pieces`.
pub fn beat_deviations<'a>(pieces: impl IntoIterator<Item = &'a Piece>, beats: usize) -> Vec<Vec<f64>> {
    if beats == 0 {
        return Vec::new();
    }
    let mut per_position = vec![Vec::new(); beats];
    for piece in pieces {
        let intervals = piece_intervals(piece);
        let Some(median) = median(&intervals) else {
            continue;
        };
        for (i, interval) in intervals.iter().enumerate() {
            per_position[i % beats].push((interval - median) / median * 100.0);
        }
    }
    per_position
}

fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn nan_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    sum / count as f64
}

//! Synthetic corpora for unit tests.

use crate::corpus::{Corpus, Piece};

/// A 4/4 piece at 120 BPM whose score beats sit every half second.
///
/// Performed beat durations cycle through `durations` (seconds) and
/// performed velocities through `velocities`, both keyed by beat index.
pub fn piece(id: &str, measures: usize, durations: [f64; 4], velocities: [f64; 4]) -> Piece {
    let beats = measures * 4 + 1;
    let score_beats: Vec<f64> = (0..beats).map(|i| i as f64 * 0.5).collect();
    let score_downbeats: Vec<f64> = (0..=measures).map(|m| m as f64 * 2.0).collect();

    let mut performance_beats = Vec::with_capacity(beats);
    let mut t = 0.0;
    for i in 0..beats {
        performance_beats.push(t);
        t += durations[i % 4];
    }

    Piece {
        id: id.to_string(),
        tempo: 120.0,
        score_velocities: vec![64.0; beats],
        performance_velocities: (0..beats).map(|i| velocities[i % 4]).collect(),
        performance_downbeats: score_downbeats.clone(),
        score_beats,
        score_downbeats,
        performance_beats,
    }
}

/// Several identical-pattern pieces of varying length.
pub fn uniform_corpus(durations: [f64; 4], velocities: [f64; 4]) -> Corpus {
    Corpus::new(vec![
        piece("a", 2, durations, velocities),
        piece("b", 3, durations, velocities),
        piece("c", 5, durations, velocities),
    ])
}

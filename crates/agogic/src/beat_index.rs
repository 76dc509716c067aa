//! Position-within-measure indexing of score beats.
//!
//! Every grouped statistic in the crate is keyed by the beat index: 0 for
//! the downbeat, 1 for the beat after it, and so on up to
//! `beats_per_measure - 1`. Indices are derived from onset offsets scaled
//! by tempo, so they are stable under uniform tempo scaling.

use crate::units::LastBeat;

/// Number of beats between the first two downbeats at the given tempo.
///
/// Returns `None` with fewer than two downbeats or when the measure
/// rounds to zero beats.
pub fn beats_per_measure(downbeats: &[f64], tempo: f64) -> Option<usize> {
    let [first, second, ..] = downbeats else {
        return None;
    };
    let beats_per_second = tempo / 60.0;
    let beats = (beats_per_second * (second - first)).round_ties_even();
    if beats.is_finite() && beats >= 1.0 {
        Some(beats as usize)
    } else {
        None
    }
}

/// Beat index for every score beat of one piece.
///
/// `index = round((beat - downbeats[0]) * tempo / 60) mod beats_per_measure`,
/// with Euclidean modulo so pickup beats before the first downbeat wrap to
/// the end of the measure. With [`LastBeat::Drop`] the final beat has no
/// index, matching duration sequences that are one shorter than the beats.
pub fn beat_indices(
    beats: &[f64],
    downbeats: &[f64],
    tempo: f64,
    last_beat: LastBeat,
) -> Option<Vec<usize>> {
    let per_measure = beats_per_measure(downbeats, tempo)? as i64;
    let origin = downbeats[0];
    let beats_per_second = tempo / 60.0;

    let mut indices: Vec<usize> = beats
        .iter()
        .map(|beat| {
            let position = ((beat - origin) * beats_per_second).round_ties_even() as i64;
            position.rem_euclid(per_measure) as usize
        })
        .collect();

    if last_beat == LastBeat::Drop {
        indices.pop();
    }
    Some(indices)
}

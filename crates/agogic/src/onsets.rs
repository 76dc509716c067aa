//! Where in the measure notes start.
//!
//! The measure is divided into `numerator * subdivision` equally spaced
//! locations (in quarter notes). Each score contributes the share of its
//! note onsets falling on each location; shares are averaged over scores.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::corpus::TimeSignature;
use crate::events::ScoreEvent;

const LOCATION_TOLERANCE: f64 = 1e-9;

/// Locations `i * 4 / (subdivision * denominator)` quarter notes into the
/// measure, for `i` in `0..numerator * subdivision`.
pub fn beat_locations(time_signature: TimeSignature, subdivision: u32) -> Vec<f64> {
    let count = time_signature.numerator as u32 * subdivision;
    let step = 4.0 / (subdivision as f64 * time_signature.denominator as f64);
    (0..count).map(|i| i as f64 * step).collect()
}

fn location_of(onset: f64, locations: &[f64]) -> Option<usize> {
    locations
        .iter()
        .position(|&loc| (onset - loc).abs() < LOCATION_TOLERANCE)
}

/// Share of note onsets at each location, for one score.
///
/// Rests, tied continuations and onsets off the grid are ignored. `None`
/// when nothing lands on the grid.
pub fn onset_distribution(events: &[ScoreEvent], locations: &[f64]) -> Option<Vec<f64>> {
    let mut counts = vec![0usize; locations.len()];
    for event in events.iter().filter(|e| e.starts_note()) {
        if let Some(i) = location_of(event.onset_in_measure, locations) {
            counts[i] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    (total > 0).then(|| counts.iter().map(|&c| c as f64 / total as f64).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetDistribution {
    pub time_signature: TimeSignature,
    pub subdivision: u32,
    /// Quarter notes into the measure
    pub locations: Vec<f64>,
    /// Mean share of onsets per location
    pub frequencies: Vec<f64>,
    /// Scores that contributed
    pub scores: usize,
}

/// Average the onset distributions of several scores.
///
/// Scores with no on-grid onsets are left out of the average.
pub fn average_onset_distribution<'a>(
    scores: impl IntoIterator<Item = &'a [ScoreEvent]>,
    time_signature: TimeSignature,
    subdivision: u32,
) -> OnsetDistribution {
    let locations = beat_locations(time_signature, subdivision);
    let mut sums = vec![0.0; locations.len()];
    let mut contributing = 0usize;

    for (i, events) in scores.into_iter().enumerate() {
        match onset_distribution(events, &locations) {
            Some(shares) => {
                for (sum, share) in sums.iter_mut().zip(shares) {
                    *sum += share;
                }
                contributing += 1;
            }
            None => warn!(score = i, "no onsets on the beat grid, leaving score out"),
        }
    }

    OnsetDistribution {
        time_signature,
        subdivision,
        frequencies: sums.iter().map(|s| s / contributing as f64).collect(),
        locations,
        scores: contributing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, Tie};
    use pretty_assertions::assert_eq;

    fn note(onset_in_measure: f64) -> ScoreEvent {
        ScoreEvent {
            staff: "P1".into(),
            measure_number: 1,
            event_type: EventKind::Sounded,
            onset_in_measure,
            global_onset: onset_in_measure,
            duration: 0.5,
            velocity: Some(64.0),
            tie: Tie::None,
        }
    }

    #[test]
    fn locations_follow_subdivision() {
        assert_eq!(
            beat_locations(TimeSignature::new(3, 4), 2),
            vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]
        );
        assert_eq!(beat_locations(TimeSignature::new(6, 8), 1), vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(beat_locations(TimeSignature::new(4, 4), 4).len(), 16);
    }

    #[test]
    fn distribution_ignores_rests_ties_and_offgrid() {
        let locations = beat_locations(TimeSignature::new(2, 4), 1);
        let mut rest = note(0.0);
        rest.event_type = EventKind::Unsounded;
        let mut tied = note(1.0);
        tied.tie = Tie::Continue;

        let events = vec![note(0.0), note(0.0), note(1.0), note(0.33), rest, tied];
        let shares = onset_distribution(&events, &locations).unwrap();
        assert_eq!(shares, vec![2.0 / 3.0, 1.0 / 3.0]);
    }

    #[test]
    fn nothing_on_grid_gives_none() {
        let locations = beat_locations(TimeSignature::new(2, 4), 1);
        assert_eq!(onset_distribution(&[note(0.25)], &locations), None);
    }

    #[test]
    fn average_over_scores() {
        let a = vec![note(0.0), note(1.0)];
        let b = vec![note(0.0)];
        let empty: Vec<ScoreEvent> = Vec::new();

        let avg = average_onset_distribution(
            [a.as_slice(), b.as_slice(), empty.as_slice()],
            TimeSignature::new(2, 4),
            1,
        );
        assert_eq!(avg.scores, 2);
        assert_eq!(avg.frequencies, vec![0.75, 0.25]);
    }
}

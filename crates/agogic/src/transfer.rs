//! Transfer functions: averaged estimates keyed by half-beat onset, and
//! their application to a new score's event table.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{average_over_subcorpus, SubcorpusAverage};
use crate::corpus::Corpus;
use crate::estimator::EstimatorKind;
use crate::events::ScoreEvent;
use crate::split::{Split, DEFAULT_SPLIT_SEED};
use crate::units::PerformanceType;
use crate::Result;

/// A score onset rounded to the nearest half beat, counted in half beats.
///
/// Ties round to even: 1.25 falls on 1.0 and 1.75 on 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HalfBeat(pub i64);

impl HalfBeat {
    pub fn from_onset(onset: f64) -> Self {
        HalfBeat((onset * 2.0).round_ties_even() as i64)
    }

    pub fn onset(self) -> f64 {
        self.0 as f64 / 2.0
    }
}

/// A performed value for one score onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformedValue {
    pub onset: f64,
    pub beat: HalfBeat,
    pub value: f64,
    /// False when the value fell back to the original
    pub transferred: bool,
}

/// Averaged estimated values keyed by half-beat onset.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub performance: PerformanceType,
    values: BTreeMap<HalfBeat, f64>,
}

impl TransferFunction {
    pub fn new(performance: PerformanceType, values: BTreeMap<HalfBeat, f64>) -> Self {
        Self {
            performance,
            values,
        }
    }

    /// Key the averaged estimates by grid onset.
    ///
    /// For time the final grid point is dropped: it is a beat position
    /// with no following beat, so it carries no tempo.
    pub fn from_average(average: &SubcorpusAverage) -> Self {
        let mut points: Vec<(f64, f64)> = average
            .grid
            .iter()
            .copied()
            .zip(average.estimated.iter().copied())
            .collect();
        if average.performance == PerformanceType::Time {
            points.pop();
        }

        let values = points
            .into_iter()
            .map(|(onset, value)| (HalfBeat::from_onset(onset), value))
            .collect();
        Self::new(average.performance, values)
    }

    /// All entries, NaN included.
    pub fn entries(&self) -> impl Iterator<Item = (HalfBeat, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at the half beat nearest `onset`. NaN entries count as
    /// missing.
    pub fn lookup(&self, onset: f64) -> Option<f64> {
        self.values
            .get(&HalfBeat::from_onset(onset))
            .copied()
            .filter(|v| !v.is_nan())
    }

    fn perform(&self, onset: f64, original: f64) -> PerformedValue {
        let value = self.lookup(onset);
        PerformedValue {
            onset,
            beat: HalfBeat::from_onset(onset),
            value: value.unwrap_or(original),
            transferred: value.is_some(),
        }
    }

    /// Replace the velocity of every sounded event with the transferred
    /// value at its onset. Events without an entry keep their velocity.
    pub fn apply_velocity(&self, events: &[ScoreEvent]) -> Vec<ScoreEvent> {
        let mut changed = 0usize;
        let performed = events
            .iter()
            .map(|event| {
                let mut event = event.clone();
                if event.is_sounded() {
                    if let Some(velocity) = self.lookup(event.global_onset) {
                        event.velocity = Some(velocity);
                        changed += 1;
                    }
                }
                event
            })
            .collect();
        debug!(events = events.len(), changed, "applied velocity transfer");
        performed
    }

    /// One tempo per distinct half beat touched by a sounded event, in
    /// onset order. Half beats without an entry keep `nominal_bpm`.
    pub fn tempo_map(&self, events: &[ScoreEvent], nominal_bpm: f64) -> Vec<PerformedValue> {
        let mut by_beat: BTreeMap<HalfBeat, PerformedValue> = BTreeMap::new();
        for event in events.iter().filter(|e| e.is_sounded()) {
            let beat = HalfBeat::from_onset(event.global_onset);
            by_beat
                .entry(beat)
                .or_insert_with(|| self.perform(beat.onset(), nominal_bpm));
        }
        by_beat.into_values().collect()
    }

    /// Performed values for every sounded event, keeping `original(event)`
    /// where nothing transfers.
    pub fn perform_events(
        &self,
        events: &[ScoreEvent],
        original: impl Fn(&ScoreEvent) -> f64,
    ) -> Vec<PerformedValue> {
        events
            .iter()
            .filter(|e| e.is_sounded())
            .map(|e| self.perform(e.global_onset, original(e)))
            .collect()
    }
}

/// Knobs for [`build_transfer_functions`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    pub estimator: EstimatorKind,
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::default(),
            test_fraction: 0.2,
            split_seed: DEFAULT_SPLIT_SEED,
        }
    }
}

/// Transfer function and the averages behind it, for one quantity.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub function: TransferFunction,
    pub average: SubcorpusAverage,
    pub parameters: serde_json::Value,
}

/// Both transfer functions for a subcorpus.
#[derive(Debug, Clone)]
pub struct TransferFunctions {
    pub split: Split,
    pub time: Transfer,
    pub velocity: Transfer,
}

/// Fit on the training split, estimate the test split, average the
/// estimates and key them by onset, once for time and once for velocity.
pub fn build_transfer_functions(
    corpus: &Corpus,
    settings: &TransferSettings,
    rng: &mut dyn RngCore,
) -> Result<TransferFunctions> {
    let split = Split::new(corpus.len(), settings.test_fraction, settings.split_seed)?;
    let (train, test) = split.apply(corpus);
    info!(
        train = train.len(),
        test = test.len(),
        estimator = %settings.estimator,
        "building transfer functions"
    );

    let time = build_transfer(&train, &test, settings.estimator, PerformanceType::Time, rng)?;
    let velocity = build_transfer(&train, &test, settings.estimator, PerformanceType::Velocity, rng)?;

    Ok(TransferFunctions {
        split,
        time,
        velocity,
    })
}

/// Fit, estimate and average for one quantity on an explicit split.
pub fn build_transfer(
    train: &Corpus,
    test: &Corpus,
    estimator: EstimatorKind,
    performance: PerformanceType,
    rng: &mut dyn RngCore,
) -> Result<Transfer> {
    let model = estimator.build(performance).fit(train)?;
    let estimates = model.estimate(test, rng);
    let average = average_over_subcorpus(test, &estimates, performance)?;
    let function = TransferFunction::from_average(&average);
    debug!(%performance, entries = function.len(), "built transfer function");

    Ok(Transfer {
        function,
        average,
        parameters: model.parameters(),
    })
}

//! Flat score event tables.
//!
//! This is the only contract with the score-parsing layer: one row per
//! note or rest, with its measure-relative and global onset in quarter
//! notes. Tables are exchanged as CSV with the columns
//! `staff,measure_number,event_type,onset_in_measure,onset_in_score,duration,velocity,tie_info`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A note
    Sounded,
    /// A rest
    Unsounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tie {
    #[default]
    #[serde(rename = "", alias = "none")]
    None,
    #[serde(rename = "tie_start", alias = "start")]
    Start,
    #[serde(rename = "tie_stop", alias = "stop")]
    Stop,
    #[serde(rename = "tie_continue", alias = "continue")]
    Continue,
}

/// One row of a score event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub staff: String,
    pub measure_number: u32,
    pub event_type: EventKind,
    /// Quarter notes from the start of the measure
    pub onset_in_measure: f64,
    /// Quarter notes from the start of the score
    #[serde(rename = "onset_in_score")]
    pub global_onset: f64,
    pub duration: f64,
    /// MIDI velocity; absent for rests and unvoiced notes
    pub velocity: Option<f64>,
    #[serde(rename = "tie_info", default)]
    pub tie: Tie,
}

impl ScoreEvent {
    pub fn is_sounded(&self) -> bool {
        self.event_type == EventKind::Sounded
    }

    /// Sounded, and not the held-over tail of a tied note.
    pub fn starts_note(&self) -> bool {
        self.is_sounded() && !matches!(self.tie, Tie::Stop | Tie::Continue)
    }
}

/// Provider of event tables for the score and performance files named in
/// the corpus metadata.
pub trait EventTableSource {
    fn events(&self, midi_path: &str) -> Result<Vec<ScoreEvent>>;
}

/// Event tables stored next to the corpus MIDI files as CSV.
///
/// `Schubert/D899/3/midi_score.mid` is read from
/// `{root}/Schubert/D899/3/midi_score.events.csv`.
#[derive(Debug, Clone)]
pub struct CsvEventTables {
    root: PathBuf,
}

impl CsvEventTables {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_path(&self, midi_path: &str) -> PathBuf {
        self.root.join(midi_path).with_extension("events.csv")
    }
}

impl EventTableSource for CsvEventTables {
    fn events(&self, midi_path: &str) -> Result<Vec<ScoreEvent>> {
        read_event_table(&self.table_path(midi_path))
    }
}

/// Read an event table from a CSV file.
pub fn read_event_table(path: &Path) -> Result<Vec<ScoreEvent>> {
    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ScoreEvent>, _>>()
        .map_err(csv_err)
}

/// Write an event table as CSV, replacing any existing file.
pub fn write_event_table(path: &Path, events: &[ScoreEvent]) -> Result<()> {
    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for event in events {
        writer.serialize(event).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Mean velocity of the notes sounding around each beat.
///
/// For every beat, averages the velocity of note-starting events whose
/// global onset lies in `[beat - 0.5, beat + 0.5)`. A beat with no such
/// event gets velocity 0.
pub fn velocities_at_beats(beats: &[f64], events: &[ScoreEvent]) -> Vec<f64> {
    beats
        .iter()
        .map(|&beat| {
            let (sum, count) = events
                .iter()
                .filter(|e| e.starts_note())
                .filter(|e| e.global_onset >= beat - 0.5 && e.global_onset < beat + 0.5)
                .filter_map(|e| e.velocity)
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        })
        .collect()
}

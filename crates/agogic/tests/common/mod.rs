//! On-disk synthetic corpus shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use agogic::events::write_event_table;
use agogic::{EventKind, ScoreEvent, Tie};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

pub type TestResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Seconds between performed beats, by beat index: 120, 240, 60, 80 BPM.
pub const DURATIONS: [f64; 4] = [0.5, 0.25, 1.0, 0.75];
/// Performed velocity of the note on each beat, by beat index.
pub const ACCENTS: [f64; 4] = [80.0, 80.0, 40.0, 40.0];

pub struct Fixture {
    pub dir: TempDir,
    rows: Vec<[String; 4]>,
    annotations: Map<String, Value>,
}

impl Fixture {
    pub fn new() -> TestResult<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            rows: Vec::new(),
            annotations: Map::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// A 4/4 piece at 120 BPM with `measures` measures, performed with
    /// [`DURATIONS`] and [`ACCENTS`].
    pub fn piece(&mut self, composer: &str, name: &str, measures: usize) -> TestResult<String> {
        self.piece_with_signature(composer, name, measures, "4/4")
    }

    pub fn piece_with_signature(
        &mut self,
        composer: &str,
        name: &str,
        measures: usize,
        signature: &str,
    ) -> TestResult<String> {
        let beats = measures * 4 + 1;
        let score_beats: Vec<f64> = (0..beats).map(|i| i as f64 * 0.5).collect();
        let downbeats: Vec<f64> = (0..=measures).map(|m| m as f64 * 2.0).collect();
        let mut performance_beats = Vec::with_capacity(beats);
        let mut t = 0.0;
        for i in 0..beats {
            performance_beats.push(t);
            t += DURATIONS[i % 4];
        }

        let performance = format!("{composer}/{name}/perf.mid");
        let score = format!("{composer}/{name}/midi_score.mid");

        self.annotations.insert(
            performance.clone(),
            json!({
                "midi_score_time_signatures": { "0.0": [signature, 4] },
                "midi_score_beats": score_beats,
                "midi_score_downbeats": downbeats,
                "performance_beats": performance_beats,
            }),
        );

        let score_events: Vec<ScoreEvent> = score_beats.iter().map(|&b| note(b, 64.0)).collect();
        let performance_events: Vec<ScoreEvent> = score_beats
            .iter()
            .enumerate()
            .map(|(i, &b)| note(b, ACCENTS[i % 4]))
            .collect();
        self.write_events(&score, &score_events)?;
        self.write_events(&performance, &performance_events)?;

        self.row(composer, &performance, &score);
        Ok(performance)
    }

    /// Rewrite part of an existing annotation entry.
    pub fn edit_annotation(
        &mut self,
        performance: &str,
        edit: impl FnOnce(&mut Map<String, Value>),
    ) {
        if let Some(Value::Object(entry)) = self.annotations.get_mut(performance) {
            edit(entry);
        }
    }

    /// A metadata row with no annotation entry.
    pub fn unannotated(&mut self, composer: &str, name: &str) -> String {
        let performance = format!("{composer}/{name}/perf.mid");
        let score = format!("{composer}/{name}/midi_score.mid");
        self.row(composer, &performance, &score);
        performance
    }

    fn row(&mut self, composer: &str, performance: &str, score: &str) {
        self.rows.push([
            composer.to_string(),
            performance.replace(".mid", "_annotations.txt"),
            performance.to_string(),
            score.to_string(),
        ]);
    }

    fn write_events(&self, midi_path: &str, events: &[ScoreEvent]) -> TestResult {
        let path = self.root().join(midi_path).with_extension("events.csv");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_event_table(&path, events)?;
        Ok(())
    }

    pub fn remove_events(&self, midi_path: &str) -> TestResult {
        fs::remove_file(self.root().join(midi_path).with_extension("events.csv"))?;
        Ok(())
    }

    /// Write `metadata.csv` and `asap_annotations.json`.
    pub fn finish(&self) -> TestResult {
        let mut writer = csv::Writer::from_path(self.root().join("metadata.csv"))?;
        writer.write_record([
            "composer",
            "title",
            "performance_annotations",
            "midi_performance",
            "midi_score",
        ])?;
        for [composer, annotations, performance, score] in &self.rows {
            writer.write_record([
                composer.as_str(),
                "untitled",
                annotations.as_str(),
                performance.as_str(),
                score.as_str(),
            ])?;
        }
        writer.flush()?;

        fs::write(
            self.root().join("asap_annotations.json"),
            serde_json::to_string_pretty(&self.annotations)?,
        )?;
        Ok(())
    }
}

pub fn note(onset: f64, velocity: f64) -> ScoreEvent {
    ScoreEvent {
        staff: "P1".into(),
        measure_number: (onset / 4.0) as u32 + 1,
        event_type: EventKind::Sounded,
        onset_in_measure: onset % 4.0,
        global_onset: onset,
        duration: 0.5,
        velocity: Some(velocity),
        tie: Tie::None,
    }
}

/// Five Bach pieces that qualify plus one of each kind of skip.
pub fn bach_corpus() -> TestResult<Fixture> {
    let mut fixture = Fixture::new()?;
    for (name, measures) in [
        ("Fugue/bwv_846", 2),
        ("Fugue/bwv_848", 3),
        ("Fugue/bwv_854", 4),
        ("Fugue/bwv_856", 5),
        ("Fugue/bwv_858", 6),
    ] {
        fixture.piece("Bach", name, measures)?;
    }
    fixture.piece_with_signature("Bach", "Prelude/bwv_875", 3, "3/4")?;
    fixture.piece("Bach", "Prelude/bwv_885", 3)?;
    fixture.unannotated("Bach", "Prelude/bwv_999");

    // Changes meter half way through.
    let changing = fixture.piece("Bach", "Prelude/bwv_871", 3)?;
    fixture.edit_annotation(&changing, |entry| {
        entry.insert(
            "midi_score_time_signatures".into(),
            json!({ "0.0": ["4/4", 4], "4.0": ["3/4", 3] }),
        );
    });

    // Performance annotation lost its final beat.
    let truncated = fixture.piece("Bach", "Prelude/bwv_873", 3)?;
    fixture.edit_annotation(&truncated, |entry| {
        if let Some(Value::Array(beats)) = entry.get_mut("performance_beats") {
            beats.pop();
        }
    });

    fixture.piece("Mozart", "Sonata/k331", 3)?;
    fixture.finish()?;
    Ok(fixture)
}

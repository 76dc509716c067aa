//! On-disk cache of loaded subcorpora.
//!
//! Layout, one directory per corpus key:
//!
//! ```text
//! {cache_dir}/
//! └── Bach_4-4/
//!     ├── bpm_list.json                   # [tempo, ...]
//!     ├── midi_beats_list.json            # [[beat, ...], ...]
//!     ├── midi_downbeats_list.json
//!     ├── performance_beats_list.json
//!     ├── performance_downbeats_list.json
//!     ├── velocity_beats_list.json
//!     ├── perf_velocity_beats_list.json
//!     ├── piece_ids.json                  # optional
//!     └── skipped.json                    # optional
//! ```
//!
//! Every sequence file holds one entry per piece, in corpus order, and
//! round-trips exactly. An entry is written to a staging directory and
//! renamed into place as a whole, so readers never see a partial entry;
//! concurrent writers race and the last rename wins.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::corpus::{Corpus, Piece, SkippedPiece};
use crate::{Error, Result};

const BPM: &str = "bpm_list.json";
const SCORE_BEATS: &str = "midi_beats_list.json";
const SCORE_DOWNBEATS: &str = "midi_downbeats_list.json";
const PERFORMANCE_BEATS: &str = "performance_beats_list.json";
const PERFORMANCE_DOWNBEATS: &str = "performance_downbeats_list.json";
const SCORE_VELOCITIES: &str = "velocity_beats_list.json";
const PERFORMANCE_VELOCITIES: &str = "perf_velocity_beats_list.json";
const PIECE_IDS: &str = "piece_ids.json";
const SKIPPED: &str = "skipped.json";

const SEQUENCE_FILES: [&str; 6] = [
    SCORE_BEATS,
    SCORE_DOWNBEATS,
    PERFORMANCE_BEATS,
    PERFORMANCE_DOWNBEATS,
    SCORE_VELOCITIES,
    PERFORMANCE_VELOCITIES,
];

/// A subcorpus as read back from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCorpus {
    pub corpus: Corpus,
    pub skipped: Vec<SkippedPiece>,
}

/// Directory of cached subcorpora.
#[derive(Debug, Clone)]
pub struct BeatListCache {
    dir: PathBuf,
}

impl BeatListCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_dir(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read a cached subcorpus. `Ok(None)` when the entry is absent or
    /// incomplete; a present but unreadable entry is an error.
    pub fn load(&self, key: &str) -> Result<Option<CachedCorpus>> {
        let entry = self.entry_dir(key);
        let mut required = std::iter::once(BPM).chain(SEQUENCE_FILES);
        if required.any(|name| !entry.join(name).is_file()) {
            return Ok(None);
        }

        let tempos: Vec<f64> = read_json(&entry.join(BPM))?;
        let [score_beats, score_downbeats, performance_beats, performance_downbeats, score_velocities, performance_velocities] =
            read_sequences(&entry)?;

        let count = tempos.len();
        for (name, lists) in SEQUENCE_FILES.iter().zip([
            &score_beats,
            &score_downbeats,
            &performance_beats,
            &performance_downbeats,
            &score_velocities,
            &performance_velocities,
        ]) {
            if lists.len() != count {
                return Err(Error::CacheMismatch(format!(
                    "{name} has {} pieces, {BPM} has {count}",
                    lists.len()
                )));
            }
        }

        let ids_path = entry.join(PIECE_IDS);
        let ids: Vec<String> = if ids_path.is_file() {
            read_json(&ids_path)?
        } else {
            (0..count).map(|i| format!("piece-{i}")).collect()
        };
        if ids.len() != count {
            return Err(Error::CacheMismatch(format!(
                "{PIECE_IDS} has {} entries, {BPM} has {count}",
                ids.len()
            )));
        }

        let skipped_path = entry.join(SKIPPED);
        let skipped = if skipped_path.is_file() {
            read_json(&skipped_path)?
        } else {
            Vec::new()
        };

        let pieces = ids
            .into_iter()
            .zip(tempos)
            .zip(score_beats)
            .zip(score_downbeats)
            .zip(performance_beats)
            .zip(performance_downbeats)
            .zip(score_velocities)
            .zip(performance_velocities)
            .map(
                |(((((((id, tempo), sb), sd), pb), pd), sv), pv)| Piece {
                    id,
                    tempo,
                    score_beats: sb,
                    score_downbeats: sd,
                    performance_beats: pb,
                    performance_downbeats: pd,
                    score_velocities: sv,
                    performance_velocities: pv,
                },
            )
            .collect();

        debug!(entry = %entry.display(), pieces = count, "read beat list cache");
        Ok(Some(CachedCorpus {
            corpus: Corpus::new(pieces),
            skipped,
        }))
    }

    /// Write a subcorpus, replacing any previous entry as a whole.
    ///
    /// The files are written into a staging directory that is renamed over
    /// the entry once complete. A failed write removes the staging
    /// directory and leaves the previous entry untouched.
    pub fn store(&self, key: &str, corpus: &Corpus, skipped: &[SkippedPiece]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::Io {
            path: self.dir.clone(),
            source,
        })?;
        let entry = self.entry_dir(key);
        let staging = self.dir.join(format!(".{key}.tmp-{}", std::process::id()));

        let written = write_entry(&staging, corpus, skipped).and_then(|()| swap_in(&staging, &entry));
        if written.is_err() && staging.is_dir() {
            if let Err(error) = fs::remove_dir_all(&staging) {
                warn!(staging = %staging.display(), %error, "could not remove cache staging directory");
            }
        }
        written?;

        debug!(entry = %entry.display(), pieces = corpus.len(), "wrote beat list cache");
        Ok(())
    }
}

fn write_entry(dir: &Path, corpus: &Corpus, skipped: &[SkippedPiece]) -> Result<()> {
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };
    if dir.is_dir() {
        fs::remove_dir_all(dir).map_err(io_err)?;
    }
    fs::create_dir(dir).map_err(io_err)?;

    let tempos: Vec<f64> = corpus.pieces.iter().map(|p| p.tempo).collect();
    let ids: Vec<&str> = corpus.pieces.iter().map(|p| p.id.as_str()).collect();

    write_json(&dir.join(BPM), &tempos)?;
    write_json(&dir.join(SCORE_BEATS), &column(corpus, |p| &p.score_beats))?;
    write_json(&dir.join(SCORE_DOWNBEATS), &column(corpus, |p| &p.score_downbeats))?;
    write_json(&dir.join(PERFORMANCE_BEATS), &column(corpus, |p| &p.performance_beats))?;
    write_json(
        &dir.join(PERFORMANCE_DOWNBEATS),
        &column(corpus, |p| &p.performance_downbeats),
    )?;
    write_json(&dir.join(SCORE_VELOCITIES), &column(corpus, |p| &p.score_velocities))?;
    write_json(
        &dir.join(PERFORMANCE_VELOCITIES),
        &column(corpus, |p| &p.performance_velocities),
    )?;
    write_json(&dir.join(PIECE_IDS), &ids)?;
    write_json(&dir.join(SKIPPED), &skipped)
}

/// Rename a complete staging directory over `entry`.
///
/// A directory cannot be renamed over a non-empty one, so the old entry is
/// moved aside first and deleted afterwards. In between, readers see a miss.
fn swap_in(staging: &Path, entry: &Path) -> Result<()> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::Io { path, source }
    };

    let name = entry
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let retired = entry.with_file_name(format!(".{name}.old-{}", std::process::id()));

    if entry.is_dir() {
        fs::rename(entry, &retired).map_err(io_err(entry))?;
    }
    fs::rename(staging, entry).map_err(io_err(entry))?;
    if retired.is_dir() {
        if let Err(error) = fs::remove_dir_all(&retired) {
            warn!(retired = %retired.display(), %error, "could not remove replaced cache entry");
        }
    }
    Ok(())
}

fn column<'c>(corpus: &'c Corpus, field: fn(&Piece) -> &Vec<f64>) -> Vec<&'c Vec<f64>> {
    corpus.pieces.iter().map(field).collect()
}

fn read_sequences(entry: &Path) -> Result<[Vec<Vec<f64>>; 6]> {
    let mut lists: [Vec<Vec<f64>>; 6] = Default::default();
    for (slot, name) in lists.iter_mut().zip(SEQUENCE_FILES) {
        *slot = read_json(&entry.join(name))?;
    }
    Ok(lists)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)
}

use serde::{Deserialize, Serialize};

/// Which performed quantity a model or transfer function describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceType {
    /// Beat timing. Raw values are beat positions in seconds; models work
    /// in BPM derived from consecutive beats.
    Time,
    /// Loudness per beat, raw MIDI velocity.
    Velocity,
}

impl PerformanceType {
    /// Convert a raw per-beat sequence into model units.
    ///
    /// Time positions become BPM (one element shorter); velocities pass
    /// through unchanged.
    pub fn ingest(&self, raw: &[f64]) -> Vec<f64> {
        match self {
            PerformanceType::Time => positions_to_bpm(raw),
            PerformanceType::Velocity => raw.to_vec(),
        }
    }

    /// Whether beat indices for this quantity keep the final beat.
    pub fn last_beat(&self) -> LastBeat {
        match self {
            PerformanceType::Time => LastBeat::Drop,
            PerformanceType::Velocity => LastBeat::Keep,
        }
    }

    /// Offset subtracted from performed values before pooling: the piece
    /// tempo for time, nothing for velocity.
    pub fn bias(&self, tempo: f64) -> f64 {
        match self {
            PerformanceType::Time => tempo,
            PerformanceType::Velocity => 0.0,
        }
    }
}

impl std::fmt::Display for PerformanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceType::Time => write!(f, "time"),
            PerformanceType::Velocity => write!(f, "velocity"),
        }
    }
}

impl std::str::FromStr for PerformanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" | "timing" | "tempo" => Ok(PerformanceType::Time),
            "velocity" | "dynamics" => Ok(PerformanceType::Velocity),
            other => Err(format!("unknown performance type: {other}")),
        }
    }
}

/// Whether the last beat of a piece takes part in per-beat statistics.
///
/// A beat duration needs a following beat, so duration-based (time)
/// sequences have no entry for the final beat while raw-value (velocity)
/// sequences do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastBeat {
    Drop,
    Keep,
}

/// Beat positions in seconds to instantaneous tempo in BPM.
///
/// Element `i` is `60 / (positions[i + 1] - positions[i])`. The result is
/// one shorter than the input; fewer than two positions yield nothing.
pub fn positions_to_bpm(positions: &[f64]) -> Vec<f64> {
    positions.windows(2).map(|w| 60.0 / (w[1] - w[0])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpm_from_half_second_beats() {
        assert_eq!(positions_to_bpm(&[0.0, 0.5, 1.0, 2.0]), vec![120.0, 120.0, 60.0]);
    }

    #[test]
    fn bpm_of_short_sequences_is_empty() {
        assert!(positions_to_bpm(&[]).is_empty());
        assert!(positions_to_bpm(&[3.0]).is_empty());
    }

    #[test]
    fn ingest_only_converts_time() {
        let raw = [0.0, 1.0, 1.5];
        assert_eq!(PerformanceType::Time.ingest(&raw), vec![60.0, 120.0]);
        assert_eq!(PerformanceType::Velocity.ingest(&raw), raw.to_vec());
    }

    #[test]
    fn parse_performance_type() {
        assert_eq!("Time".parse::<PerformanceType>(), Ok(PerformanceType::Time));
        assert_eq!("velocity".parse::<PerformanceType>(), Ok(PerformanceType::Velocity));
        assert!("pitch".parse::<PerformanceType>().is_err());
    }
}

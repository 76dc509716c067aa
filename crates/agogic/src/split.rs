use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::{Error, Result};

/// Seed used when none is configured.
pub const DEFAULT_SPLIT_SEED: u64 = 1;

/// Disjoint train/test piece indices covering `0..n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// Ascending
    pub train: Vec<usize>,
    /// Ascending
    pub test: Vec<usize>,
}

impl Split {
    /// Choose `floor(n * test_fraction)` test indices without replacement.
    ///
    /// The same `n`, fraction and seed always give the same partition.
    pub fn new(n: usize, test_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..=1.0).contains(&test_fraction) {
            return Err(Error::InvalidFraction(test_fraction));
        }

        let test_len = ((n as f64) * test_fraction).floor() as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut test = rand::seq::index::sample(&mut rng, n, test_len.min(n)).into_vec();
        test.sort_unstable();

        let mut is_test = vec![false; n];
        for &i in &test {
            is_test[i] = true;
        }
        let train = (0..n).filter(|&i| !is_test[i]).collect();

        Ok(Self { train, test })
    }

    /// Partition a corpus by this split, preserving corpus order.
    pub fn apply(&self, corpus: &Corpus) -> (Corpus, Corpus) {
        (corpus.select(&self.train), corpus.select(&self.test))
    }
}

/// Split a corpus into (train, test) subcorpora.
pub fn train_test_split(corpus: &Corpus, test_fraction: f64, seed: u64) -> Result<(Corpus, Corpus)> {
    let split = Split::new(corpus.len(), test_fraction, seed)?;
    Ok(split.apply(corpus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Piece;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn sizes_follow_floor_of_fraction() {
        for (n, fraction, expected) in [(10, 0.2, 2), (9, 0.2, 1), (4, 0.2, 0), (7, 1.0, 7), (0, 0.5, 0)] {
            let split = Split::new(n, fraction, DEFAULT_SPLIT_SEED).unwrap();
            assert_eq!(split.test.len(), expected, "n={n} fraction={fraction}");
            assert_eq!(split.train.len(), n - expected);
        }
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        let split = Split::new(57, 0.3, 42).unwrap();
        let train: BTreeSet<_> = split.train.iter().copied().collect();
        let test: BTreeSet<_> = split.test.iter().copied().collect();

        assert!(train.is_disjoint(&test));
        let all: BTreeSet<_> = train.union(&test).copied().collect();
        assert_eq!(all, (0..57).collect::<BTreeSet<_>>());
    }

    #[test]
    fn same_seed_same_partition() {
        assert_eq!(Split::new(100, 0.2, 7).unwrap(), Split::new(100, 0.2, 7).unwrap());
    }

    #[test]
    fn different_seeds_usually_differ() {
        let a = Split::new(100, 0.2, 1).unwrap();
        let b = Split::new(100, 0.2, 2).unwrap();
        assert_ne!(a.test, b.test);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        assert!(matches!(Split::new(10, 1.5, 1), Err(Error::InvalidFraction(_))));
        assert!(matches!(Split::new(10, -0.1, 1), Err(Error::InvalidFraction(_))));
        assert!(matches!(Split::new(10, f64::NAN, 1), Err(Error::InvalidFraction(_))));
    }

    #[test]
    fn corpus_partition_keeps_pieces_whole() {
        let pieces = (0..10)
            .map(|i| Piece {
                id: format!("piece-{i}"),
                tempo: 60.0 + i as f64,
                score_beats: vec![i as f64],
                score_downbeats: vec![0.0, 4.0],
                performance_beats: vec![i as f64 + 0.1],
                performance_downbeats: vec![0.0],
                score_velocities: vec![50.0],
                performance_velocities: vec![i as f64],
            })
            .collect();
        let corpus = Corpus::new(pieces);

        let (train, test) = train_test_split(&corpus, 0.2, DEFAULT_SPLIT_SEED).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        for piece in train.iter().chain(test.iter()) {
            let i: usize = piece.id["piece-".len()..].parse().unwrap();
            assert_eq!(piece.tempo, 60.0 + i as f64);
            assert_eq!(piece.performance_velocities, vec![i as f64]);
        }
    }
}

//! Seeded train/test partition.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::ValuationError;

/// Row indices of each side of the split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and hold out `round(n * test_fraction)` rows
/// (at least one on each side).
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit, ValuationError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ValuationError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if n < 2 {
        return Err(ValuationError::NoUsableRecords(format!(
            "need at least 2 records to hold out a test split, got {n}"
        )));
    }

    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);
    let train = idx.split_off(n_test);
    Ok(TrainTestSplit { train, test: idx })
}

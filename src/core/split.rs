//! Seeded train/val/test partitioning.
//!
//! Two cuts: the first sets aside `holdout_fraction` of the chips, the second
//! divides that holdout into val and test by `test_fraction`. Holdout sizes
//! are rounded up, so a small dataset still gets evaluation chips before it
//! gets training chips.

use crate::domain::model::{ChipRecord, SplitPlan};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.3;
pub const DEFAULT_TEST_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitSettings {
    pub seed: u64,
    pub holdout_fraction: f64,
    pub test_fraction: f64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            test_fraction: DEFAULT_TEST_FRACTION,
        }
    }
}

/// Number of items that land in the holdout side of a cut.
pub fn holdout_count(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).ceil() as usize).min(n)
}

/// Shuffles with a fresh generator seeded by `seed` and returns `(kept, holdout)`.
fn cut(mut items: Vec<ChipRecord>, fraction: f64, seed: u64) -> (Vec<ChipRecord>, Vec<ChipRecord>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let n_holdout = holdout_count(items.len(), fraction);
    let kept = items.split_off(n_holdout);
    (kept, items)
}

/// Input order does not matter: records are sorted before shuffling.
pub fn split_dataset(mut files: Vec<ChipRecord>, settings: SplitSettings) -> SplitPlan {
    files.sort();
    files.dedup();

    let (train, holdout) = cut(files, settings.holdout_fraction, settings.seed);
    let (val, test) = cut(holdout, settings.test_fraction, settings.seed);

    if train.is_empty() && !(val.is_empty() && test.is_empty()) {
        tracing::warn!(
            holdout = val.len() + test.len(),
            "train split is empty; every chip went to val/test"
        );
    }

    tracing::debug!(
        train = train.len(),
        val = val.len(),
        test = test.len(),
        seed = settings.seed,
        "dataset split computed"
    );

    SplitPlan { train, val, test }
}

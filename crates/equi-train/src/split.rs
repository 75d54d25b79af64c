//! Seeded, stratified train / validation / test splitting.

use crate::error::{Result, TrainingError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::info;

/// Row indices of each split, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `labels` into train / validation / test, preserving class ratios.
///
/// `test_size` of the rows are held out, then `validation_fraction` of the
/// held-out rows go to validation and the rest to test. Every class needs at
/// least two members so it appears on both sides of the first split.
pub fn stratified_split<L: Ord>(
    labels: &[L],
    test_size: f64,
    validation_fraction: f64,
    seed: u64,
) -> Result<SplitIndices> {
    let mut rng = StdRng::seed_from_u64(seed);
    let all: Vec<usize> = (0..labels.len()).collect();

    let (train, held_out) = split_by_class(labels, &all, test_size, true, &mut rng)?;
    let (test, validation) = split_by_class(labels, &held_out, validation_fraction, false, &mut rng)?;

    info!(
        "Data split: training {} / validation {} / testing {} samples",
        train.len(),
        validation.len(),
        test.len()
    );
    Ok(SplitIndices {
        train,
        validation,
        test,
    })
}

/// Returns `(kept, held_out)` where `held_out` takes `fraction` of each class.
fn split_by_class<L: Ord>(
    labels: &[L],
    indices: &[usize],
    fraction: f64,
    keep_both_sides: bool,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut by_class: BTreeMap<&L, Vec<usize>> = BTreeMap::new();
    for &i in indices {
        by_class.entry(&labels[i]).or_default().push(i);
    }

    let mut kept = Vec::new();
    let mut held_out = Vec::new();
    for members in by_class.values_mut() {
        let n = members.len();
        if keep_both_sides && n < 2 {
            return Err(TrainingError::InvalidData(
                "the least populated class has only 1 member; at least 2 are needed to stratify"
                    .to_string(),
            ));
        }
        members.shuffle(rng);

        let mut n_out = (n as f64 * fraction).round() as usize;
        if keep_both_sides {
            n_out = n_out.clamp(1, n - 1);
        }
        let n_out = n_out.min(n);

        held_out.extend_from_slice(&members[..n_out]);
        kept.extend_from_slice(&members[n_out..]);
    }

    kept.sort_unstable();
    held_out.sort_unstable();
    Ok((kept, held_out))
}

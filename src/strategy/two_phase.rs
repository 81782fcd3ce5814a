use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::{radix, Tuning};
use crate::aggregate::{accumulate, merge};
use crate::record::{AggMap, Record};

/// One map per rayon fold task over batches of `tuning.batch_size()` rows.
pub(super) fn local_maps<'a>(
    records: &'a [Record],
    tuning: &Tuning,
) -> impl ParallelIterator<Item = AggMap> + 'a {
    records
        .par_chunks(tuning.batch_size())
        .fold(AggMap::new, |mut acc, batch| {
            for record in batch {
                accumulate(&mut acc, record);
            }
            acc
        })
}

pub fn run_central(records: &[Record], tuning: &Tuning) -> AggMap {
    let phase1 = Instant::now();
    let locals: Vec<AggMap> = local_maps(records, tuning).collect();
    debug!(local_maps = locals.len(), elapsed = ?phase1.elapsed(), "phase 1 finished");

    merge_central(locals)
}

/// Central merge while every local map stays within
/// `tuning.adaptation_threshold` groups, partitioned parallel merge otherwise.
pub fn run_adaptive(records: &[Record], tuning: &Tuning) -> AggMap {
    let phase1 = Instant::now();
    let locals: Vec<AggMap> = local_maps(records, tuning).collect();
    let largest = locals.iter().map(AggMap::len).max().unwrap_or(0);
    debug!(local_maps = locals.len(), largest, elapsed = ?phase1.elapsed(), "phase 1 finished");

    if largest <= tuning.adaptation_threshold {
        return merge_central(locals);
    }

    let partitions = tuning.partitions();
    debug!(largest, threshold = tuning.adaptation_threshold, partitions, "switching to partitioned merge");
    let split: Vec<Vec<AggMap>> = locals
        .into_par_iter()
        .map(|local| radix::split_map(local, partitions))
        .collect();
    radix::merge_partitions(split, partitions)
}

fn merge_central(mut locals: Vec<AggMap>) -> AggMap {
    let phase2 = Instant::now();
    if locals.is_empty() {
        return AggMap::new();
    }
    let mut result = locals.swap_remove(0);
    for local in locals {
        merge(&mut result, local);
    }
    debug!(groups = result.len(), elapsed = ?phase2.elapsed(), "phase 2 finished");
    result
}

pub fn run_tree(records: &[Record], tuning: &Tuning) -> AggMap {
    local_maps(records, tuning).reduce(AggMap::new, |mut acc, mut x| {
        if acc.len() < x.len() {
            std::mem::swap(&mut acc, &mut x);
        }
        merge(&mut acc, x);
        acc
    })
}

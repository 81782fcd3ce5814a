use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::two_phase::local_maps;
use super::{hash_key, Tuning};
use crate::aggregate::{accumulate, merge};
use crate::record::{AggMap, GroupKey, Record};

#[inline]
pub(super) fn storage(partitions: usize) -> Vec<AggMap> {
    (0..partitions).map(|_| AggMap::new()).collect()
}

#[inline]
pub(super) fn partition_of(key: GroupKey, partitions: usize) -> usize {
    (hash_key(key) % partitions as u64) as usize
}

/// Phase 1 splits rows by key hash into per-task partition tables.
pub fn run(records: &[Record], tuning: &Tuning) -> AggMap {
    let partitions = tuning.partitions();

    let phase1 = Instant::now();
    let locals: Vec<Vec<AggMap>> = records
        .par_chunks(tuning.batch_size())
        .fold(
            || storage(partitions),
            |mut parts, batch| {
                for record in batch {
                    accumulate(&mut parts[partition_of(record.group_key, partitions)], record);
                }
                parts
            },
        )
        .collect();
    debug!(partitions, local_tables = locals.len(), elapsed = ?phase1.elapsed(), "phase 1 finished");

    merge_partitions(locals, partitions)
}

/// Phase 1 builds plain local maps, phase 2 splits each one by key hash,
/// phase 3 merges the partitions in parallel.
pub fn run_three_phase(records: &[Record], tuning: &Tuning) -> AggMap {
    let partitions = tuning.partitions();

    let phase1 = Instant::now();
    let locals: Vec<AggMap> = local_maps(records, tuning).collect();
    debug!(local_maps = locals.len(), elapsed = ?phase1.elapsed(), "phase 1 finished");

    let phase2 = Instant::now();
    let split: Vec<Vec<AggMap>> = locals
        .into_par_iter()
        .map(|local| split_map(local, partitions))
        .collect();
    debug!(partitions, elapsed = ?phase2.elapsed(), "phase 2 finished");

    merge_partitions(split, partitions)
}

/// Distributes the entries of `map` over `partitions` tables by key hash.
pub(super) fn split_map(map: AggMap, partitions: usize) -> Vec<AggMap> {
    let mut parts = storage(partitions);
    for (key, agg) in map {
        parts[partition_of(key, partitions)]
            .entry(key)
            .or_default()
            .merge(&agg);
    }
    parts
}

/// Merges `locals[t][p]` across tasks for every partition `p` in parallel and
/// unions the disjoint results.
pub(super) fn merge_partitions(locals: Vec<Vec<AggMap>>, partitions: usize) -> AggMap {
    // by_partition[p][t] is task t's map for partition p
    let mut by_partition: Vec<Vec<AggMap>> = (0..partitions)
        .map(|_| Vec::with_capacity(locals.len()))
        .collect();
    for parts in locals {
        for (idx, map) in parts.into_iter().enumerate() {
            by_partition[idx].push(map);
        }
    }

    let merge_start = Instant::now();
    let merged: Vec<AggMap> = by_partition
        .into_par_iter()
        .map(|maps| {
            maps.into_iter()
                .reduce(|mut acc, map| {
                    merge(&mut acc, map);
                    acc
                })
                .unwrap_or_default()
        })
        .collect();
    debug!(elapsed = ?merge_start.elapsed(), "partitions merged");

    union(merged)
}

/// Partitions hold disjoint key sets, so they are concatenated without merging.
pub(super) fn union(parts: Vec<AggMap>) -> AggMap {
    let mut result = AggMap::with_capacity(parts.iter().map(AggMap::len).sum());
    for part in parts {
        result.extend(part);
    }
    result
}

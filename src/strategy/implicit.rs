use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::radix::{partition_of, union};
use super::Tuning;
use crate::aggregate::accumulate;
use crate::record::{AggMap, Record};

/// Every partition task scans the whole input and keeps only the rows whose
/// key hashes to it, so no merge step is needed.
pub fn run(records: &[Record], tuning: &Tuning) -> AggMap {
    let partitions = tuning.partitions();

    let start = Instant::now();
    let parts: Vec<AggMap> = (0..partitions)
        .into_par_iter()
        .map(|partition| {
            let mut map = AggMap::new();
            for record in records {
                if partition_of(record.group_key, partitions) == partition {
                    accumulate(&mut map, record);
                }
            }
            map
        })
        .collect();
    debug!(partitions, elapsed = ?start.elapsed(), "partition scans finished");

    union(parts)
}

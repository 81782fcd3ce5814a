//! Grouped summation over an in-memory record sequence.

use crate::record::{AggMap, Record};

/// Upsert one record into `map`, starting a new group at `(0, 0)`.
#[inline]
pub fn accumulate(map: &mut AggMap, record: &Record) {
    map.entry(record.group_key).or_default().add(record);
}

/// Single pass over `records`, returning one [`Aggregate`](crate::Aggregate) per distinct key.
pub fn aggregate(records: &[Record]) -> AggMap {
    let mut result = AggMap::new();
    for record in records {
        accumulate(&mut result, record);
    }
    result
}

/// Streaming form of [`aggregate`] for sources that yield records one by one.
pub fn aggregate_iter<I>(records: I) -> AggMap
where
    I: IntoIterator<Item = Record>,
{
    records.into_iter().fold(AggMap::new(), |mut acc, record| {
        accumulate(&mut acc, &record);
        acc
    })
}

/// Fold every group of `other` into `into`.
pub fn merge(into: &mut AggMap, other: AggMap) {
    for (key, value) in other {
        into.entry(key)
            .and_modify(|e| e.merge(&value))
            .or_insert(value);
    }
}

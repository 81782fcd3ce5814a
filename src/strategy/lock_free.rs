use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rayon::prelude::*;

use super::{hash_key, Tuning};
use crate::error::StrategyError;
use crate::record::{AggMap, Aggregate, GroupKey, Record};

/// Marks an unclaimed slot. Rows with this key go to a dedicated slot.
const EMPTY: GroupKey = i64::MIN;

#[derive(Debug)]
struct Slot {
    key: AtomicI64,
    sum1: AtomicI64,
    sum2: AtomicI64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            key: AtomicI64::new(EMPTY),
            sum1: AtomicI64::new(0),
            sum2: AtomicI64::new(0),
        }
    }

    #[inline]
    fn add(&self, record: &Record) {
        self.sum1.fetch_add(record.value1, Ordering::Relaxed);
        self.sum2.fetch_add(record.value2, Ordering::Relaxed);
    }

    fn load(&self) -> Aggregate {
        Aggregate::new(
            self.sum1.load(Ordering::Relaxed),
            self.sum2.load(Ordering::Relaxed),
        )
    }

    fn into_aggregate(self) -> Aggregate {
        Aggregate::new(self.sum1.into_inner(), self.sum2.into_inner())
    }
}

/// Fixed-size linear-probing table shared by all workers.
///
/// Slots are claimed with a compare-exchange on the key and never released,
/// so a key maps to the same slot for the lifetime of the table.
#[derive(Debug)]
pub struct LockFreeTable {
    slots: Box<[Slot]>,
    mask: usize,
    min_key: Slot,
    min_key_used: AtomicBool,
}

impl LockFreeTable {
    /// Table able to hold `rows` distinct keys at a load factor of at most one half.
    pub fn with_capacity(rows: usize) -> Self {
        let capacity = rows.saturating_mul(2).max(16).next_power_of_two();
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            mask: capacity - 1,
            min_key: Slot::empty(),
            min_key_used: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn upsert(&self, record: &Record) -> Result<(), StrategyError> {
        if record.group_key == EMPTY {
            self.min_key_used.store(true, Ordering::Relaxed);
            self.min_key.add(record);
            return Ok(());
        }
        let mut idx = hash_key(record.group_key) as usize & self.mask;
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            match slot.key.compare_exchange(
                EMPTY,
                record.group_key,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    slot.add(record);
                    return Ok(());
                }
                Err(existing) if existing == record.group_key => {
                    slot.add(record);
                    return Ok(());
                }
                Err(_) => idx = (idx + 1) & self.mask,
            }
        }
        Err(StrategyError::TableFull {
            capacity: self.slots.len(),
        })
    }

    pub fn get(&self, key: GroupKey) -> Option<Aggregate> {
        if key == EMPTY {
            return self
                .min_key_used
                .load(Ordering::Relaxed)
                .then(|| self.min_key.load());
        }
        let mut idx = hash_key(key) as usize & self.mask;
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            match slot.key.load(Ordering::Acquire) {
                stored if stored == key => return Some(slot.load()),
                EMPTY => return None,
                _ => idx = (idx + 1) & self.mask,
            }
        }
        None
    }

    pub fn into_map(self) -> AggMap {
        let mut result = AggMap::new();
        for slot in self.slots.into_vec() {
            let key = slot.key.load(Ordering::Relaxed);
            if key != EMPTY {
                result.insert(key, slot.into_aggregate());
            }
        }
        if self.min_key_used.into_inner() {
            result.insert(EMPTY, self.min_key.into_aggregate());
        }
        result
    }
}

pub fn run(records: &[Record], tuning: &Tuning) -> Result<AggMap, StrategyError> {
    let table = LockFreeTable::with_capacity(records.len());
    records
        .par_chunks(tuning.batch_size())
        .try_for_each(|batch| batch.iter().try_for_each(|record| table.upsert(record)))?;
    Ok(table.into_map())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let table = LockFreeTable::with_capacity(4);
        table.upsert(&Record::new(42, 10, 1)).unwrap();
        table.upsert(&Record::new(84, 12, 2)).unwrap();
        table.upsert(&Record::new(42, 24, 3)).unwrap();

        assert_eq!(table.get(42), Some(Aggregate::new(34, 4)));
        assert_eq!(table.get(84), Some(Aggregate::new(12, 2)));
        assert_eq!(table.get(7), None);
    }

    #[test]
    fn test_sentinel_key_is_stored() {
        let table = LockFreeTable::with_capacity(1);
        assert_eq!(table.get(i64::MIN), None);
        table.upsert(&Record::new(i64::MIN, 5, -5)).unwrap();
        assert_eq!(table.get(i64::MIN), Some(Aggregate::new(5, -5)));

        let map = table.into_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&i64::MIN], Aggregate::new(5, -5));
    }

    #[test]
    fn test_capacity_is_power_of_two() {
        assert_eq!(LockFreeTable::with_capacity(0).capacity(), 16);
        assert_eq!(LockFreeTable::with_capacity(100).capacity(), 256);
    }

    #[test]
    fn test_full_table_is_reported() {
        let table = LockFreeTable::with_capacity(0);
        for key in 0..16 {
            table.upsert(&Record::new(key, 1, 1)).unwrap();
        }
        // existing keys still land
        table.upsert(&Record::new(3, 1, 1)).unwrap();
        let err = table.upsert(&Record::new(16, 1, 1)).unwrap_err();
        assert!(matches!(err, StrategyError::TableFull { capacity: 16 }));
    }
}

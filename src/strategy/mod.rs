//! Interchangeable realizations of the grouped summation.
//!
//! Every strategy produces the same mapping as [`aggregate`]; the parallel
//! ones differ only in how rows reach the accumulators. They run on whatever
//! rayon pool is current when [`Strategy::run`] is called.

use std::fmt;
use std::hash::{Hash, Hasher};

use clap::ValueEnum;

use crate::aggregate::aggregate;
use crate::error::StrategyError;
use crate::record::{AggMap, GroupKey, Record};

mod global_lock;
mod implicit;
mod lock_free;
mod radix;
mod two_phase;

pub use lock_free::LockFreeTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Strategy {
    /// Single-threaded fold into one hash map
    Sequential,
    /// Parallel scan, every upsert behind one mutex
    GlobalLock,
    /// Thread-local maps, merged by a single thread
    TwoPhaseCentral,
    /// Thread-local maps, merged pairwise in parallel
    TwoPhaseTree,
    /// Thread-local maps split by key hash, partitions merged in parallel
    TwoPhaseRadix,
    /// Plain thread-local maps, split by key hash afterwards, partitions merged in parallel
    ThreePhaseRadix,
    /// Each partition task scans every row and keeps the keys hashing to it
    ImplicitRepartitioning,
    /// Thread-local maps, partitioned merge only once a map outgrows the threshold
    AdaptiveTwoPhase,
    /// One shared open-addressing table of atomic slots
    LockFree,
}

impl Strategy {
    pub fn run(self, records: &[Record], tuning: &Tuning) -> Result<AggMap, StrategyError> {
        match self {
            Strategy::Sequential => Ok(aggregate(records)),
            Strategy::GlobalLock => global_lock::run(records, tuning),
            Strategy::TwoPhaseCentral => Ok(two_phase::run_central(records, tuning)),
            Strategy::TwoPhaseTree => Ok(two_phase::run_tree(records, tuning)),
            Strategy::TwoPhaseRadix => Ok(radix::run(records, tuning)),
            Strategy::ThreePhaseRadix => Ok(radix::run_three_phase(records, tuning)),
            Strategy::ImplicitRepartitioning => Ok(implicit::run(records, tuning)),
            Strategy::AdaptiveTwoPhase => Ok(two_phase::run_adaptive(records, tuning)),
            Strategy::LockFree => lock_free::run(records, tuning),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Knobs shared by the parallel strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Rows handed to a task at a time.
    pub batch_size: usize,
    /// Radix partitions per worker thread.
    pub partition_ratio: usize,
    /// Local map size above which [`Strategy::AdaptiveTwoPhase`] switches to a
    /// partitioned merge.
    pub adaptation_threshold: usize,
}

impl Tuning {
    #[inline]
    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub(crate) fn partitions(&self) -> usize {
        rayon::current_num_threads().max(1) * self.partition_ratio.max(1)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            partition_ratio: 1,
            adaptation_threshold: 10_000,
        }
    }
}

#[inline]
pub(crate) fn hash_key(key: GroupKey) -> u64 {
    let mut hasher = ahash::AHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

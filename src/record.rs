use hashbrown::HashMap;

pub type GroupKey = i64;

/// Result mapping of one aggregation run.
pub type AggMap = HashMap<GroupKey, Aggregate>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Record {
    pub group_key: GroupKey,
    pub value1: i64,
    pub value2: i64,
}

impl Record {
    pub const fn new(group_key: GroupKey, value1: i64, value2: i64) -> Self {
        Self { group_key, value1, value2 }
    }
}

impl From<(i64, i64, i64)> for Record {
    fn from((group_key, value1, value2): (i64, i64, i64)) -> Self {
        Self::new(group_key, value1, value2)
    }
}

/// Running sums for one group key.
///
/// Additions wrap on overflow, so accumulation stays commutative and
/// associative and every strategy agrees with the sequential fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub sum1: i64,
    pub sum2: i64,
}

impl Aggregate {
    pub const fn new(sum1: i64, sum2: i64) -> Self {
        Self { sum1, sum2 }
    }

    #[inline]
    pub fn add(&mut self, record: &Record) {
        self.sum1 = self.sum1.wrapping_add(record.value1);
        self.sum2 = self.sum2.wrapping_add(record.value2);
    }

    #[inline]
    pub fn merge(&mut self, other: &Aggregate) {
        self.sum1 = self.sum1.wrapping_add(other.sum1);
        self.sum2 = self.sum2.wrapping_add(other.sum2);
    }
}

//! Timed, repeated execution of one strategy over an in-memory table.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::error::{BenchError, ValidationError};
use crate::record::{AggMap, Aggregate, GroupKey, Record};
use crate::strategy::{Strategy, Tuning};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub strategy: Strategy,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
    pub tuning: Tuning,
    /// Untimed warm-up runs.
    pub dryruns: usize,
    pub trials: usize,
    /// Check the last result against the sequential fold.
    pub validate: bool,
    pub spot_check: Vec<GroupKey>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sequential,
            threads: 1,
            tuning: Tuning::default(),
            dryruns: 0,
            trials: 1,
            validate: false,
            spot_check: Vec::new(),
        }
    }
}

impl BenchConfig {
    pub fn log(&self) {
        info!(
            strategy = %self.strategy,
            threads = self.threads,
            batch_size = self.tuning.batch_size,
            partition_ratio = self.tuning.partition_ratio,
            adaptation_threshold = self.tuning.adaptation_threshold,
            dryruns = self.dryruns,
            trials = self.trials,
            validate = self.validate,
            "benchmark config"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    pub run: usize,
    pub elapsed: Duration,
    pub groups: usize,
}

#[derive(Debug)]
pub struct BenchReport {
    pub strategy: Strategy,
    pub threads: usize,
    pub rows: usize,
    pub trials: Vec<Trial>,
    /// Mapping produced by the last trial.
    pub result: AggMap,
    pub spot_checks: Vec<(GroupKey, Option<Aggregate>)>,
}

impl BenchReport {
    pub fn mean(&self) -> Duration {
        if self.trials.is_empty() {
            return Duration::ZERO;
        }
        self.trials.iter().map(|t| t.elapsed).sum::<Duration>() / self.trials.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.trials.iter().map(|t| t.elapsed).min().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.trials.iter().map(|t| t.elapsed).max().unwrap_or_default()
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strategy: {} ({} threads)", self.strategy, self.threads)?;
        writeln!(f, "rows: {}", self.rows)?;
        writeln!(f, "groups: {}", self.result.len())?;
        write!(
            f,
            "aggregation time: mean {:?}, min {:?}, max {:?} over {} trials",
            self.mean(),
            self.min(),
            self.max(),
            self.trials.len()
        )?;
        for (key, agg) in &self.spot_checks {
            match agg {
                Some(agg) => write!(f, "\n{key} -> ({}, {})", agg.sum1, agg.sum2)?,
                None => write!(f, "\n{key} -> missing")?,
            }
        }
        Ok(())
    }
}

/// Runs `f` once and measures its wall-clock time.
pub fn timed<T, F: FnOnce() -> T>(f: F) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

pub fn run_benchmark(records: &[Record], config: &BenchConfig) -> Result<BenchReport, BenchError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    let threads = pool.current_num_threads();

    for run in 0..config.dryruns {
        let (result, elapsed) = timed(|| pool.install(|| config.strategy.run(records, &config.tuning)));
        let groups = result?.len();
        debug!(run, elapsed = ?elapsed, groups, "dry run finished");
    }

    let mut trials = Vec::with_capacity(config.trials.max(1));
    let mut result = AggMap::new();
    for run in 0..config.trials.max(1) {
        let (map, elapsed) = timed(|| pool.install(|| config.strategy.run(records, &config.tuning)));
        result = map?;
        info!(
            run,
            elapsed_ms = elapsed.as_secs_f64() * 1e3,
            groups = result.len(),
            "aggregation finished"
        );
        trials.push(Trial {
            run,
            elapsed,
            groups: result.len(),
        });
    }

    if config.validate {
        let (expected, elapsed) = timed(|| aggregate(records));
        debug!(elapsed = ?elapsed, "reference aggregation finished");
        validate(&expected, &result)?;
        info!(groups = expected.len(), "result matches sequential reference");
    }

    let spot_checks = config
        .spot_check
        .iter()
        .map(|key| (*key, result.get(key).copied()))
        .collect();

    Ok(BenchReport {
        strategy: config.strategy,
        threads,
        rows: records.len(),
        trials,
        result,
        spot_checks,
    })
}

/// Compares `actual` with `expected`, reporting the smallest offending key.
pub fn validate(expected: &AggMap, actual: &AggMap) -> Result<(), ValidationError> {
    let mut keys: Vec<_> = expected.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        match actual.get(&key) {
            None => return Err(ValidationError::Missing { key }),
            Some(got) if *got != expected[&key] => {
                return Err(ValidationError::Mismatch {
                    key,
                    expected: expected[&key],
                    actual: *got,
                })
            }
            Some(_) => {}
        }
    }
    match actual.keys().filter(|key| !expected.contains_key(*key)).min() {
        Some(&key) => Err(ValidationError::Extra { key }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        vec![
            Record::new(1, 2, 1),
            Record::new(2, 4, 4),
            Record::new(1, 6, 3),
        ]
    }

    #[test]
    fn test_run_benchmark_reports_trials_and_spot_checks() {
        let config = BenchConfig {
            strategy: Strategy::TwoPhaseTree,
            threads: 2,
            dryruns: 1,
            trials: 3,
            validate: true,
            spot_check: vec![1, 99],
            ..BenchConfig::default()
        };
        let report = run_benchmark(&sample(), &config).unwrap();
        assert_eq!(report.threads, 2);
        assert_eq!(report.rows, 3);
        assert_eq!(report.trials.len(), 3);
        assert!(report.trials.iter().all(|t| t.groups == 2));
        assert_eq!(report.result, aggregate(&sample()));
        assert_eq!(
            report.spot_checks,
            vec![(1, Some(Aggregate::new(8, 4))), (99, None)]
        );
        assert!(report.min() <= report.mean() && report.mean() <= report.max());

        let text = report.to_string();
        assert!(text.contains("groups: 2"), "{text}");
        assert!(text.contains("1 -> (8, 4)"), "{text}");
        assert!(text.contains("99 -> missing"), "{text}");
    }

    #[test]
    fn test_zero_trials_still_runs_once() {
        let config = BenchConfig {
            trials: 0,
            ..BenchConfig::default()
        };
        let report = run_benchmark(&sample(), &config).unwrap();
        assert_eq!(report.trials.len(), 1);
    }

    #[test]
    fn test_empty_report_durations() {
        let report = BenchReport {
            strategy: Strategy::Sequential,
            threads: 1,
            rows: 0,
            trials: Vec::new(),
            result: AggMap::new(),
            spot_checks: Vec::new(),
        };
        assert_eq!(report.mean(), Duration::ZERO);
        assert_eq!(report.max(), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        let expected = aggregate(&sample());
        assert_eq!(validate(&expected, &expected.clone()), Ok(()));

        let mut missing = expected.clone();
        missing.remove(&2);
        assert_eq!(validate(&expected, &missing), Err(ValidationError::Missing { key: 2 }));

        let mut extra = expected.clone();
        extra.insert(5, Aggregate::default());
        extra.insert(3, Aggregate::default());
        assert_eq!(validate(&expected, &extra), Err(ValidationError::Extra { key: 3 }));

        let mut wrong = expected.clone();
        wrong.insert(1, Aggregate::new(8, 5));
        assert_eq!(
            validate(&expected, &wrong),
            Err(ValidationError::Mismatch {
                key: 1,
                expected: Aggregate::new(8, 4),
                actual: Aggregate::new(8, 5),
            })
        );
    }

    #[test]
    fn test_timed_returns_value() {
        let (value, elapsed) = timed(|| 40 + 2);
        assert_eq!(value, 42);
        assert!(elapsed < Duration::from_secs(5));
    }
}

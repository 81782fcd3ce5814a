//! Error types for loading, generating and aggregating records.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::{Aggregate, GroupKey};

/// Failure while reading records from a CSV source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("{path}: missing header row")]
    MissingHeader { path: PathBuf },

    #[error("{path}: no column named `{column}`")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("number of groups must be positive")]
    NoGroups,

    #[error("number of groups ({groups}) cannot be greater than number of rows ({rows})")]
    TooManyGroups { groups: usize, rows: usize },

    #[error("invalid distribution parameters: {0}")]
    Distribution(String),
}

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("lock-free table is full ({capacity} slots)")]
    TableFull { capacity: usize },

    #[error("aggregation lock poisoned")]
    Poisoned,
}

/// First difference found between a result and the reference.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("key {key} missing from result")]
    Missing { key: GroupKey },

    #[error("unexpected key {key} in result")]
    Extra { key: GroupKey },

    #[error("key {key}: expected {expected:?}, got {actual:?}")]
    Mismatch {
        key: GroupKey,
        expected: Aggregate,
        actual: Aggregate,
    },
}

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

//! Group rows by an integer key and sum two integer columns per group.
//!
//! The core is [`aggregate()`], a single pass over an in-memory slice into one
//! hash map. [`Strategy`] offers parallel realizations of the same contract,
//! and [`bench`] times them over records loaded by [`source`] or produced by
//! [`generate`].

pub mod aggregate;
pub mod bench;
pub mod error;
pub mod generate;
pub mod output;
pub mod record;
pub mod source;
pub mod strategy;

pub use aggregate::{accumulate, aggregate, aggregate_iter, merge};
pub use record::{AggMap, Aggregate, GroupKey, Record};
pub use strategy::{Strategy, Tuning};

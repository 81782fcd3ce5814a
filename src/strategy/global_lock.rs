use std::sync::Mutex;

use rayon::prelude::*;

use super::Tuning;
use crate::aggregate::accumulate;
use crate::error::StrategyError;
use crate::record::{AggMap, Record};

pub fn run(records: &[Record], tuning: &Tuning) -> Result<AggMap, StrategyError> {
    let result = Mutex::new(AggMap::new());
    records
        .par_chunks(tuning.batch_size())
        .try_for_each(|batch| -> Result<(), StrategyError> {
            for record in batch {
                // lock per row, so workers contend on every upsert
                let mut map = result.lock().map_err(|_| StrategyError::Poisoned)?;
                accumulate(&mut map, record);
            }
            Ok(())
        })?;
    result.into_inner().map_err(|_| StrategyError::Poisoned)
}

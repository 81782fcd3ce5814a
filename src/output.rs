//! Writing result mappings as CSV.

use std::io::Write;
use std::path::Path;

use csv::Writer;
use tracing::debug;

use crate::record::AggMap;

/// Writes `key,sum1,sum2` rows, ordered by key, to a new file at `path`.
pub fn write_result(path: impl AsRef<Path>, result: &AggMap) -> csv::Result<()> {
    let path = path.as_ref();
    debug!(path = %path.display(), groups = result.len(), "writing result");
    write_result_to(Writer::from_path(path)?, result)
}

pub fn write_result_to<W: Write>(mut writer: Writer<W>, result: &AggMap) -> csv::Result<()> {
    let mut keys: Vec<_> = result.keys().copied().collect();
    keys.sort_unstable();

    writer.write_record(["key", "sum1", "sum2"])?;
    for key in keys {
        let agg = &result[&key];
        writer.write_record([key.to_string(), agg.sum1.to_string(), agg.sum2.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

//! Loading records from CSV files.
//!
//! Plain files are memory-mapped and split into one newline-aligned chunk per
//! rayon thread; chunks are parsed in parallel and concatenated in file order.
//! Files ending in `.gz` are decompressed and streamed through the `csv` reader.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use rayon::prelude::*;
use tracing::debug;

use crate::error::SourceError;
use crate::record::Record;

/// Header names of the columns holding the group key and the two values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub key: String,
    pub value1: String,
    pub value2: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            key: "key".to_string(),
            value1: "value1".to_string(),
            value2: "value2".to_string(),
        }
    }
}

impl Columns {
    fn resolve(&self, path: &Path, names: &[&str]) -> Result<ColumnIndex, SourceError> {
        let find = |column: &str| {
            names
                .iter()
                .position(|name| *name == column)
                .ok_or_else(|| SourceError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };
        let key = find(&self.key)?;
        let value1 = find(&self.value1)?;
        let value2 = find(&self.value2)?;
        Ok(ColumnIndex {
            key,
            value1,
            value2,
            fields: names.len(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    key: usize,
    value1: usize,
    value2: usize,
    /// Field count every row must match.
    fields: usize,
}

pub fn load_records(path: impl AsRef<Path>, columns: &Columns) -> Result<Vec<Record>, SourceError> {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext == "gz") {
        load_gzip(path, columns)
    } else {
        load_mapped(path, columns)
    }
}

/// Both paths read rows through the same `csv` settings.
fn reader_builder(has_headers: bool) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .trim(csv::Trim::All)
        .flexible(true);
    builder
}

fn resolve_headers(
    path: &Path,
    headers: &csv::StringRecord,
    columns: &Columns,
) -> Result<ColumnIndex, SourceError> {
    if headers.iter().all(str::is_empty) {
        return Err(SourceError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    let names: Vec<&str> = headers.iter().collect();
    columns.resolve(path, &names)
}

fn load_mapped(path: &Path, columns: &Columns) -> Result<Vec<Record>, SourceError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(SourceError::MissingHeader {
            path: path.to_path_buf(),
        });
    }
    // SAFETY: the file is only read, and must not be truncated while mapped.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    let data: &[u8] = &mmap;

    let mut header_reader = reader_builder(true).from_reader(data);
    let headers = header_reader.headers()?.clone();
    let index = resolve_headers(path, &headers, columns)?;

    let mut body_start = (header_reader.position().byte() as usize).min(data.len());
    // a CRLF header may stop short of its '\n'
    if data.get(body_start) == Some(&b'\n') {
        body_start += 1;
    }
    let bounds = chunk_bounds(data, body_start, rayon::current_num_threads());
    debug!(chunks = bounds.len().saturating_sub(1), bytes = data.len(), "parsing mapped file");

    // per-chunk results keep file order, so the first bad line wins
    let chunks: Vec<Result<Vec<Record>, (u64, String)>> = bounds
        .par_windows(2)
        .map(|w| parse_chunk(data, w[0], w[1], &index))
        .collect();
    let chunks = chunks
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|(line, reason)| SourceError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        })?;
    Ok(chunks.concat())
}

fn load_gzip(path: &Path, columns: &Columns) -> Result<Vec<Record>, SourceError> {
    let file = File::open(path)?;
    let mut reader = reader_builder(true).from_reader(GzDecoder::new(BufReader::new(file)));

    let headers = reader.headers()?.clone();
    let index = resolve_headers(path, &headers, columns)?;

    let mut records = Vec::new();
    let mut row = csv::ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let record = parse_row(&row, &index).map_err(|reason| SourceError::Malformed {
            path: path.to_path_buf(),
            line: row.position().map_or(0, csv::Position::line),
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Chunk boundaries over `data[start..]`, each one the first byte of a line.
///
/// Boundaries fall on raw newlines, so mapped files cannot carry line breaks
/// inside quoted fields.
fn chunk_bounds(data: &[u8], start: usize, parallel_count: usize) -> Vec<usize> {
    let parallel_count = parallel_count.max(1);
    let chunk_size = (data.len() - start) / parallel_count;
    let mut bounds = vec![start];
    let mut last = start;
    for pos in 1..parallel_count {
        let bound = optimize_position(data, start + pos * chunk_size);
        if bound > last {
            bounds.push(bound);
            last = bound;
        }
    }
    if last < data.len() {
        bounds.push(data.len());
    }
    bounds
}

#[inline]
fn optimize_position(data: &[u8], position: usize) -> usize {
    data[position..]
        .iter()
        .position(|&x| x == b'\n')
        .map(|x| position + x + 1)
        .unwrap_or_else(|| data.len())
}

/// Parses the rows of `data[start..end]`; errors carry the file line number.
fn parse_chunk(
    data: &[u8],
    start: usize,
    end: usize,
    index: &ColumnIndex,
) -> Result<Vec<Record>, (u64, String)> {
    let to_file_line = |line: u64| line_of(data, start) + line.saturating_sub(1);

    let mut reader = reader_builder(false).from_reader(&data[start..end]);
    let mut records = Vec::new();
    let mut row = csv::ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut row) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                let line = err.position().map_or(1, csv::Position::line);
                return Err((to_file_line(line), err.to_string()));
            }
        }
        let record = parse_row(&row, index).map_err(|reason| {
            let line = row.position().map_or(1, csv::Position::line);
            (to_file_line(line), reason)
        })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_row(row: &csv::ByteRecord, index: &ColumnIndex) -> Result<Record, String> {
    if row.len() != index.fields {
        return Err(format!(
            "expected {} fields, found {}",
            index.fields,
            row.len()
        ));
    }
    let field = |i: usize| parse_int(row.get(i).unwrap_or_default());
    Ok(Record::new(
        field(index.key)?,
        field(index.value1)?,
        field(index.value2)?,
    ))
}

fn parse_int(field: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| format!("invalid integer `{}`", String::from_utf8_lossy(field)))
}

fn line_of(data: &[u8], offset: usize) -> u64 {
    data[..offset].iter().filter(|&&x| x == b'\n').count() as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_plain_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,value1,value2\n1,2,1\n2,4,4\n1,6,3\n");
        let records = load_records(&path, &Columns::default()).unwrap();
        assert_eq!(
            records,
            vec![Record::new(1, 2, 1), Record::new(2, 4, 4), Record::new(1, 6, 3)]
        );
    }

    #[test]
    fn test_load_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,value1,value2\n");
        assert!(load_records(&path, &Columns::default()).unwrap().is_empty());
    }

    #[test]
    fn test_load_crlf_blank_lines_and_no_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,value1,value2\r\n-1,2,3\r\n\r\n4, -5 ,6");
        let records = load_records(&path, &Columns::default()).unwrap();
        assert_eq!(records, vec![Record::new(-1, 2, 3), Record::new(4, -5, 6)]);
    }

    #[test]
    fn test_named_columns_are_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "lineitem.csv",
            "l_partkey,l_comment,l_orderkey,l_suppkey\n10,x,1,20\n30,y,1,40\n",
        );
        let columns = Columns {
            key: "l_orderkey".to_string(),
            value1: "l_partkey".to_string(),
            value2: "l_suppkey".to_string(),
        };
        let records = load_records(&path, &columns).unwrap();
        assert_eq!(records, vec![Record::new(1, 10, 20), Record::new(1, 30, 40)]);
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,val\n1,2\n");
        let err = load_records(&path, &Columns::default()).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { ref column, .. } if column == "value1"));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "");
        let err = load_records(&path, &Columns::default()).unwrap_err();
        assert!(matches!(err, SourceError::MissingHeader { .. }));
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,value1,value2\n1,2,3\n4,five,6\n");
        let err = load_records(&path, &Columns::default()).unwrap_err();
        match err {
            SourceError::Malformed { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("five"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.csv", "key,value1,value2\n1,2\n");
        let err = load_records(&path, &Columns::default()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_load_gzip_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gzip(&dir, "rows.csv.gz", "value2,key,value1\n1,1,2\n4,2,4\n3,1,6\n");

        let records = load_records(&path, &Columns::default()).unwrap();
        assert_eq!(
            records,
            vec![Record::new(1, 2, 1), Record::new(2, 4, 4), Record::new(1, 6, 3)]
        );
    }

    fn write_gzip(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    fn load_both(contents: &str) -> (Result<Vec<Record>, SourceError>, Result<Vec<Record>, SourceError>) {
        let dir = tempfile::tempdir().unwrap();
        let plain = write_file(&dir, "table.csv", contents);
        let gzip = write_gzip(&dir, "table.csv.gz", contents);
        (
            load_records(&plain, &Columns::default()),
            load_records(&gzip, &Columns::default()),
        )
    }

    #[test]
    fn test_quoted_fields_load_the_same_plain_and_gzipped() {
        let contents = "\"key\",\"value1\",\"value2\"\r\n\"1\",\"2\",\"3\"\r\n\"1\", 4 ,\"-5\"\r\n";
        let (plain, gzip) = load_both(contents);
        let plain = plain.unwrap();
        assert_eq!(plain, vec![Record::new(1, 2, 3), Record::new(1, 4, -5)]);
        assert_eq!(plain, gzip.unwrap());
    }

    #[test]
    fn test_extra_field_is_rejected_plain_and_gzipped() {
        let (plain, gzip) = load_both("key,value1,value2\n1,2,3\n1,2,3,4\n");
        for err in [plain.unwrap_err(), gzip.unwrap_err()] {
            match err {
                SourceError::Malformed { line, reason, .. } => {
                    assert_eq!(line, 3);
                    assert_eq!(reason, "expected 3 fields, found 4");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_first_bad_line_is_reported_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = String::from("key,value1,value2\n");
        for i in 0..4_000 {
            if i == 1_500 || i == 3_500 {
                contents.push_str("x,1,1\n");
            } else {
                contents.push_str(&format!("{i},1,1\n"));
            }
        }
        let path = write_file(&dir, "rows.csv", &contents);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(8).build().unwrap();
        for _ in 0..10 {
            let err = pool
                .install(|| load_records(&path, &Columns::default()))
                .unwrap_err();
            assert!(matches!(err, SourceError::Malformed { line: 1_502, .. }), "{err}");
        }
    }

    #[test]
    fn test_chunk_bounds_align_to_lines() {
        let data = b"h\n11\n22\n33\n44\n55\n";
        let bounds = chunk_bounds(data, 2, 4);
        assert_eq!(bounds.first(), Some(&2));
        assert_eq!(bounds.last(), Some(&data.len()));
        for bound in &bounds[1..bounds.len() - 1] {
            assert_eq!(data[bound - 1], b'\n');
        }
        assert!(bounds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_chunk_bounds_empty_body() {
        let data = b"h\n";
        assert_eq!(chunk_bounds(data, 2, 8), vec![2]);
    }

    #[test]
    fn test_parallel_parse_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = String::from("key,value1,value2\n");
        for i in 0..10_000 {
            contents.push_str(&format!("{},{},{}\n", i % 13, i, -i));
        }
        let path = write_file(&dir, "rows.csv", &contents);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let records = pool
            .install(|| load_records(&path, &Columns::default()))
            .unwrap();
        assert_eq!(records.len(), 10_000);
        for (i, record) in records.iter().enumerate() {
            let i = i as i64;
            assert_eq!(*record, Record::new(i % 13, i, -i));
        }
    }
}

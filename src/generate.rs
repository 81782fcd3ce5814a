//! Synthetic datasets for the benchmark.
//!
//! Every group receives one row up front so the number of distinct keys is
//! exactly `num_groups`; the remaining rows draw their key from the chosen
//! distribution. Values are uniform over `[0, i16::MAX]`.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::distr::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution as _, Exp, Normal};
use tracing::info;

use crate::error::GenerateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Distribution {
    Uniform,
    Normal,
    Exponential,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    pub distribution: Distribution,
    pub num_rows: usize,
    pub num_groups: usize,
    pub seed: Option<u64>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            distribution: Distribution::Uniform,
            num_rows: 1_000_000,
            num_groups: 1_000,
            seed: None,
        }
    }
}

impl GenerateConfig {
    pub fn default_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "data/{}-{}-{}.csv.gz",
            self.distribution, self.num_rows, self.num_groups
        ))
    }

    fn check(&self) -> Result<(), GenerateError> {
        if self.num_groups == 0 {
            return Err(GenerateError::NoGroups);
        }
        if self.num_groups > self.num_rows {
            return Err(GenerateError::TooManyGroups {
                groups: self.num_groups,
                rows: self.num_rows,
            });
        }
        Ok(())
    }
}

enum KeySampler {
    Uniform(Uniform<i64>),
    Normal(Normal<f64>),
    Exponential(Exp<f64>),
}

impl KeySampler {
    fn new(distribution: Distribution, groups: usize) -> Result<Self, GenerateError> {
        let g = groups as f64;
        let sampler = match distribution {
            Distribution::Uniform => Self::Uniform(
                Uniform::new(0, groups as i64)
                    .map_err(|e| GenerateError::Distribution(e.to_string()))?,
            ),
            Distribution::Normal => Self::Normal(
                Normal::new((g - 1.0) / 2.0, g / 6.0)
                    .map_err(|e| GenerateError::Distribution(e.to_string()))?,
            ),
            Distribution::Exponential => Self::Exponential(
                Exp::new(3.0 / g).map_err(|e| GenerateError::Distribution(e.to_string()))?,
            ),
        };
        Ok(sampler)
    }

    fn sample(&self, rng: &mut StdRng, max_key: i64) -> i64 {
        match self {
            Self::Uniform(d) => d.sample(rng),
            Self::Normal(d) => (d.sample(rng).round() as i64).clamp(0, max_key),
            Self::Exponential(d) => (d.sample(rng) as i64).min(max_key),
        }
    }
}

/// Writes the dataset as CSV to `writer` and hands the writer back.
pub fn generate<W: Write>(config: &GenerateConfig, writer: W) -> Result<W, GenerateError> {
    config.check()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let keys = KeySampler::new(config.distribution, config.num_groups)?;
    let values = Uniform::new_inclusive(0_i64, i16::MAX as i64)
        .map_err(|e| GenerateError::Distribution(e.to_string()))?;
    let max_key = config.num_groups as i64 - 1;

    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["key", "value1", "value2"])?;
    for key in 0..config.num_groups as i64 {
        write_row(&mut out, key, values.sample(&mut rng), values.sample(&mut rng))?;
    }
    for _ in config.num_groups..config.num_rows {
        let key = keys.sample(&mut rng, max_key);
        write_row(&mut out, key, values.sample(&mut rng), values.sample(&mut rng))?;
    }
    out.into_inner().map_err(|e| GenerateError::Io(e.into_error()))
}

#[inline]
fn write_row<W: Write>(
    out: &mut csv::Writer<W>,
    key: i64,
    value1: i64,
    value2: i64,
) -> csv::Result<()> {
    out.write_record([key.to_string(), value1.to_string(), value2.to_string()])
}

/// Writes the dataset to `path`, gzip-compressed when the path ends in `.gz`.
pub fn generate_file(config: &GenerateConfig, path: impl AsRef<Path>) -> Result<(), GenerateError> {
    let path = path.as_ref();
    info!(
        distribution = %config.distribution,
        rows = config.num_rows,
        groups = config.num_groups,
        path = %path.display(),
        "generating dataset"
    );
    config.check()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = BufWriter::new(File::create(path)?);
    let mut file = if path.extension().is_some_and(|ext| ext == "gz") {
        generate(config, GzEncoder::new(file, Compression::default()))?.finish()?
    } else {
        generate(config, file)?
    };
    file.flush()?;
    Ok(())
}

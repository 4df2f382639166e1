//! Run configuration: defaults, TOML file, environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use core_bench::{BenchmarkRequest, RunOptions};
use core_crypto::Cipher;
use core_directio::{BlockSize, Channel, IoMode};
use serde::{Deserialize, Deserializer, Serialize};

const MIB: usize = 1024 * 1024;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Payload sizes in bytes, benchmarked in order
    #[serde(deserialize_with = "de_sizes")]
    pub sizes: Vec<usize>,
    /// Worker ceiling; defaults to available hardware parallelism
    pub workers: Option<usize>,
    pub block_size: usize,
    pub cipher: Cipher,
    pub io_mode: IoMode,
    pub dir: PathBuf,
    pub file: String,
    pub seed: Option<u64>,
    pub verify: bool,
    pub format: OutputFormat,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            sizes: vec![MIB, 10 * MIB, 100 * MIB, 1000 * MIB],
            workers: None,
            block_size: BlockSize::DEFAULT.get(),
            cipher: Cipher::default(),
            io_mode: IoMode::default(),
            dir: PathBuf::from("."),
            file: String::from("encryption_test.txt"),
            seed: None,
            verify: true,
            format: OutputFormat::default(),
        }
    }
}

impl BenchConfig {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).with_context(|| format!("read {:?}", p))?;
                Self::from_toml_str(&text).with_context(|| format!("parse {:?}", p))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Env overrides: SEAL_BENCH_SIZES, SEAL_BENCH_WORKERS, SEAL_BENCH_BLOCK_SIZE,
    /// SEAL_BENCH_CIPHER, SEAL_BENCH_IO_MODE, SEAL_BENCH_DIR
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|k| std::env::var(k).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SEAL_BENCH_SIZES") {
            self.sizes = parse_size_list(&v).context("SEAL_BENCH_SIZES")?;
        }
        if let Some(v) = lookup("SEAL_BENCH_WORKERS") {
            self.workers = Some(v.trim().parse::<usize>().context("SEAL_BENCH_WORKERS")?);
        }
        if let Some(v) = lookup("SEAL_BENCH_BLOCK_SIZE") {
            self.block_size = parse_size(&v).map_err(|e| anyhow!(e)).context("SEAL_BENCH_BLOCK_SIZE")?;
        }
        if let Some(v) = lookup("SEAL_BENCH_CIPHER") {
            self.cipher = v.parse::<Cipher>().map_err(|e: String| anyhow!(e)).context("SEAL_BENCH_CIPHER")?;
        }
        if let Some(v) = lookup("SEAL_BENCH_IO_MODE") {
            self.io_mode = v.parse::<IoMode>().map_err(|e: String| anyhow!(e)).context("SEAL_BENCH_IO_MODE")?;
        }
        if let Some(v) = lookup("SEAL_BENCH_DIR") {
            self.dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() {
            bail!("at least one payload size is required");
        }
        if self.sizes.contains(&0) {
            bail!("payload sizes must be positive");
        }
        if self.workers == Some(0) {
            bail!("workers must be at least 1");
        }
        if self.block_size < 512 || !self.block_size.is_power_of_two() {
            bail!("block size {} must be a power of two >= 512", self.block_size);
        }
        if self.file.is_empty() || self.file.contains(|c: char| c == '/' || c == '\\') {
            bail!("file must be a plain file name, got {:?}", self.file);
        }
        Ok(())
    }

    pub fn request(&self) -> Result<BenchmarkRequest> {
        Ok(BenchmarkRequest::new(self.sizes.clone(), self.workers)?)
    }

    pub fn run_options(&self) -> Result<RunOptions> {
        let block_size = BlockSize::new(self.block_size)?;
        Ok(RunOptions {
            dir: self.dir.clone(),
            file_name: self.file.clone(),
            channel: Channel::new(self.cipher, block_size, self.io_mode),
            verify: self.verify,
            payload_seed: self.seed,
        })
    }
}

/// Parse `4096`, `64K`, `10MiB`, `1G` (binary multiples, case-insensitive).
pub fn parse_size(s: &str) -> Result<usize, String> {
    let t = s.trim();
    let split = t.find(|c: char| !c.is_ascii_digit()).unwrap_or(t.len());
    let (num, unit) = t.split_at(split);
    if num.is_empty() {
        return Err(format!("invalid size '{s}'"));
    }
    let n: usize = num.parse().map_err(|_| format!("invalid size '{s}'"))?;
    let mult = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => 1024 * MIB,
        other => return Err(format!("unknown size unit '{other}' in '{s}'")),
    };
    n.checked_mul(mult).ok_or_else(|| format!("size '{s}' overflows"))
}

pub fn parse_size_list(s: &str) -> Result<Vec<usize>> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(|p| parse_size(p).map_err(|e| anyhow!(e)))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

fn de_sizes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<usize>, D::Error> {
    Vec::<SizeValue>::deserialize(d)?
        .into_iter()
        .map(|v| match v {
            SizeValue::Bytes(n) => usize::try_from(n).map_err(serde::de::Error::custom),
            SizeValue::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
        })
        .collect()
}

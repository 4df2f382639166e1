//! Per-size driver: canonical write, parallel write/read phases, latency probe.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use core_crypto::{Cipher, SessionKey};
use core_directio::Channel;
use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::latency::probe_latency;
use crate::parallel::{benchmark_read, benchmark_write};
use crate::scratch::{ScratchFile, ScratchFiles};
use crate::split::{split, worker_count, Chunk};
use crate::{Error, Result};

const MIB: f64 = 1024.0 * 1024.0;

/// Logical CPUs available to this process, at least 1.
pub fn hardware_parallelism() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Bytes per second expressed in MiB/s. Zero elapsed time yields 0.0.
pub fn throughput_mbps(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / secs / MIB
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRequest {
    sizes: Vec<usize>,
    max_workers: usize,
}

impl BenchmarkRequest {
    /// `max_workers` defaults to [`hardware_parallelism`].
    pub fn new(sizes: Vec<usize>, max_workers: Option<usize>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(Error::InvalidRequest("no payload sizes requested".into()));
        }
        if let Some(pos) = sizes.iter().position(|&s| s == 0) {
            return Err(Error::InvalidRequest(format!("size #{} is zero", pos + 1)));
        }
        let max_workers = max_workers.unwrap_or_else(hardware_parallelism);
        if max_workers == 0 {
            return Err(Error::InvalidRequest("worker ceiling must be at least 1".into()));
        }
        Ok(Self { sizes, max_workers })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory holding the canonical file and worker scratch files.
    pub dir: PathBuf,
    pub file_name: String,
    pub channel: Channel,
    /// Compare the read-back plaintext with the payload.
    pub verify: bool,
    /// Reproducible payloads; size `i` uses `seed + i`.
    pub payload_seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_name: String::from("encryption_test.txt"),
            channel: Channel::default(),
            verify: true,
            payload_seed: None,
        }
    }
}

impl RunOptions {
    pub fn canonical_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub size: usize,
    pub workers: usize,
    pub total_write: Duration,
    pub total_read: Duration,
    pub write_span: Duration,
    pub read_span: Duration,
    pub latency: Duration,
    pub write_mbps: f64,
    pub read_mbps: f64,
    pub verified: bool,
}

impl BenchmarkResult {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_micros() as f64 / 1000.0
    }
}

#[derive(Debug)]
pub struct SizeFailure {
    pub size: usize,
    pub error: Error,
}

/// Outcome of a whole run. Failed sizes never appear in `results`.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<BenchmarkResult>,
    pub failures: Vec<SizeFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Orchestrator {
    opts: RunOptions,
}

impl Orchestrator {
    pub fn new(opts: RunOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// Benchmark every requested size in order with a fresh random key each.
    pub fn run(&self, req: &BenchmarkRequest) -> RunReport {
        self.run_with_keys(req, SessionKey::generate)
    }

    /// Like [`Orchestrator::run`] but keys come from `next_key`, called once per size.
    pub fn run_with_keys<F>(&self, req: &BenchmarkRequest, mut next_key: F) -> RunReport
    where
        F: FnMut(Cipher) -> std::result::Result<SessionKey, core_crypto::Error>,
    {
        let mut report = RunReport::default();
        for (iteration, &size) in req.sizes().iter().enumerate() {
            let outcome = next_key(self.opts.channel.cipher)
                .map_err(Error::Key)
                .and_then(|key| self.run_size(iteration, size, req.max_workers(), &key));
            match outcome {
                Ok(result) => {
                    log::info!(
                        "orchestrator: size={} workers={} write={:.2}MB/s read={:.2}MB/s latency={:.2}ms",
                        result.size,
                        result.workers,
                        result.write_mbps,
                        result.read_mbps,
                        result.latency_ms()
                    );
                    report.results.push(result);
                }
                Err(error) => {
                    log::warn!("orchestrator: size={} failed ({}): {}", size, error.type_name(), error);
                    let abort = error.aborts_run();
                    report.failures.push(SizeFailure { size, error });
                    if abort {
                        log::error!("orchestrator: aborting run after size={}", size);
                        break;
                    }
                }
            }
        }
        report
    }

    /// One size iteration. Every file it creates is gone when it returns.
    pub fn run_size(&self, iteration: usize, size: usize, max_workers: usize, key: &SessionKey) -> Result<BenchmarkResult> {
        let channel = &self.opts.channel;
        let payload = self.payload(iteration, size);
        let canonical = ScratchFile::new(self.opts.canonical_path());

        // Baseline file; a failure here skips the size
        channel.write_once(&payload, key, canonical.path()).map_err(Error::Canonical)?;

        let workers = worker_count(payload.len(), max_workers);
        let chunks = split(&payload, workers);
        log::debug!("orchestrator: size={} split into {} chunks", size, chunks.len());

        let scratch = ScratchFiles::new(&self.opts.dir, &self.opts.file_name, iteration, chunks.len());
        let write = benchmark_write(channel, &chunks, key, &scratch)?;
        let read = benchmark_read(channel, key, &scratch)?;
        drop(scratch);

        if self.opts.verify {
            verify_read_back(&chunks, &read.plaintexts)?;
        }

        let latency = probe_latency(channel, &payload, key, canonical.path()).map_err(Error::Latency)?;

        Ok(BenchmarkResult {
            size,
            workers: chunks.len(),
            total_write: write.total,
            total_read: read.totals.total,
            write_span: write.span,
            read_span: read.totals.span,
            latency,
            write_mbps: throughput_mbps(size, write.total),
            read_mbps: throughput_mbps(size, read.totals.total),
            verified: self.opts.verify,
        })
    }

    fn payload(&self, iteration: usize, size: usize) -> Vec<u8> {
        let mut data = vec![0u8; size];
        match self.opts.payload_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(iteration as u64)).fill_bytes(&mut data),
            None => rand::thread_rng().fill_bytes(&mut data),
        }
        data
    }
}

fn verify_read_back(chunks: &[Chunk<'_>], plaintexts: &[Vec<u8>]) -> Result<()> {
    if chunks.len() != plaintexts.len() {
        return Err(Error::Mismatch(format!("{} chunks but {} plaintexts", chunks.len(), plaintexts.len())));
    }
    for (worker, (chunk, pt)) in chunks.iter().zip(plaintexts).enumerate() {
        if *chunk != pt.as_slice() {
            return Err(Error::Mismatch(format!(
                "worker {} read back {} bytes, expected {}",
                worker,
                pt.len(),
                chunk.len()
            )));
        }
    }
    Ok(())
}

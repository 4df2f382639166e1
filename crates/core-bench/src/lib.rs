//! Concurrent encrypted direct-I/O benchmark pipeline.
//!
//! A payload is split into per-worker chunks, each chunk is sealed and written
//! to its own block-aligned scratch file by a dedicated thread, then read back
//! and authenticated the same way. Per-worker durations are summed into
//! throughput figures; a separate sequential round trip gives latency.

use core_directio as directio;

pub mod latency;
pub mod orchestrator;
pub mod parallel;
pub mod scratch;
pub mod split;

pub use orchestrator::{
    hardware_parallelism, throughput_mbps, BenchmarkRequest, BenchmarkResult, Orchestrator, RunOptions, RunReport,
    SizeFailure,
};
pub use parallel::{benchmark_read, benchmark_write, PhaseTotals, ReadOutcome, ReadPhase, WriteOutcome};
pub use scratch::{ScratchFile, ScratchFiles};
pub use split::{split, worker_count, Chunk};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("session key generation failed: {0}")]
    Key(#[source] core_crypto::Error),
    #[error("canonical write failed: {0}")]
    Canonical(#[source] directio::Error),
    #[error("{phase} worker {worker} failed: {source}")]
    Worker {
        phase: &'static str,
        worker: usize,
        #[source]
        source: directio::Error,
    },
    #[error("{phase} phase expected {expected} outcomes, received {received}")]
    MissingOutcomes { phase: &'static str, expected: usize, received: usize },
    #[error("latency probe failed: {0}")]
    Latency(#[source] directio::Error),
    #[error("read-back mismatch: {0}")]
    Mismatch(String),
}

impl Error {
    /// Get type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::Key(_) => "key_generation",
            Error::Canonical(_) => "canonical_write",
            Error::Worker { .. } => "worker",
            Error::MissingOutcomes { .. } => "missing_outcomes",
            Error::Latency(_) => "latency",
            Error::Mismatch(_) => "mismatch",
        }
    }

    /// The underlying channel error, if any.
    pub fn channel_error(&self) -> Option<&directio::Error> {
        match self {
            Error::Canonical(e) | Error::Latency(e) | Error::Worker { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Cipher setup or key-size failure anywhere in the iteration.
    pub fn is_crypto(&self) -> bool {
        matches!(self, Error::Key(_)) || matches!(self.channel_error(), Some(directio::Error::Crypto(_)))
    }

    /// Errors after which later sizes cannot succeed either.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Error::Key(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Fan-out/fan-in of sealed writes and reads across worker threads.
//!
//! Each worker owns one chunk and one scratch file, so the I/O bodies run
//! without any lock. The only shared state is the bounded result channel;
//! every worker sends exactly one outcome on every path.

use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use core_crypto::SessionKey;
use core_directio::{self as directio, Channel, ReadReport, WriteReport};

use crate::scratch::{discard, ScratchFiles};
use crate::split::Chunk;
use crate::{Error, Result};

/// Result record produced by exactly one worker.
#[derive(Debug)]
pub struct Outcome<T> {
    pub worker: usize,
    pub result: directio::Result<T>,
}

pub type WriteOutcome = Outcome<WriteReport>;
pub type ReadOutcome = Outcome<ReadReport>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTotals {
    pub workers: usize,
    /// Sum of per-worker durations (work-seconds, not wall time).
    pub total: Duration,
    /// Wall-clock time from first dispatch to last join.
    pub span: Duration,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct ReadPhase {
    pub totals: PhaseTotals,
    /// Recovered plaintext per worker, in worker order.
    pub plaintexts: Vec<Vec<u8>>,
}

/// Seal and write every chunk to its worker's scratch file concurrently.
///
/// Files that were written successfully stay in place for [`benchmark_read`];
/// a worker that fails removes its own file before reporting.
pub fn benchmark_write(channel: &Channel, chunks: &[Chunk<'_>], key: &SessionKey, scratch: &ScratchFiles) -> Result<PhaseTotals> {
    if chunks.len() != scratch.len() {
        return Err(Error::InvalidRequest(format!(
            "{} chunks but {} scratch files",
            chunks.len(),
            scratch.len()
        )));
    }
    let (outcomes, span) = fan_out(chunks.len(), |worker| {
        let path = scratch.path(worker);
        let result = channel.write_once(chunks[worker], key, path);
        if result.is_err() {
            discard(path);
        }
        result
    });
    let reports = fan_in("write", chunks.len(), outcomes)?;
    Ok(totals(span, reports.iter().map(|r| (r.elapsed, r.bytes))))
}

/// Read back and authenticate every worker's own scratch file concurrently.
///
/// Each worker removes its file once the read has been attempted.
pub fn benchmark_read(channel: &Channel, key: &SessionKey, scratch: &ScratchFiles) -> Result<ReadPhase> {
    let (outcomes, span) = fan_out(scratch.len(), |worker| {
        let path: &Path = scratch.path(worker);
        let result = channel.read_once(path, key);
        discard(path);
        result
    });
    let reports = fan_in("read", scratch.len(), outcomes)?;
    let totals = totals(span, reports.iter().map(|r| (r.elapsed, r.bytes)));
    let plaintexts = reports.into_iter().map(|r| r.plaintext).collect();
    Ok(ReadPhase { totals, plaintexts })
}

/// Run `work(worker)` on `workers` scoped threads and collect one outcome per
/// worker. Returns the outcomes in arrival order and the wall-clock span.
fn fan_out<T, F>(workers: usize, work: F) -> (Vec<Outcome<T>>, Duration)
where
    T: Send,
    F: Fn(usize) -> directio::Result<T> + Sync,
{
    if workers == 0 {
        return (Vec::new(), Duration::ZERO);
    }
    let start = Instant::now();
    let work = &work;
    let outcomes = thread::scope(|s| {
        let (tx, rx) = mpsc::sync_channel::<Outcome<T>>(workers);
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let tx = tx.clone();
                s.spawn(move || {
                    let result = work(worker);
                    // The receiver lives until the scope ends
                    let _ = tx.send(Outcome { worker, result });
                })
            })
            .collect();
        drop(tx);

        // Ends early only if a worker panicked before sending
        let outcomes: Vec<_> = rx.iter().take(workers).collect();
        for (worker, h) in handles.into_iter().enumerate() {
            if h.join().is_err() {
                log::error!("parallel: worker {} panicked", worker);
            }
        }
        outcomes
    });
    (outcomes, start.elapsed())
}

/// Drain exactly `expected` outcomes; surface the lowest-index failure after
/// all of them have been received. Successful reports come back in worker order.
fn fan_in<T>(phase: &'static str, expected: usize, outcomes: Vec<Outcome<T>>) -> Result<Vec<T>> {
    if outcomes.len() != expected {
        return Err(Error::MissingOutcomes { phase, expected, received: outcomes.len() });
    }
    let mut slots: Vec<Option<T>> = (0..expected).map(|_| None).collect();
    let mut failed: Option<(usize, directio::Error)> = None;
    for Outcome { worker, result } in outcomes {
        match result {
            Ok(report) => slots[worker] = Some(report),
            Err(e) => {
                log::warn!("parallel: {} worker {} failed: {}", phase, worker, e);
                if failed.as_ref().map_or(true, |(w, _)| worker < *w) {
                    failed = Some((worker, e));
                }
            }
        }
    }
    if let Some((worker, source)) = failed {
        return Err(Error::Worker { phase, worker, source });
    }
    Ok(slots.into_iter().flatten().collect())
}

fn totals(span: Duration, reports: impl Iterator<Item = (Duration, usize)>) -> PhaseTotals {
    let mut t = PhaseTotals { span, ..Default::default() };
    for (elapsed, bytes) in reports {
        t.workers += 1;
        t.total += elapsed;
        t.bytes += bytes as u64;
    }
    t
}

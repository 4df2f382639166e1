//! Console and JSON rendering of a run report.

use anyhow::Result;
use core_bench::RunReport;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    pub size_bytes: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_throughput_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_throughput_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One record per attempted size, in request order. Sizes never attempted
/// (the run was aborted) are left out.
pub fn records(sizes: &[usize], report: &RunReport) -> Vec<ReportRecord> {
    let mut results = report.results.iter().peekable();
    let mut failures = report.failures.iter().peekable();
    let mut out = Vec::with_capacity(sizes.len());
    for &size in sizes {
        if let Some(r) = results.next_if(|r| r.size == size) {
            out.push(ReportRecord {
                size_bytes: size,
                status: "ok",
                workers: Some(r.workers),
                write_throughput_mbps: Some(r.write_mbps),
                read_throughput_mbps: Some(r.read_mbps),
                latency_ms: Some(r.latency_ms()),
                error: None,
            });
        } else if let Some(f) = failures.next_if(|f| f.size == size) {
            out.push(ReportRecord {
                size_bytes: size,
                status: "failed",
                workers: None,
                write_throughput_mbps: None,
                read_throughput_mbps: None,
                latency_ms: None,
                error: Some(f.error.to_string()),
            });
        }
    }
    out
}

pub fn render_table(records: &[ReportRecord]) -> String {
    let mut out = String::from("Size (bytes) | Write (MB/s) | Read (MB/s) | Latency (ms)\n");
    for r in records {
        let line = match (r.write_throughput_mbps, r.read_throughput_mbps, r.latency_ms) {
            (Some(w), Some(rd), Some(l)) => format!("{:<13}| {:<13.2}| {:<12.2}| {:<12.2}", r.size_bytes, w, rd, l),
            _ => format!(
                "{:<13}| FAILED: {}",
                r.size_bytes,
                r.error.as_deref().unwrap_or("unknown error")
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub fn render_json(records: &[ReportRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use core_bench::Orchestrator;
use core_crypto::Cipher;
use core_directio::IoMode;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::{parse_size, BenchConfig, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "seal-bench", version, about = "Measure encrypted direct-I/O write/read throughput and latency")]
struct Cli {
    /// TOML config file; flags and SEAL_BENCH_* env vars override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Comma-separated payload sizes, e.g. 1MiB,10MiB,100MiB
    #[arg(long, value_delimiter = ',', value_parser = parse_size)]
    sizes: Option<Vec<usize>>,
    /// Worker ceiling (default: available hardware parallelism)
    #[arg(long)]
    workers: Option<usize>,
    /// Device block size in bytes
    #[arg(long, value_parser = parse_size)]
    block_size: Option<usize>,
    /// aes-256-gcm or chacha20-poly1305
    #[arg(long)]
    cipher: Option<Cipher>,
    /// direct, prefer-direct or buffered
    #[arg(long)]
    io_mode: Option<IoMode>,
    /// Directory for the benchmark files
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Canonical file name inside --dir
    #[arg(long)]
    file: Option<String>,
    /// Seed for reproducible payloads
    #[arg(long)]
    seed: Option<u64>,
    /// Skip comparing read-back plaintext with the payload
    #[arg(long, default_value_t = false)]
    no_verify: bool,
    /// table or json
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Write logs to a daily rotating file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    let mut cfg = BenchConfig::load(cli.config.as_deref())?;
    cfg.apply_env()?;
    apply_cli(&mut cfg, &cli);
    cfg.validate()?;

    std::fs::create_dir_all(&cfg.dir).with_context(|| format!("create {:?}", cfg.dir))?;
    let request = cfg.request()?;
    let opts = cfg.run_options()?;
    info!(
        sizes = ?request.sizes(),
        workers = request.max_workers(),
        cipher = %cfg.cipher,
        io_mode = %cfg.io_mode,
        block_size = cfg.block_size,
        dir = %cfg.dir.display(),
        "seal-bench starting"
    );

    let report = Orchestrator::new(opts).run(&request);
    for f in &report.failures {
        warn!(size = f.size, kind = f.error.type_name(), error = %f.error, "size failed");
    }

    let records = report::records(request.sizes(), &report);
    match cfg.format {
        OutputFormat::Table => print!("{}", report::render_table(&records)),
        OutputFormat::Json => println!("{}", report::render_json(&records)?),
    }

    if !report.is_success() {
        bail!("{} of {} sizes failed", report.failures.len(), request.sizes().len());
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "seal-bench.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .compact()
                .init();
            Ok(Some(guard))
        }
        None => {
            // Report goes to stdout, logs stay on stderr
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .init();
            Ok(None)
        }
    }
}

fn apply_cli(cfg: &mut BenchConfig, cli: &Cli) {
    if let Some(sizes) = &cli.sizes {
        cfg.sizes = sizes.clone();
    }
    if let Some(w) = cli.workers {
        cfg.workers = Some(w);
    }
    if let Some(b) = cli.block_size {
        cfg.block_size = b;
    }
    if let Some(c) = cli.cipher {
        cfg.cipher = c;
    }
    if let Some(m) = cli.io_mode {
        cfg.io_mode = m;
    }
    if let Some(d) = &cli.dir {
        cfg.dir = d.clone();
    }
    if let Some(f) = &cli.file {
        cfg.file = f.clone();
    }
    if let Some(s) = cli.seed {
        cfg.seed = Some(s);
    }
    if cli.no_verify {
        cfg.verify = false;
    }
    if let Some(f) = cli.format {
        cfg.format = f;
    }
}

//! All-points k-nearest neighbors over a CSV dataset.
//!
//! Usage:
//!   knn --input data.csv thread-pool --threads 8
//!   knn -n 1000 --dim 32 -k 3 device            (prompts for the thread count)
//!   knn --all process-group --ranks 4           (spawns 3 worker processes)
//!
//! Set RUST_LOG=debug for dispatch details. Build with `--features timing` for
//! per-phase timings on stderr.

use std::ffi::OsString;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use brute_knn::backend::process_group::{run_rank, PipeGroup, PipeWorker};
use brute_knn::backend::DEFAULT_BLOCK_SIZE;
use brute_knn::dataset::{DEFAULT_DIM, DEFAULT_NUM_POINTS};
use brute_knn::report::write_report;
use brute_knn::{
    compute_with, load_csv, Backend, Dataset, KnnConfig, KnnError, KnnOutput, LoadOptions,
    DEFAULT_K,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "knn", version)]
#[command(about = "Brute-force k-nearest neighbors of every point in a dataset")]
struct Cli {
    /// Comma-separated dataset, one point per line
    #[arg(short, long, default_value = "KNNAlgorithmDataset.csv")]
    input: PathBuf,

    /// Records to consume; a shorter file is padded with points at the origin
    #[arg(short = 'n', long)]
    points: Option<usize>,

    /// Consume every line of the input instead of a fixed count
    #[arg(long, conflicts_with = "points")]
    all: bool,

    /// Coordinates per point
    #[arg(short, long, default_value_t = DEFAULT_DIM)]
    dim: usize,

    /// Neighbors per point
    #[arg(short, default_value_t = DEFAULT_K)]
    k: usize,

    #[command(subcommand)]
    backend: BackendCmd,
}

#[derive(Subcommand)]
enum BackendCmd {
    /// Single-threaded reference
    Sequential,
    /// Accelerator-style grid: one logical thread per point
    Device {
        /// Total device threads (prompted for when omitted)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Threads per block
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Fixed pool of OS threads claiming chunks on demand
    ThreadPool {
        /// Worker threads (prompted for when omitted)
        #[arg(short, long)]
        threads: Option<usize>,
        /// Points per claimed chunk
        #[arg(long, default_value_t = 1)]
        chunk_size: usize,
    },
    /// Cooperating processes joined by broadcast + gather
    ProcessGroup {
        /// Number of ranks, including this process
        #[arg(short, long, default_value_t = 4)]
        ranks: usize,
        /// Run ranks as threads of this process instead of child processes
        #[arg(long)]
        in_process: bool,
    },
    /// Internal: run as a spawned process-group rank
    #[command(hide = true)]
    Worker,
}

fn prompt_threads() -> Result<usize, KnnError> {
    print!("Enter the number of threads: ");
    io::stdout().flush().map_err(KnnError::Console)?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(KnnError::Console)?;
    line.trim()
        .parse()
        .map_err(|_| KnnError::InvalidConfig(format!("not a thread count: {:?}", line.trim())))
}


/// Run the group as real processes: this process is rank 0.
fn run_process_group(dataset: Dataset, k: usize, ranks: usize) -> Result<KnnOutput, KnnError> {
    let exe = std::env::current_exe()
        .map_err(|e| KnnError::ResourceAcquisition {
            backend: "process-group",
            message: format!("cannot locate own executable: {}", e),
        })?;
    let args: [OsString; 3] = ["-k".into(), k.to_string().into(), "worker".into()];
    let mut group = PipeGroup::spawn(&exe, &args, ranks)?;

    let t0 = Instant::now();
    let table = run_rank(&mut group, Some(dataset), k)?
        .ok_or_else(|| KnnError::Transport("rank 0 gathered nothing".into()))?;
    let elapsed = t0.elapsed();

    group.finish()?;
    Ok(KnnOutput {
        table,
        elapsed,
        backend: "process-group",
    })
}

fn run_worker(k: usize) -> Result<(), KnnError> {
    let mut worker = PipeWorker::from_env()?;
    run_rank(&mut worker, None, k)?;
    Ok(())
}

/// Map a subcommand to an in-library backend, prompting for missing thread counts.
fn library_backend(cmd: BackendCmd) -> Result<Backend, KnnError> {
    Ok(match cmd {
        BackendCmd::Sequential => Backend::Sequential,
        BackendCmd::Device {
            threads,
            block_size,
        } => Backend::Device {
            threads: threads.map_or_else(prompt_threads, Ok)?,
            block_size,
        },
        BackendCmd::ThreadPool {
            threads,
            chunk_size,
        } => Backend::ThreadPool {
            threads: threads.map_or_else(prompt_threads, Ok)?,
            chunk_size,
        },
        BackendCmd::ProcessGroup { ranks, .. } => Backend::ProcessGroup { ranks },
        BackendCmd::Worker => {
            return Err(KnnError::InvalidConfig(
                "worker mode is only valid inside a spawned group".into(),
            ))
        }
    })
}

fn run(cli: Cli) -> Result<(), KnnError> {
    if matches!(cli.backend, BackendCmd::Worker) {
        return run_worker(cli.k);
    }

    // Load before acquiring any parallel resource.
    let options = LoadOptions {
        dim: cli.dim,
        max_points: if cli.all {
            None
        } else {
            Some(cli.points.unwrap_or(DEFAULT_NUM_POINTS))
        },
    };
    let dataset = load_csv(&cli.input, &options)?;
    let config = KnnConfig { k: cli.k };
    config.validate(&dataset)?;
    log::info!(
        "loaded {} points of dimension {} from {}",
        dataset.len(),
        dataset.dim(),
        cli.input.display()
    );

    let output = match cli.backend {
        BackendCmd::ProcessGroup {
            ranks,
            in_process: false,
        } => run_process_group(dataset, cli.k, ranks)?,
        cmd => {
            let backend = library_backend(cmd)?.build()?;
            compute_with(&dataset, &config, backend.as_ref())?
        }
    };

    let mut out = BufWriter::new(io::stdout().lock());
    write_report(&mut out, &output.table, output.elapsed)
        .and_then(|_| out.flush())
        .map_err(KnnError::Console)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

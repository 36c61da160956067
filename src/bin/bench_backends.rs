//! Benchmark every backend on random datasets.
//!
//! Run with: cargo run --release --bin bench_backends
//!
//! Usage:
//!   bench_backends                  Run default size (2k)
//!   bench_backends 1k 5k 10k        Run multiple sizes
//!   bench_backends --clustered      Use clustered points (many near-ties)
//!   bench_backends -n 10            Run 10 iterations (for profiling)
//!
//! For per-phase timing, build with: cargo run --release --features timing --bin bench_backends

use brute_knn::{compute_with, Backend, Dataset, KnnConfig, KnnError, NeighborTable};
use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.to_lowercase();
    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 1_000_000)
    } else if let Some(stripped) = s.strip_suffix('k') {
        (stripped, 1_000)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .parse::<f64>()
        .map(|n| (n * multiplier as f64) as usize)
        .map_err(|e| format!("Invalid number '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "bench_backends")]
#[command(about = "Benchmark brute-force kNN backends at various scales")]
struct Args {
    /// Point counts to benchmark (e.g., 1k, 10k)
    #[arg(value_parser = parse_count)]
    sizes: Vec<usize>,

    /// Random seed
    #[arg(short, long, default_value_t = 12345)]
    seed: u64,

    /// Coordinates per point
    #[arg(short, long, default_value_t = 32)]
    dim: usize,

    /// Neighbors per point
    #[arg(short, default_value_t = 3)]
    k: usize,

    /// Workers per parallel backend (defaults to available parallelism)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Draw points around a few centers instead of uniformly
    #[arg(long)]
    clustered: bool,

    /// Compare every table against the sequential reference
    #[arg(long)]
    validate: bool,

    /// Number of iterations to run (useful for profiling)
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,
}

fn generate_points(
    n: usize,
    dim: usize,
    seed: u64,
    clustered: bool,
) -> Result<Dataset, KnnError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut coords = Vec::with_capacity(n * dim);
    if clustered {
        let centers: Vec<f64> = (0..8 * dim).map(|_| rng.gen_range(0.0..100.0)).collect();
        for _ in 0..n {
            let c = rng.gen_range(0..8) * dim;
            for &x in &centers[c..c + dim] {
                coords.push(x + rng.gen_range(-0.5..0.5));
            }
        }
    } else {
        coords.extend((0..n * dim).map(|_| rng.gen_range(0.0..100.0)));
    }
    Dataset::from_flat(coords, dim)
}

fn format_rate(count: usize, ms: f64) -> String {
    if ms <= 0.0 {
        return "N/A".to_string();
    }
    let per_sec = count as f64 / (ms / 1000.0);
    if per_sec >= 1_000_000.0 {
        format!("{:.2}M/s", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}k/s", per_sec / 1000.0)
    } else {
        format!("{:.0}/s", per_sec)
    }
}

fn format_num(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{}k", n / 1_000)
    } else {
        format!("{}", n)
    }
}

struct BenchResult {
    n: usize,
    backend: &'static str,
    time_ms: f64,
}

fn backends(threads: usize) -> Vec<Backend> {
    vec![
        Backend::Sequential,
        Backend::Device {
            threads,
            block_size: brute_knn::backend::DEFAULT_BLOCK_SIZE,
        },
        Backend::ThreadPool {
            threads,
            chunk_size: 1,
        },
        Backend::ProcessGroup { ranks: threads },
    ]
}

fn count_mismatched_rows(reference: &NeighborTable, table: &NeighborTable) -> usize {
    reference
        .rows()
        .zip(table.rows())
        .filter(|(a, b)| a != b)
        .count()
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.repeat == 0 {
        eprintln!("Error: --repeat must be > 0");
        return ExitCode::FAILURE;
    }

    println!("brute-knn Backend Benchmark");
    println!("===========================\n");

    let sizes: Vec<usize> = if args.sizes.is_empty() {
        vec![2_000]
    } else {
        args.sizes
    };
    let threads = args.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    println!("Configuration:");
    println!("  seed = {}", args.seed);
    println!("  dim = {}, k = {}", args.dim, args.k);
    println!(
        "  point type = {}",
        if args.clustered {
            "clustered"
        } else {
            "uniform"
        }
    );
    println!("  workers = {}", threads);
    println!(
        "  sizes = {:?}",
        sizes.iter().map(|&n| format_num(n)).collect::<Vec<_>>()
    );
    if args.repeat > 1 {
        println!("  repeat = {}", args.repeat);
    }

    #[cfg(feature = "timing")]
    println!("  timing = enabled (per-phase timing will be printed)");

    let config = KnnConfig { k: args.k };
    let mut results: Vec<BenchResult> = Vec::new();

    for &n in &sizes {
        println!("\n{}", "=".repeat(60));
        println!("Benchmarking n = {}", format_num(n));
        println!("{}", "=".repeat(60));

        let t_gen = Instant::now();
        let dataset = match generate_points(n, args.dim, args.seed, args.clustered) {
            Ok(ds) => ds,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        println!(
            "Point generation: {:.1}ms",
            t_gen.elapsed().as_secs_f64() * 1000.0
        );

        if let Err(e) = config.validate(&dataset) {
            println!("  skipping: {}", e);
            continue;
        }

        let mut reference: Option<NeighborTable> = None;

        for spec in backends(threads) {
            let backend = match spec.build() {
                Ok(b) => b,
                Err(e) => {
                    println!("  {:<14} unavailable: {}", format!("{:?}", spec), e);
                    continue;
                }
            };

            let mut times: Vec<f64> = Vec::with_capacity(args.repeat);
            let mut last_table = None;
            for iter in 0..args.repeat {
                if args.repeat > 1 {
                    print!("  {} iteration {}/{}... ", backend.name(), iter + 1, args.repeat);
                    let _ = io::stdout().flush();
                }
                match compute_with(&dataset, &config, backend.as_ref()) {
                    Ok(output) => {
                        let ms = output.elapsed.as_secs_f64() * 1000.0;
                        times.push(ms);
                        if args.repeat > 1 {
                            println!("{:.1}ms", ms);
                        }
                        last_table = Some(output.table);
                    }
                    Err(e) => {
                        eprintln!("  {} failed: {}", backend.name(), e);
                        return ExitCode::FAILURE;
                    }
                }
            }

            let avg = times.iter().sum::<f64>() / times.len() as f64;
            let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
            println!(
                "  {:<14} avg {:>9.1}ms  min {:>9.1}ms  {:>10}",
                backend.name(),
                avg,
                min,
                format_rate(n, avg)
            );

            if let Some(table) = last_table {
                if args.validate {
                    match &reference {
                        None => reference = Some(table),
                        Some(r) => {
                            let bad = count_mismatched_rows(r, &table);
                            if bad > 0 {
                                eprintln!(
                                    "  WARNING: {} differs from sequential on {} rows",
                                    backend.name(),
                                    bad
                                );
                            }
                        }
                    }
                }
            }

            results.push(BenchResult {
                n,
                backend: backend.name(),
                time_ms: avg,
            });
        }
    }

    if !results.is_empty() {
        println!("\n\n{}", "=".repeat(60));
        println!("SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "{:>10} | {:>14} | {:>10} | {:>12}",
            "n", "backend", "time", "throughput"
        );
        println!("{:-<10}-+-{:-<14}-+-{:-<10}-+-{:-<12}", "", "", "", "");

        for r in &results {
            println!(
                "{:>10} | {:>14} | {:>8.1}ms | {:>12}",
                format_num(r.n),
                r.backend,
                r.time_ms,
                format_rate(r.n, r.time_ms)
            );
        }
    }

    println!("\nBenchmark complete.");
    ExitCode::SUCCESS
}

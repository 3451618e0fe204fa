mod interactive;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use core_sim::{
    config::CacheConfig,
    policy::{ReplacementPolicy, WritePolicy},
    sim::CacheSim,
    trace,
};
use serde::Serialize;

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// Block size of the simulated cache. A configuration input of the core, but
/// fixed for this binary.
const BLOCK_SIZE_BYTES: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Total cache capacity in bytes
    cache_size: usize,
    /// Ways per set
    associativity: usize,
    /// Replacement policy: 0 = LRU, 1 = FIFO
    replacement: u8,
    /// Write policy: 0 = write-through, 1 = write-back
    write_policy: u8,
    /// File path to the memory access trace
    trace: PathBuf,
    /// Enable interactive mode
    #[arg(long)]
    interactive: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    /// Report final statistics as JSON instead of plain lines
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    miss_ratio: f64,
    memory_writes: u64,
    memory_reads: u64,
    hits: u64,
    misses: u64,
}

fn main() -> Result<()> {
    // a usage problem must exit with status 1, not clap's default 2
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            e.print()?;
            std::process::exit(1);
        }
    };
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }

    let replacement = ReplacementPolicy::try_from(args.replacement)
        .context("replacement policy must be 0 (LRU) or 1 (FIFO)")?;
    let write_policy = WritePolicy::try_from(args.write_policy)
        .context("write policy must be 0 (write-through) or 1 (write-back)")?;
    let config = CacheConfig::new(
        args.cache_size,
        args.associativity,
        BLOCK_SIZE_BYTES,
        replacement,
        write_policy,
    )?;

    let contents = fs::read_to_string(&args.trace)
        .with_context(|| format!("could not open the trace file {}", args.trace.display()))?;
    let accesses = trace::parse_trace(&contents)?;
    log::info!("finished parsing trace. # of records: {}", accesses.len());

    let mut sim = CacheSim::new(config)?;
    if args.interactive {
        interactive::execute_interactive(&mut sim, &accesses)?;
    } else {
        for &access in &accesses {
            let _ = sim.access(access);
        }
    }
    sim.flush();
    log::info!("finished simulation.");
    output_stat(&sim);

    let stats = sim.stats();
    if args.json {
        let report = Report {
            miss_ratio: stats.miss_ratio(),
            memory_writes: stats.memory_writes,
            memory_reads: stats.memory_reads,
            hits: stats.hits,
            misses: stats.misses,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Miss ratio {:.6}", stats.miss_ratio());
        println!("write {}", stats.memory_writes);
        println!("read {}", stats.memory_reads);
    }
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(_: &CacheSim) {}

#[cfg(feature = "stat")]
fn output_stat(sim: &CacheSim) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0 - 20)
}

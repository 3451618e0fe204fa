use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use core_sim::branch_predictor::{parse_branch_record, BranchStats, GsharePredictor};

#[derive(Parser, Debug)]
#[command(author, version, about = "gshare branch predictor trace simulator", long_about = None)]
struct Cli {
    /// Number of PC bits used to index the prediction table
    pc_bits: u32,
    /// Number of global history register bits folded into the index
    history_bits: u32,
    /// File path to the branch outcome trace
    trace: PathBuf,
}

fn main() -> Result<()> {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            e.print()?;
            std::process::exit(1);
        }
    };
    env_logger::init();

    let mut predictor = GsharePredictor::new(args.pc_bits, args.history_bits)?;
    let contents = fs::read_to_string(&args.trace)
        .with_context(|| format!("could not open the trace file {}", args.trace.display()))?;

    let mut stats = BranchStats::default();
    let mut skipped = 0usize;
    for line in contents.lines() {
        match parse_branch_record(line) {
            Some((pc, taken)) => stats.record(predictor.observe(pc, taken)),
            None if line.trim().is_empty() => {}
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("skipped {skipped} malformed trace lines");
    }

    println!(
        "{} {} {:.2}",
        predictor.pc_bits(),
        predictor.history_bits(),
        stats.misprediction_rate()
    );
    Ok(())
}

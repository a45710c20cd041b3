//! Paging Simulator - Main Entry Point
//!
//! Usage: paging-sim [OPTIONS] [INPUT]
//!
//! Reads process descriptors, replays their page reference traces
//! round-robin against a shared physical memory and prints every access
//! followed by the final page tables.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use paging_sim::io::{read_input, write_processes, InputFormat};
use paging_sim::report::{
    format_access, format_outcome, format_process, format_setup_error, write_report,
};
use paging_sim::{NUM_FRAMES, PagingMode, Simulation, SimulationConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// pid, reference count and page bytes per process
    Binary,
    /// "pid page page ..." per line
    Text,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    TwoLevel,
    SingleLevel,
}

/// Command-line configuration
#[derive(Parser, Debug)]
#[command(name = "paging-sim")]
#[command(about = "Demand paging simulator with two-level page tables", version)]
struct Config {
    /// Process descriptor file; reads stdin when omitted or "-"
    input: Option<PathBuf>,

    /// Input encoding
    #[arg(short, long, value_enum, default_value = "binary")]
    format: FormatArg,

    /// Page table layout
    #[arg(short, long, value_enum, default_value = "two-level")]
    mode: ModeArg,

    /// Physical frames available
    #[arg(long, default_value_t = NUM_FRAMES as u16, value_parser = clap::value_parser!(u16).range(1..=NUM_FRAMES as i64))]
    frames: u16,

    /// Do not print one line per access
    #[arg(long)]
    no_trace: bool,

    /// Write the loaded processes as binary records to PATH and exit
    #[arg(long, value_name = "PATH")]
    emit_binary: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let config = Config::parse();
    init_logging(config.verbose);

    // Run the simulator and handle any errors
    if let Err(e) = run(&config) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(config: &Config) -> Result<()> {
    let input = config
        .input
        .as_deref()
        .filter(|path| path.as_os_str() != "-");
    let format = match config.format {
        FormatArg::Binary => InputFormat::Binary,
        FormatArg::Text => InputFormat::Text,
    };
    let mode = match config.mode {
        ModeArg::TwoLevel => PagingMode::TwoLevel,
        ModeArg::SingleLevel => PagingMode::SingleLevel,
    };

    let images = read_input(input, format).context("failed to load processes")?;
    let sim_config = SimulationConfig {
        mode,
        frames: usize::from(config.frames),
    };
    info!("{:?}, {} processes", sim_config, images.len());

    if let Some(path) = &config.emit_binary {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        write_processes(BufWriter::new(file), &images)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {} processes to {}", images.len(), path.display());
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for image in &images {
        writeln!(out, "{}", format_process(image))?;
    }

    let mut sim = match Simulation::load(sim_config, images) {
        Ok(sim) => sim,
        Err(e) => {
            writeln!(out, "{}", format_setup_error(&e))?;
            out.flush()?;
            return Err(e).context("failed to set up page tables");
        }
    };

    let mut write_error = None;
    let outcome = sim.run_with(|record| {
        if config.no_trace || write_error.is_some() {
            return;
        }
        if let Err(e) = writeln!(out, "{}", format_access(record)) {
            write_error = Some(e);
        }
    })?;
    if let Some(e) = write_error {
        return Err(e).context("failed to write access trace");
    }

    if let Some(message) = format_outcome(&outcome) {
        warn!("simulation stopped early: {:?}", outcome);
        writeln!(out, "{}", message)?;
    }

    write_report(&mut out, mode, &sim.reports()?, &sim.totals())?;
    out.flush()?;
    Ok(())
}

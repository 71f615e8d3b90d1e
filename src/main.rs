// Command-line entry point for benchlift.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use benchlift::application::LiftUsecase;
use benchlift::config::LiftConfig;
use benchlift::infrastructure::CargoToolchain;
use clap::Parser;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// Lift a `bench_*` function out of its harness and build it as a standalone binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the benchmark code
    #[arg(short, long)]
    path: PathBuf,

    /// Regex matched against bench_* function names; must select exactly one
    #[arg(short, long)]
    name: String,

    /// Path of the resulting binary [default: ./benchmark.binary]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep the temporary source directory
    #[arg(long)]
    no_src_cleanup: bool,

    /// Print the lifted function instead of building it
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchlift=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Could not determine the current directory")?;
    let pattern = Regex::new(&cli.name)
        .with_context(|| format!("Invalid function name pattern '{}'", cli.name))?;

    let mut config = LiftConfig::new(cli.path, pattern, &cwd);
    if let Some(output) = &cli.output {
        config = config.with_output(output, &cwd);
    }
    config.keep_scratch = cli.no_src_cleanup;
    config.dry_run = cli.dry_run;

    let toolchain = CargoToolchain::from_env();
    let usecase = LiftUsecase {
        toolchain: &toolchain,
        config: &config,
    };
    let outcome = usecase.run()?;

    if let Some(dir) = &outcome.scratch_dir {
        println!("Temporary source directory kept at {}", dir.display());
    }
    match &outcome.binary {
        Some(binary) => println!("{}", binary.display()),
        None => print!("{}", outcome.lifted_source),
    }
    Ok(())
}

fn main() {
    init_tracing();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

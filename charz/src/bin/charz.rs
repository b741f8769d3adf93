//! The `charz` command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "charz", version, about = "Standard-cell library characterization")]
struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Characterize a library and write its `.lib` file.
    Run(RunArgs),
    /// Compare two `.lib` files arc by arc.
    Compare(CompareArgs),
}

#[derive(Args)]
struct RunArgs {
    /// A configuration file, or a directory containing `charz.toml`.
    library: PathBuf,
    /// Output path, overriding `<results_dir>/<lib_name>.lib`.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Number of worker threads.
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Cell-name regular expressions; cells matching any are selected.
    #[arg(short, long = "filters")]
    filters: Vec<Regex>,
    /// Keep per-task simulation artifacts.
    #[arg(long)]
    debug: bool,
    /// Compare the written library against a reference `.lib`.
    #[arg(long = "comparewith")]
    compare_with: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// The benchmark library.
    benchmark: PathBuf,
    /// The library compared against the benchmark.
    compared: PathBuf,
    /// Directory receiving `compare.csv` and `compare.svg`.
    #[arg(short, long, default_value = "results")]
    output_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    let result = match cli.command {
        Command::Run(args) => charz::run(&charz::RunOptions {
            config: args.library,
            output: args.output,
            jobs: args.jobs,
            filters: args.filters,
            debug: args.debug,
            compare_with: args.compare_with,
        }),
        Command::Compare(args) => {
            charz::compare::compare(&args.benchmark, &args.compared, &args.output_dir)
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code() as u8)
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.quiet {
        "warn"
    } else if matches!(&cli.command, Command::Run(args) if args.debug) {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

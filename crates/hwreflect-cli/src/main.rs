//! Binary entrypoint for hwreflect.
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hwreflect_cli::batch::{self, BatchArgs};
use hwreflect_cli::check::{self, CheckArgs};
use hwreflect_cli::{load_context, EXIT_USAGE};

/// Compile, elaborate and simulate Chisel hardware modules
#[derive(Parser, Debug)]
#[command(name = "hwreflect", version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "HWREFLECT_CONFIG")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one source file through compile, elaborate and (optionally) simulate
    Check(CheckArgs),
    /// Run every case of a JSON-lines file
    Batch(BatchArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = match load_context(cli.config.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(EXIT_USAGE);
        }
    };

    let code = match &cli.command {
        Commands::Check(args) => check::run(args, ctx).await,
        Commands::Batch(args) => batch::run(args, ctx).await,
    };
    std::process::exit(code);
}

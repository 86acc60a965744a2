//! EliteLight CLI: drive a local-network LED strip from Elite Dangerous events.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;

/// Shared shutdown flag: set by Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "elitelight",
    version,
    about = "LED strip control for Elite Dangerous events"
)]
struct Args {
    /// Output as JSON (for set, event, watch, probe, config, colors)
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log the command plan instead of running the bridge
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .ok();

    let opts = cli::GlobalOpts {
        json: args.json,
        config_path: args.config,
        dry_run: args.dry_run,
    };
    if let Err(e) = cli::run(args.command, &opts) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

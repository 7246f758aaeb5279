mod cli;
mod ops;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { target, storage, snapshot_root, workers, batch_size } => {
            ops::do_init(target, storage.into(), snapshot_root, workers, batch_size)?;
        }
        Commands::Prepare { no_snapshot } => {
            ops::do_prepare(&cli.config, cli.verbose, !no_snapshot)?;
        }
        Commands::Snapshot => {
            ops::do_snapshot(&cli.config, cli.verbose)?;
        }
        Commands::Refresh { entire } => {
            ops::do_refresh(&cli.config, cli.verbose, entire)?;
        }
        Commands::Status => {
            ops::do_status(&cli.config, cli.verbose)?;
        }
        Commands::Tables => {
            ops::do_tables(&cli.config, cli.verbose)?;
        }
        Commands::Teardown { yes } => {
            ops::do_teardown(&cli.config, cli.verbose, yes)?;
        }
        Commands::Version => {
            ops::do_version();
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

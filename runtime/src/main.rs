// Copyright 2026 Pitchfeed Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use pitchfeed::cli::{self, GlobalOptions};
use pitchfeed::error::{exit_codes, StartupError};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pitchfeed",
    about = "pitchfeed: live football data acquisition engine",
    version,
    after_help = "Credentials are read from THESPORTS_USER and THESPORTS_SECRET."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Directory for the output document, daily counter and lock file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Maximum in-flight upstream requests
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single acquisition cycle and exit
    Once,
    /// Run cycles on a fixed wall-clock interval until signaled
    Start,
    /// Stop the running scheduler
    Stop,
    /// Show lock ownership and today's cycle count
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "pitchfeed=debug" } else { "pitchfeed=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn startup_exit_code(result: Result<i32, StartupError>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("  Error: {e}");
            e.exit_code()
        }
    }
}

fn command_exit_code(result: anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(e) => {
            eprintln!("  Error: {e:#}");
            exit_codes::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let opts = GlobalOptions {
        data_dir: cli.data_dir,
        concurrency: cli.concurrency,
    };

    // Every guard is dropped inside these calls, so exiting here never
    // leaves a lock file behind.
    let code = match cli.command {
        Commands::Once => startup_exit_code(cli::once::run(&opts).await),
        Commands::Start => startup_exit_code(cli::start::run(&opts).await),
        Commands::Stop => command_exit_code(cli::stop::run(&opts).await),
        Commands::Status { json } => command_exit_code(cli::status::run(&opts, json).await),
    };
    std::process::exit(code);
}

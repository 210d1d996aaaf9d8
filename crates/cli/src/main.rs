// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ropeway::config::Config;
use ropeway::error::exit;

#[derive(Parser)]
#[command(name = "ropeway", version, about = "Chairlift resort simulator for a single operating day.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sibling watchdog; spawned by the supervisor, not for direct use.
    #[command(hide = true)]
    Guardian(ropeway::guardian::GuardianArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.subcommand {
        Some(Commands::Guardian(args)) => {
            std::process::exit(ropeway::guardian::run(&args).await);
        }
        None => {
            let config = cli.config;

            if let Err(e) = config.validate() {
                eprintln!("error: {e}");
                std::process::exit(exit::USAGE);
            }

            match ropeway::run::run(config).await {
                Ok(code) => std::process::exit(code),
                Err(e) => {
                    error!("fatal: {e:#}");
                    std::process::exit(exit::STARTUP);
                }
            }
        }
    }
}

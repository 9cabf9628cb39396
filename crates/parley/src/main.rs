// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - anonymous chat matchmaking and session-lifecycle engine.
//!
//! This is the binary entry point: it runs the expiry worker, reports
//! backend status, and prints the effective configuration.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_config::ParleyConfig;

/// Parley - anonymous chat matchmaking engine.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine's background expiry worker until interrupted.
    Serve,
    /// Show backend health, queue length and active dialogs and topics.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> ParleyConfig {
    let loaded = match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => print!("{rendered}"),
                Err(e) => eprintln!("parley: failed to render config: {e}"),
            }
            Ok(())
        }
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("parley: {e}");
        std::process::exit(1);
    }
}

//! # kiln
//!
//! kiln - incremental build checker for web-client projects.
//!
//! ## Name Origin
//!
//! A **kiln** is the oven where raw clay is fired into hardened ware.
//! This tool fires raw TypeScript and component sources through static
//! analysis before they ship, and keeps the fire burning across file
//! changes in watch mode.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Incremental build checker for web-client projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type check the project's TypeScript and component sources
    Check(commands::check::CheckArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check(args) => commands::check::run(args),
    }
}

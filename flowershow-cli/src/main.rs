//! Flowershow: publish an Obsidian-style vault to a content repository.
//!
//! # Usage
//!
//! ```text
//! flowershow config init --owner <o> --repo <r> [--token <t>] [--branch main] [--auto-merge]
//! flowershow config init --object-store <url>
//! flowershow config show
//! flowershow status [--vault <dir>] [--all] [--json]
//! flowershow publish [--vault <dir>] [--branch <name>] [--keep-deleted] [--resume] [--dry-run]
//! flowershow publish-note <path> [--vault <dir>]
//! flowershow unpublish <path> [--vault <dir>]
//! flowershow diff <path> [--vault <dir>]
//! flowershow check
//! ```
//!
//! `FLOWERSHOW_TOKEN` overrides the stored token. `RUST_LOG` controls log
//! output (default `info`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs,
    config::ConfigCommand,
    diff::DiffArgs,
    note::{PublishNoteArgs, UnpublishArgs},
    publish::PublishArgs,
    status::StatusArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "flowershow",
    version,
    about = "Publish a vault to a Flowershow content repository",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or inspect ~/.flowershow/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Show which vault files are new, changed or deleted remotely.
    Status(StatusArgs),

    /// Publish every pending change in one batch.
    Publish(PublishArgs),

    /// Publish one note and its embedded images to the base branch.
    PublishNote(PublishNoteArgs),

    /// Delete one published path from the base branch.
    Unpublish(UnpublishArgs),

    /// Show the unified diff between the published and local copy of a file.
    Diff(DiffArgs),

    /// Check the configuration and that the remote is reachable.
    Check(CheckArgs),
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Status(args) => args.run(),
        Commands::Publish(args) => args.run(),
        Commands::PublishNote(args) => args.run(),
        Commands::Unpublish(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Check(args) => args.run(),
    }
}

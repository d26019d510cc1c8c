//! CloudMirror CLI - Command-line interface for CloudMirror
//!
//! Provides commands for:
//! - Uploading a local file or directory tree into a remote folder
//! - Downloading a remote file or folder tree
//! - Deleting a remote file or folder tree
//!
//! Exits with status 0 on success and 1 on any fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudmirror_core::config::Config;
use cloudmirror_transfer::TransferReport;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    delete::DeleteCommand, download::DownloadCommand, upload::UploadCommand, OverwriteMode,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "cloudmirror",
    version,
    about = "Chunked, resumable file transfers to cloud storage"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Overwrite policy for existing files (overrides the config file)
    #[arg(long, value_enum, global = true)]
    overwrite: Option<OverwriteMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a local file or directory into a remote folder
    Upload(UploadCommand),
    /// Download a remote file or folder into a local directory
    Download(DownloadCommand),
    /// Delete a remote file or folder tree
    Delete(DeleteCommand),
}

impl Commands {
    fn operation(&self) -> &'static str {
        match self {
            Commands::Upload(_) => "upload",
            Commands::Download(_) => "download",
            Commands::Delete(_) => "delete",
        }
    }
}

/// Log level: `RUST_LOG` wins, then `-v` count, then the config file
fn log_filter(verbose: u8, configured: &str) -> EnvFilter {
    let level = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(cli: &Cli, config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &config.logging.level))
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<TransferReport> {
    let engine = commands::build_engine(config)?;

    let result = match &cli.command {
        Commands::Upload(cmd) => cmd.execute(&engine).await,
        Commands::Download(cmd) => cmd.execute(&engine).await,
        Commands::Delete(cmd) => cmd.execute(&engine).await,
    };

    // The operation's own failure is the one worth reporting
    let closed = engine.close().await;
    let report = result?;
    closed.context("Failed to close backend")?;
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let formatter = get_formatter(format);

    let config = match commands::load_config(cli.config.as_deref(), cli.overwrite) {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cli, &config);

    match run(&cli, &config).await {
        Ok(report) => {
            if !cli.quiet {
                formatter.report(cli.command.operation(), &report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

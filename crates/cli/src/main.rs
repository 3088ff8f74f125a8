//! # narrativelens: batch feature extraction for video ads
//!
//! This is the main entry point for the `narrativelens` command-line interface.

mod config;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a YAML config file (defaults to `config.yml` if present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a batch of assets and store the extracted features
    Run(run::RunArgs),
    /// Create empty store documents for every asset in an asset directory
    Register(run::RegisterArgs),
    /// Show how many assets are already done for a task
    Status(run::StatusArgs),
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let app_config = config::get_config(cli.config.as_deref())?;

    // Setup logging to a file
    if let Some(parent) = Path::new(&app_config.log_file).parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = File::create(&app_config.log_file)?;
    let subscriber = fmt::Subscriber::builder()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli
        .config
        .as_deref()
        .unwrap_or(config::DEFAULT_CONFIG_FILE);
    if Path::new(config_path).exists() {
        info!("Loaded configuration from '{config_path}'.");
    } else {
        info!("No config file found; using defaults and environment.");
    }

    match &cli.command {
        Commands::Run(args) => run::handle_run(&app_config, args).await,
        Commands::Register(args) => run::handle_register(&app_config, args).await,
        Commands::Status(args) => run::handle_status(&app_config, args).await,
    }
}

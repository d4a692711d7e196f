mod commands;
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gachapon_core::{GachaponError, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gachapon")]
#[command(about = "Gachapon protocol - play finalization and prize redemption")]
#[command(version)]
struct Cli {
    /// Data directory for the protocol database and config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Game and prize table management
    #[command(subcommand)]
    Game(commands::GameCommands),

    /// Play inspection and offline event replay
    #[command(subcommand)]
    Play(commands::PlayCommands),

    /// Redemption inspection and data retention
    #[command(subcommand)]
    Redemption(commands::RedemptionCommands),

    /// Box selection and parcel checks
    #[command(subcommand)]
    Shipping(commands::ShippingCommands),

    /// Database maintenance
    #[command(subcommand)]
    Db(commands::DbCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "gachapon={}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    tracing::debug!("Using data directory {}", data_dir.display());

    let protocol_config =
        config::load_protocol_config(&data_dir).context("loading protocol configuration")?;

    let db_path = data_dir.join("gachapon.db");
    let storage = Arc::new(
        Storage::new(&db_path)
            .await
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );

    // Execute command
    let result = match cli.command {
        Commands::Game(cmd) => commands::handle_game_command(cmd, &storage).await,
        Commands::Play(cmd) => {
            commands::handle_play_command(cmd, &storage, &protocol_config).await
        }
        Commands::Redemption(cmd) => commands::handle_redemption_command(cmd, &storage).await,
        Commands::Shipping(cmd) => commands::handle_shipping_command(cmd, &protocol_config),
        Commands::Db(cmd) => commands::handle_db_command(cmd, &storage, &db_path).await,
    };

    if let Err(e) = result {
        match e {
            GachaponError::GameNotFound(id) => {
                eprintln!("Error: Game '{}' not found", id);
                eprintln!("Use 'gachapon game list' to see known games");
            }
            GachaponError::PlayNotFound(signature) => {
                eprintln!("Error: No play recorded for '{}'", signature);
                eprintln!("Use 'gachapon play list' to see recent plays");
            }
            GachaponError::Validation(msg) => {
                eprintln!("Error: {}", msg);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use gachapon_core::storage::{GameStore, PlayStore};
use gachapon_core::{
    ChainEvent, EngineOutcome, FixedPriceOracle, GachaponError, PlayEngine, ProtocolConfig,
    Result, Storage,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum PlayCommands {
    /// Replay chain events from a JSON file through the engine
    Replay {
        /// Path to one event object or an array of events
        file: PathBuf,
        /// USD price quoted for every game token during the replay
        #[arg(short, long, default_value_t = 1.0)]
        price: f64,
    },
    /// Show the play recorded for a transaction signature
    Status {
        /// Transaction signature
        signature: String,
    },
    /// List recent plays
    List {
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

pub async fn handle_play_command(
    cmd: PlayCommands,
    storage: &Arc<Storage>,
    config: &ProtocolConfig,
) -> Result<()> {
    match cmd {
        PlayCommands::Replay { file, price } => {
            let raw = std::fs::read_to_string(&file)?;
            let events = parse_events(&raw)?;

            // Offline replay has no market feed; quote one flat price.
            let oracle = Arc::new(FixedPriceOracle::new());
            for game in GameStore::new(storage).list().await? {
                oracle.set_price(&game.token_mint, price);
            }

            let engine = PlayEngine::new(Arc::clone(storage), oracle, config.clone());

            println!(
                "Replaying {} event(s) at ${:.2} per token...",
                events.len(),
                price
            );
            for event in &events {
                match engine.process_event(event).await {
                    Ok(outcome) => {
                        println!("  {}: {}", event.signature, describe(&outcome));
                    }
                    // Out-of-order file: the finalize landed before its play.
                    Err(e) if e.is_transient() => {
                        println!("  {}: deferred ({})", event.signature, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        PlayCommands::Status { signature } => {
            let play = PlayStore::new(storage)
                .get_by_signature(&signature)
                .await?
                .ok_or(GachaponError::PlayNotFound(signature))?;

            println!("Play {}", play.id);
            println!("  Signature: {}", play.transaction_signature);
            println!("  Game: {}", play.game_id);
            println!("  Wallet: {}", play.user_wallet);
            println!("  Status: {}", play.status);
            match play.payment {
                Some(state) => println!(
                    "  Payment: {} (${:.4})",
                    state,
                    play.payment_usd_value.unwrap_or(0.0)
                ),
                None => println!("  Payment: not verified yet"),
            }
            match play.prize_id {
                Some(prize_id) => println!("  Prize: {}", prize_id),
                None => println!("  Prize: none"),
            }
            if let Some(mint) = &play.nft_mint {
                println!("  NFT: {}", mint);
            }
            println!("  Played at: {}", play.played_at.format("%Y-%m-%d %H:%M:%S"));
        }

        PlayCommands::List { limit } => {
            let plays = PlayStore::new(storage).list_recent(limit).await?;
            if plays.is_empty() {
                println!("No plays recorded yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Signature", "Wallet", "Status", "Payment", "Prize"]);
            for play in plays {
                table.add_row(vec![
                    short(&play.transaction_signature),
                    short(&play.user_wallet),
                    play.status.to_string(),
                    play.payment
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    play.prize_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}

fn describe(outcome: &EngineOutcome) -> String {
    match outcome {
        EngineOutcome::Ignored => "ignored".to_string(),
        EngineOutcome::PaymentVerified(verdict) => {
            format!("payment verified (${:.4})", verdict.actual_usd_value)
        }
        EngineOutcome::PaymentRejected(verdict) => {
            format!("payment rejected: {}", verdict.message)
        }
        EngineOutcome::Settled(outcome) => match &outcome.nft_mint {
            Some(mint) => format!("{} -> NFT {}", outcome.message, mint),
            None => outcome.message.clone(),
        },
    }
}

fn parse_events(raw: &str) -> Result<Vec<ChainEvent>> {
    match serde_json::from_str::<Vec<ChainEvent>>(raw) {
        Ok(events) => Ok(events),
        Err(_) => Ok(vec![serde_json::from_str::<ChainEvent>(raw)?]),
    }
}

/// Truncated for table display.
fn short(value: &str) -> String {
    if value.len() > 16 {
        format!("{}..", &value[..16])
    } else {
        value.to_string()
    }
}

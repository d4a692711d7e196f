use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use gachapon_core::storage::{GameStore, PrizeStore};
use gachapon_core::{GachaponError, Game, Prize, PrizeTier, Result, Storage};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum GameCommands {
    /// Load a game and its prize table from a JSON seed file
    Seed {
        /// Path to the seed file
        file: PathBuf,
        /// Skip the overwrite confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// List all games
    List,
    /// Show a game and its prize table
    Show {
        /// Game id or on-chain address
        game: String,
    },
}

/// On-disk shape of a seed file: one game with its full prize table.
#[derive(Deserialize)]
struct GameSeed {
    address: String,
    name: String,
    token_mint: String,
    token_decimals: u8,
    cost_usd_cents: u64,
    treasury: String,
    #[serde(default = "default_active")]
    is_active: bool,
    prizes: Vec<PrizeSeed>,
}

#[derive(Deserialize)]
struct PrizeSeed {
    prize_id: u32,
    name: String,
    tier: PrizeTier,
    probability_bp: u16,
    supply: u32,
    length_in: f64,
    width_in: f64,
    height_in: f64,
    weight_grams: u32,
    cost_usd_cents: u64,
}

fn default_active() -> bool {
    true
}

pub async fn handle_game_command(cmd: GameCommands, storage: &Arc<Storage>) -> Result<()> {
    match cmd {
        GameCommands::Seed { file, force } => {
            let raw = std::fs::read_to_string(&file)?;
            let seed: GameSeed = serde_json::from_str(&raw)?;
            validate_seed(&seed)?;

            let game_store = GameStore::new(storage);
            let existing = game_store.get_by_address(&seed.address).await?;

            if let Some(ref current) = existing {
                if !force {
                    let confirm = Confirm::new()
                        .with_prompt(format!(
                            "Game '{}' already exists at {}. Overwrite its definition?",
                            current.name, seed.address
                        ))
                        .default(false)
                        .interact()
                        .map_err(|e| GachaponError::internal(e.to_string()))?;

                    if !confirm {
                        println!("Seeding cancelled.");
                        return Ok(());
                    }
                }
            }

            // Re-seeding keeps the game id and play counter so existing
            // plays and prizes stay linked.
            let game = Game {
                id: existing
                    .as_ref()
                    .map(|g| g.id.clone())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                address: seed.address.clone(),
                name: seed.name.clone(),
                token_mint: seed.token_mint.clone(),
                token_decimals: seed.token_decimals,
                cost_usd_cents: seed.cost_usd_cents,
                treasury: seed.treasury.clone(),
                is_active: seed.is_active,
                total_plays: existing.as_ref().map(|g| g.total_plays).unwrap_or(0),
                created_at: existing
                    .as_ref()
                    .map(|g| g.created_at)
                    .unwrap_or_else(chrono::Utc::now),
            };
            game_store.upsert(&game).await?;

            let prize_store = PrizeStore::new(storage);
            for prize_seed in &seed.prizes {
                let current = prize_store.get(&game.id, prize_seed.prize_id).await?;
                // Units already won stay consumed across re-seeds.
                let consumed = current
                    .as_ref()
                    .map(|p| p.supply_total.saturating_sub(p.supply_remaining))
                    .unwrap_or(0);

                let prize = Prize {
                    id: current
                        .as_ref()
                        .map(|p| p.id.clone())
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                    game_id: game.id.clone(),
                    prize_id: prize_seed.prize_id,
                    name: prize_seed.name.clone(),
                    tier: prize_seed.tier,
                    probability_bp: prize_seed.probability_bp,
                    supply_total: prize_seed.supply,
                    supply_remaining: prize_seed.supply.saturating_sub(consumed),
                    length_in: prize_seed.length_in,
                    width_in: prize_seed.width_in,
                    height_in: prize_seed.height_in,
                    weight_grams: prize_seed.weight_grams,
                    cost_usd_cents: prize_seed.cost_usd_cents,
                };
                prize_store.upsert(&prize).await?;
            }

            let total_bp: u32 = seed
                .prizes
                .iter()
                .map(|p| u32::from(p.probability_bp))
                .sum();
            println!(
                "Seeded game '{}' with {} prizes ({:.2}% win rate, {:.2}% no-win band)",
                game.name,
                seed.prizes.len(),
                f64::from(total_bp) / 100.0,
                f64::from(10_000 - total_bp) / 100.0,
            );
        }

        GameCommands::List => {
            let games = GameStore::new(storage).list().await?;
            if games.is_empty() {
                println!("No games seeded yet.");
                println!("Use 'gachapon game seed <file>' to load one.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Name", "Address", "Cost", "Active", "Plays"]);
            for game in games {
                table.add_row(vec![
                    game.name.clone(),
                    game.address.clone(),
                    format!("${:.2}", game.cost_usd_cents as f64 / 100.0),
                    if game.is_active { "yes" } else { "no" }.to_string(),
                    game.total_plays.to_string(),
                ]);
            }
            println!("{}", table);
        }

        GameCommands::Show { game } => {
            let game_store = GameStore::new(storage);
            let game = match game_store.get(&game).await? {
                Some(found) => found,
                None => game_store
                    .get_by_address(&game)
                    .await?
                    .ok_or(GachaponError::GameNotFound(game))?,
            };

            println!("Game '{}'", game.name);
            println!("  Id: {}", game.id);
            println!("  Address: {}", game.address);
            println!("  Token mint: {}", game.token_mint);
            println!(
                "  Cost: ${:.2} (paid in tokens with {} decimals)",
                game.cost_usd_cents as f64 / 100.0,
                game.token_decimals
            );
            println!("  Treasury: {}", game.treasury);
            println!("  Active: {}", game.is_active);
            println!("  Total plays: {}", game.total_plays);

            let prizes = PrizeStore::new(storage).list_for_game(&game.id).await?;
            if prizes.is_empty() {
                println!();
                println!("No prizes configured.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Id", "Name", "Tier", "Odds", "Supply", "Dimensions"]);
            for prize in prizes {
                table.add_row(vec![
                    prize.prize_id.to_string(),
                    prize.name.clone(),
                    prize.tier.to_string(),
                    format!("{:.2}%", f64::from(prize.probability_bp) / 100.0),
                    format!("{}/{}", prize.supply_remaining, prize.supply_total),
                    format!(
                        "{:.0}x{:.0}x{:.0}in {}g",
                        prize.length_in, prize.width_in, prize.height_in, prize.weight_grams
                    ),
                ]);
            }
            println!();
            println!("{}", table);
        }
    }

    Ok(())
}

fn validate_seed(seed: &GameSeed) -> Result<()> {
    if seed.prizes.is_empty() {
        return Err(GachaponError::validation("seed file has no prizes"));
    }

    let mut seen = HashSet::new();
    for prize in &seed.prizes {
        if !seen.insert(prize.prize_id) {
            return Err(GachaponError::validation(format!(
                "duplicate prize id {} in seed file",
                prize.prize_id
            )));
        }
    }

    let total_bp: u32 = seed
        .prizes
        .iter()
        .map(|p| u32::from(p.probability_bp))
        .sum();
    if total_bp > 10_000 {
        return Err(GachaponError::validation(format!(
            "prize probabilities sum to {} bp, cannot exceed 10000",
            total_bp
        )));
    }

    Ok(())
}

pub mod game_store;
pub mod nft_store;
pub mod play_store;
pub mod prize_store;
pub mod redemption_store;

pub use game_store::GameStore;
pub use nft_store::NftStore;
pub use play_store::PlayStore;
pub use prize_store::PrizeStore;
pub use redemption_store::RedemptionStore;

use crate::error::{GachaponError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GachaponError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // Games table (read side; admin tooling maintains it elsewhere)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                address TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                token_mint TEXT NOT NULL,
                token_decimals INTEGER NOT NULL,
                cost_usd_cents INTEGER NOT NULL,
                treasury TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                total_plays INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Plays table; the UNIQUE signature is the ingestion concurrency control
        conn.execute(
            "CREATE TABLE IF NOT EXISTS plays (
                id TEXT PRIMARY KEY,
                game_id TEXT NOT NULL,
                user_wallet TEXT NOT NULL,
                prize_id INTEGER,
                nft_mint TEXT,
                transaction_signature TEXT UNIQUE NOT NULL,
                random_value TEXT NOT NULL,
                token_amount_paid INTEGER NOT NULL,
                payment TEXT,
                payment_usd_value REAL,
                status TEXT NOT NULL,
                played_at INTEGER NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id)
            )",
            [],
        )?;

        // Prizes table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS prizes (
                id TEXT PRIMARY KEY,
                game_id TEXT NOT NULL,
                prize_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                tier TEXT NOT NULL,
                probability_bp INTEGER NOT NULL,
                supply_total INTEGER NOT NULL,
                supply_remaining INTEGER NOT NULL,
                length_in REAL NOT NULL,
                width_in REAL NOT NULL,
                height_in REAL NOT NULL,
                weight_grams INTEGER NOT NULL,
                cost_usd_cents INTEGER NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id),
                UNIQUE (game_id, prize_id)
            )",
            [],
        )?;

        // NFTs table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nfts (
                mint_address TEXT PRIMARY KEY,
                prize_id INTEGER NOT NULL,
                game_id TEXT NOT NULL,
                current_owner TEXT NOT NULL,
                is_redeemed INTEGER NOT NULL DEFAULT 0,
                redemption_tx TEXT,
                minted_at INTEGER NOT NULL,
                redeemed_at INTEGER,
                FOREIGN KEY (game_id) REFERENCES games(id)
            )",
            [],
        )?;

        // Ownership projection, reconciled from chain snapshots
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nft_ownership (
                mint_address TEXT NOT NULL,
                owner TEXT NOT NULL,
                amount INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (mint_address, owner)
            )",
            [],
        )?;

        // Redemptions table; the UNIQUE mint serializes concurrent claims
        conn.execute(
            "CREATE TABLE IF NOT EXISTS redemptions (
                id TEXT PRIMARY KEY,
                nft_mint TEXT UNIQUE NOT NULL,
                user_wallet TEXT NOT NULL,
                prize_id INTEGER NOT NULL,
                shipment_provider TEXT NOT NULL,
                shipment_id TEXT NOT NULL,
                tracking_number TEXT,
                carrier TEXT,
                carrier_code TEXT,
                label_pdf_url TEXT,
                label_png_url TEXT,
                tracking_url TEXT,
                status TEXT NOT NULL,
                estimated_delivery INTEGER,
                redeemed_at INTEGER NOT NULL,
                shipped_at INTEGER,
                delivered_at INTEGER,
                failure_reason TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                data_deletion_scheduled_at INTEGER
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

use crate::error::{GachaponError, Result};
use crate::storage::Storage;
use crate::types::{Nft, PaymentState, Play, PlayStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub struct PlayStore<'a> {
    storage: &'a Storage,
}

impl<'a> PlayStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Insert a freshly ingested play. Returns false when a row with the
    /// same transaction signature already exists; the unique constraint is
    /// the only duplicate-delivery guard, there is no read-then-write.
    pub async fn insert_pending(&self, play: &Play) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO plays
             (id, game_id, user_wallet, prize_id, nft_mint, transaction_signature,
              random_value, token_amount_paid, payment, payment_usd_value, status, played_at)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5, ?6, NULL, NULL, ?7, ?8)",
            params![
                play.id,
                play.game_id,
                play.user_wallet,
                play.transaction_signature,
                play.random_value,
                play.token_amount_paid as i64,
                play.status.as_str(),
                play.played_at.timestamp(),
            ],
        )?;

        if inserted > 0 {
            tracing::info!(
                "Recorded play {} for signature {}",
                play.id,
                play.transaction_signature
            );
        }
        Ok(inserted > 0)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Play>> {
        let conn = self.storage.get_connection().await;
        let play = conn
            .query_row(
                "SELECT id, game_id, user_wallet, prize_id, nft_mint, transaction_signature,
                        random_value, token_amount_paid, payment, payment_usd_value, status,
                        played_at
                 FROM plays WHERE id = ?1",
                params![id],
                row_to_play,
            )
            .optional()?;
        Ok(play)
    }

    pub async fn get_by_signature(&self, signature: &str) -> Result<Option<Play>> {
        let conn = self.storage.get_connection().await;
        let play = conn
            .query_row(
                "SELECT id, game_id, user_wallet, prize_id, nft_mint, transaction_signature,
                        random_value, token_amount_paid, payment, payment_usd_value, status,
                        played_at
                 FROM plays WHERE transaction_signature = ?1",
                params![signature],
                row_to_play,
            )
            .optional()?;
        Ok(play)
    }

    /// Replace the server-side random value with the on-chain one. Only a
    /// still-pending play adopts it; terminal plays keep what they drew.
    pub async fn adopt_random_value(&self, signature: &str, random_hex: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE plays SET random_value = ?1
             WHERE transaction_signature = ?2 AND status = 'pending'",
            params![random_hex, signature],
        )?;
        Ok(changed > 0)
    }

    /// Persist the payment verdict. The `payment IS NULL` guard makes the
    /// verdict write-once; a rejected verdict also fails the play so it can
    /// never be finalized. Returns false when a verdict already exists.
    pub async fn record_verdict(
        &self,
        play_id: &str,
        state: PaymentState,
        actual_usd_value: f64,
    ) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let changed = match state {
            PaymentState::Verified => conn.execute(
                "UPDATE plays SET payment = 'verified', payment_usd_value = ?1
                 WHERE id = ?2 AND payment IS NULL AND status = 'pending'",
                params![actual_usd_value, play_id],
            )?,
            PaymentState::Rejected => conn.execute(
                "UPDATE plays SET payment = 'rejected', payment_usd_value = ?1, status = 'failed'
                 WHERE id = ?2 AND payment IS NULL AND status = 'pending'",
                params![actual_usd_value, play_id],
            )?,
        };

        Ok(changed > 0)
    }

    /// Commit a winning outcome atomically: decrement the prize supply,
    /// complete the play and mint the NFT, all in one transaction. The
    /// conditional decrement is the supply guard; when it touches no row
    /// the whole transaction rolls back and the caller resolves the play
    /// as a no-win. Never redraws.
    pub async fn commit_win(&self, play_id: &str, nft: &Nft) -> Result<bool> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let decremented = tx.execute(
            "UPDATE prizes SET supply_remaining = supply_remaining - 1
             WHERE game_id = ?1 AND prize_id = ?2 AND supply_remaining > 0",
            params![nft.game_id, nft.prize_id],
        )?;
        if decremented == 0 {
            return Ok(false);
        }

        let claimed = tx.execute(
            "UPDATE plays SET status = 'completed', prize_id = ?1, nft_mint = ?2
             WHERE id = ?3 AND status = 'pending' AND payment = 'verified'",
            params![nft.prize_id, nft.mint_address, play_id],
        )?;
        if claimed == 0 {
            return Err(GachaponError::conflict(format!(
                "play {} is not pending-verified",
                play_id
            )));
        }

        tx.execute(
            "INSERT INTO nfts
             (mint_address, prize_id, game_id, current_owner, is_redeemed, minted_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                nft.mint_address,
                nft.prize_id,
                nft.game_id,
                nft.current_owner,
                nft.minted_at.timestamp(),
            ],
        )?;

        tx.execute(
            "INSERT INTO nft_ownership (mint_address, owner, amount, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(mint_address, owner) DO UPDATE SET
                 amount = excluded.amount,
                 updated_at = excluded.updated_at",
            params![nft.mint_address, nft.current_owner, Utc::now().timestamp()],
        )?;

        tx.commit()?;

        tracing::info!(
            "Play {} won prize {} -> minted {}",
            play_id,
            nft.prize_id,
            nft.mint_address
        );
        Ok(true)
    }

    /// Terminal no-win. Guarded so a completed play can never regress.
    pub async fn mark_failed(&self, play_id: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE plays SET status = 'failed' WHERE id = ?1 AND status = 'pending'",
            params![play_id],
        )?;
        Ok(changed > 0)
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Play>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT id, game_id, user_wallet, prize_id, nft_mint, transaction_signature,
                    random_value, token_amount_paid, payment, payment_usd_value, status,
                    played_at
             FROM plays ORDER BY played_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_play)?;

        let mut plays = Vec::new();
        for play in rows {
            plays.push(play?);
        }
        Ok(plays)
    }

    pub async fn list_for_wallet(&self, wallet: &str, limit: u32) -> Result<Vec<Play>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT id, game_id, user_wallet, prize_id, nft_mint, transaction_signature,
                    random_value, token_amount_paid, payment, payment_usd_value, status,
                    played_at
             FROM plays WHERE user_wallet = ?1 ORDER BY played_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![wallet, limit], row_to_play)?;

        let mut plays = Vec::new();
        for play in rows {
            plays.push(play?);
        }
        Ok(plays)
    }
}

fn row_to_play(row: &rusqlite::Row<'_>) -> rusqlite::Result<Play> {
    let payment_str: Option<String> = row.get(8)?;
    let status_str: String = row.get(10)?;
    let played_at: i64 = row.get(11)?;

    let payment = match payment_str {
        Some(s) => Some(s.parse::<PaymentState>().map_err(|_| {
            rusqlite::Error::InvalidColumnType(8, "payment".to_string(), rusqlite::types::Type::Text)
        })?),
        None => None,
    };

    let status: PlayStatus = status_str.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(10, "status".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(Play {
        id: row.get(0)?,
        game_id: row.get(1)?,
        user_wallet: row.get(2)?,
        prize_id: row.get::<_, Option<i64>>(3)?.map(|v| v as u32),
        nft_mint: row.get(4)?,
        transaction_signature: row.get(5)?,
        random_value: row.get(6)?,
        token_amount_paid: row.get::<_, i64>(7)? as u64,
        payment,
        payment_usd_value: row.get(9)?,
        status,
        played_at: DateTime::from_timestamp(played_at, 0).unwrap_or_else(Utc::now),
    })
}

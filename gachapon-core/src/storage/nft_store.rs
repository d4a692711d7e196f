use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Nft, NftOwnership};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub struct NftStore<'a> {
    storage: &'a Storage,
}

impl<'a> NftStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn insert(&self, nft: &Nft) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO nfts
             (mint_address, prize_id, game_id, current_owner, is_redeemed,
              redemption_tx, minted_at, redeemed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                nft.mint_address,
                nft.prize_id,
                nft.game_id,
                nft.current_owner,
                nft.is_redeemed,
                nft.redemption_tx,
                nft.minted_at.timestamp(),
                nft.redeemed_at.map(|t| t.timestamp()),
            ],
        )?;

        Ok(())
    }

    pub async fn get(&self, mint_address: &str) -> Result<Option<Nft>> {
        let conn = self.storage.get_connection().await;
        let nft = conn
            .query_row(
                "SELECT mint_address, prize_id, game_id, current_owner, is_redeemed,
                        redemption_tx, minted_at, redeemed_at
                 FROM nfts WHERE mint_address = ?1",
                params![mint_address],
                row_to_nft,
            )
            .optional()?;
        Ok(nft)
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<Nft>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT mint_address, prize_id, game_id, current_owner, is_redeemed,
                    redemption_tx, minted_at, redeemed_at
             FROM nfts WHERE current_owner = ?1 ORDER BY minted_at DESC",
        )?;
        let rows = stmt.query_map(params![owner], row_to_nft)?;

        let mut nfts = Vec::new();
        for nft in rows {
            nfts.push(nft?);
        }
        Ok(nfts)
    }

    /// Flip the redeemed flag exactly once. Returns false when the NFT was
    /// already redeemed (or does not exist).
    pub async fn mark_redeemed(
        &self,
        mint_address: &str,
        redemption_id: &str,
        redeemed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE nfts SET is_redeemed = 1, redemption_tx = ?1, redeemed_at = ?2
             WHERE mint_address = ?3 AND is_redeemed = 0",
            params![redemption_id, redeemed_at.timestamp(), mint_address],
        )?;
        Ok(changed > 0)
    }

    /// Apply one chain-side holding snapshot to the ownership projection.
    /// A positive balance promotes the holder to `current_owner` so a
    /// secondary-market buyer can redeem; redeemed NFTs never change hands.
    pub async fn sync_ownership(&self, mint_address: &str, owner: &str, amount: u64) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO nft_ownership (mint_address, owner, amount, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(mint_address, owner) DO UPDATE SET
                 amount = excluded.amount,
                 updated_at = excluded.updated_at",
            params![mint_address, owner, amount as i64, Utc::now().timestamp()],
        )?;

        if amount > 0 {
            conn.execute(
                "UPDATE nfts SET current_owner = ?1
                 WHERE mint_address = ?2 AND is_redeemed = 0",
                params![owner, mint_address],
            )?;
        }

        tracing::debug!(
            "Ownership sync: {} holds {} of {}",
            owner,
            amount,
            mint_address
        );
        Ok(())
    }

    pub async fn get_ownership(&self, mint_address: &str) -> Result<Vec<NftOwnership>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT mint_address, owner, amount, updated_at
             FROM nft_ownership WHERE mint_address = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![mint_address], |row| {
            let updated_at: i64 = row.get(3)?;
            Ok(NftOwnership {
                mint_address: row.get(0)?,
                owner: row.get(1)?,
                amount: row.get::<_, i64>(2)? as u64,
                updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_else(Utc::now),
            })
        })?;

        let mut holdings = Vec::new();
        for holding in rows {
            holdings.push(holding?);
        }
        Ok(holdings)
    }
}

fn row_to_nft(row: &rusqlite::Row<'_>) -> rusqlite::Result<Nft> {
    let minted_at: i64 = row.get(6)?;
    let redeemed_at: Option<i64> = row.get(7)?;
    Ok(Nft {
        mint_address: row.get(0)?,
        prize_id: row.get::<_, i64>(1)? as u32,
        game_id: row.get(2)?,
        current_owner: row.get(3)?,
        is_redeemed: row.get(4)?,
        redemption_tx: row.get(5)?,
        minted_at: DateTime::from_timestamp(minted_at, 0).unwrap_or_else(Utc::now),
        redeemed_at: redeemed_at.and_then(|t| DateTime::from_timestamp(t, 0)),
    })
}

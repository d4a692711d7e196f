use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Redemption, RedemptionStatus, ShipmentLabel};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub struct RedemptionStore<'a> {
    storage: &'a Storage,
}

impl<'a> RedemptionStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// The claim. The unique mint constraint serializes concurrent
    /// redemption attempts; exactly one caller sees true, the rest must
    /// surface a conflict to their user.
    pub async fn try_claim(&self, redemption: &Redemption) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO redemptions
             (id, nft_mint, user_wallet, prize_id, shipment_provider, shipment_id,
              status, redeemed_at, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                redemption.id,
                redemption.nft_mint,
                redemption.user_wallet,
                redemption.prize_id,
                redemption.shipment_provider,
                redemption.shipment_id,
                redemption.status.as_str(),
                redemption.redeemed_at.timestamp(),
            ],
        )?;

        if inserted > 0 {
            tracing::info!(
                "Redemption {} claimed NFT {}",
                redemption.id,
                redemption.nft_mint
            );
        }
        Ok(inserted > 0)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Redemption>> {
        let conn = self.storage.get_connection().await;
        let redemption = conn
            .query_row(
                &format!("SELECT {} FROM redemptions WHERE id = ?1", COLUMNS),
                params![id],
                row_to_redemption,
            )
            .optional()?;
        Ok(redemption)
    }

    pub async fn get_by_mint(&self, nft_mint: &str) -> Result<Option<Redemption>> {
        let conn = self.storage.get_connection().await;
        let redemption = conn
            .query_row(
                &format!("SELECT {} FROM redemptions WHERE nft_mint = ?1", COLUMNS),
                params![nft_mint],
                row_to_redemption,
            )
            .optional()?;
        Ok(redemption)
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Redemption>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM redemptions ORDER BY redeemed_at DESC LIMIT ?1",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], row_to_redemption)?;

        let mut redemptions = Vec::new();
        for redemption in rows {
            redemptions.push(redemption?);
        }
        Ok(redemptions)
    }

    /// Advance to shipped with the carrier artifacts. Valid from
    /// `processing` (first attempt) or `failed` (retry).
    pub async fn record_shipped(
        &self,
        id: &str,
        label: &ShipmentLabel,
        shipped_at: DateTime<Utc>,
        data_deletion_scheduled_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE redemptions SET
                 status = 'shipped',
                 tracking_number = ?1,
                 carrier = ?2,
                 carrier_code = ?3,
                 label_pdf_url = ?4,
                 label_png_url = ?5,
                 tracking_url = ?6,
                 estimated_delivery = ?7,
                 shipped_at = ?8,
                 data_deletion_scheduled_at = ?9,
                 failure_reason = NULL
             WHERE id = ?10 AND status IN ('processing', 'failed')",
            params![
                label.tracking_number,
                label.carrier,
                label.carrier_code,
                label.label_pdf_url,
                label.label_png_url,
                label.tracking_url,
                label.estimated_delivery.map(|t| t.timestamp()),
                shipped_at.timestamp(),
                data_deletion_scheduled_at.timestamp(),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Record a failed label attempt and bump the retry counter.
    pub async fn record_failure(&self, id: &str, reason: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE redemptions SET
                 status = 'failed',
                 failure_reason = ?1,
                 retry_count = retry_count + 1
             WHERE id = ?2 AND status IN ('processing', 'failed')",
            params![reason, id],
        )?;
        Ok(changed > 0)
    }

    /// Carrier confirmed delivery; reschedules the PII purge relative to
    /// the actual delivery date.
    pub async fn mark_delivered(
        &self,
        nft_mint: &str,
        delivered_at: DateTime<Utc>,
        data_deletion_scheduled_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let changed = conn.execute(
            "UPDATE redemptions SET
                 status = 'delivered',
                 delivered_at = ?1,
                 data_deletion_scheduled_at = ?2
             WHERE nft_mint = ?3 AND status = 'shipped'",
            params![
                delivered_at.timestamp(),
                data_deletion_scheduled_at.timestamp(),
                nft_mint,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Null out address-bearing label artifacts whose retention has lapsed.
    /// Tracking numbers survive for carrier support lookups.
    pub async fn purge_expired_pii(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.storage.get_connection().await;
        let purged = conn.execute(
            "UPDATE redemptions SET
                 label_pdf_url = NULL,
                 label_png_url = NULL,
                 tracking_url = NULL
             WHERE data_deletion_scheduled_at IS NOT NULL
               AND data_deletion_scheduled_at <= ?1
               AND (label_pdf_url IS NOT NULL
                    OR label_png_url IS NOT NULL
                    OR tracking_url IS NOT NULL)",
            params![now.timestamp()],
        )?;

        if purged > 0 {
            tracing::info!("Purged shipping artifacts from {} redemptions", purged);
        }
        Ok(purged)
    }
}

const COLUMNS: &str = "id, nft_mint, user_wallet, prize_id, shipment_provider, shipment_id, \
     tracking_number, carrier, carrier_code, label_pdf_url, label_png_url, tracking_url, \
     status, estimated_delivery, redeemed_at, shipped_at, delivered_at, failure_reason, \
     retry_count, data_deletion_scheduled_at";

fn row_to_redemption(row: &rusqlite::Row<'_>) -> rusqlite::Result<Redemption> {
    let status_str: String = row.get(12)?;
    let status: RedemptionStatus = status_str.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(12, "status".to_string(), rusqlite::types::Type::Text)
    })?;

    let estimated_delivery: Option<i64> = row.get(13)?;
    let redeemed_at: i64 = row.get(14)?;
    let shipped_at: Option<i64> = row.get(15)?;
    let delivered_at: Option<i64> = row.get(16)?;
    let deletion_at: Option<i64> = row.get(19)?;

    Ok(Redemption {
        id: row.get(0)?,
        nft_mint: row.get(1)?,
        user_wallet: row.get(2)?,
        prize_id: row.get::<_, i64>(3)? as u32,
        shipment_provider: row.get(4)?,
        shipment_id: row.get(5)?,
        tracking_number: row.get(6)?,
        carrier: row.get(7)?,
        carrier_code: row.get(8)?,
        label_pdf_url: row.get(9)?,
        label_png_url: row.get(10)?,
        tracking_url: row.get(11)?,
        status,
        estimated_delivery: estimated_delivery.and_then(|t| DateTime::from_timestamp(t, 0)),
        redeemed_at: DateTime::from_timestamp(redeemed_at, 0).unwrap_or_else(Utc::now),
        shipped_at: shipped_at.and_then(|t| DateTime::from_timestamp(t, 0)),
        delivered_at: delivered_at.and_then(|t| DateTime::from_timestamp(t, 0)),
        failure_reason: row.get(17)?,
        retry_count: row.get::<_, i64>(18)? as u32,
        data_deletion_scheduled_at: deletion_at.and_then(|t| DateTime::from_timestamp(t, 0)),
    })
}

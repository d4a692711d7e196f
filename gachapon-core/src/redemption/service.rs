use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProtocolConfig;
use crate::error::{GachaponError, Result};
use crate::redemption::auth::{verify_auth, RedemptionAuth};
use crate::redemption::crypto::decrypt_shipping_data;
use crate::shipping::{grams_to_lbs, select_box};
use crate::storage::{NftStore, PrizeStore, RedemptionStore, Storage};
use crate::types::{Prize, Redemption, RedemptionStatus, ShipmentLabel, ShippingAddress};

/// What the label provider needs to print postage: the chosen box, the
/// billable weight, and the destination. `shipment_id` is stable across
/// retries so the provider can deduplicate on its side.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub shipment_id: String,
    pub box_name: String,
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
    pub billable_weight_lbs: f64,
    pub requires_additional_handling: bool,
    pub address: ShippingAddress,
}

/// Carrier label purchase, consumed as a black box.
#[async_trait]
pub trait LabelService: Send + Sync {
    async fn purchase_label(&self, request: &LabelRequest) -> Result<ShipmentLabel>;
}

/// A wallet's request to redeem an NFT for the physical prize. The address
/// arrives encrypted and is resubmitted on every retry; the service never
/// stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub nft_mint: String,
    pub user_wallet: String,
    pub message: String,
    pub signature: String,
    pub timestamp_ms: i64,
    pub encrypted_shipping_data: String,
}

/// Turns a redeemed NFT into a shipped parcel.
///
/// `redeem` runs the full gauntlet: wallet signature, replay window,
/// ownership, address decryption. Only after all of those pass does it
/// claim the mint, and the unique redemption row per mint is what makes
/// concurrent redeem calls safe. Label purchases that fail leave the row
/// in `failed` for a bounded number of `retry` calls.
pub struct RedemptionService {
    storage: Arc<Storage>,
    labels: Arc<dyn LabelService>,
    config: ProtocolConfig,
}

impl RedemptionService {
    pub fn new(storage: Arc<Storage>, labels: Arc<dyn LabelService>, config: ProtocolConfig) -> Self {
        Self {
            storage,
            labels,
            config,
        }
    }

    /// Redeem an NFT: validate everything, claim the mint, buy the label.
    ///
    /// A label-purchase failure is returned to the caller after the row is
    /// parked in `failed`; the claim itself is never rolled back, so the
    /// caller retries the shipment, not the redemption.
    pub async fn redeem(&self, request: &RedeemRequest) -> Result<Redemption> {
        self.check_auth(request)?;

        let nfts = NftStore::new(&self.storage);
        let nft = nfts
            .get(&request.nft_mint)
            .await?
            .ok_or_else(|| GachaponError::validation("Unknown NFT"))?;

        if nft.current_owner != request.user_wallet {
            return Err(GachaponError::conflict(
                "NFT is not held by the requesting wallet",
            ));
        }
        if nft.is_redeemed {
            return Err(GachaponError::conflict("NFT has already been redeemed"));
        }

        // Decrypt before any mutation so a bad payload costs nothing.
        let key = self.config.shipping_key_bytes()?;
        let address = decrypt_shipping_data(&key, &request.encrypted_shipping_data)?;

        let prize = PrizeStore::new(&self.storage)
            .get(&nft.game_id, nft.prize_id)
            .await?
            .ok_or_else(|| {
                GachaponError::internal(format!(
                    "NFT {} references missing prize {} in game {}",
                    nft.mint_address, nft.prize_id, nft.game_id
                ))
            })?;

        let now = Utc::now();
        let redemption = Redemption {
            id: uuid::Uuid::new_v4().to_string(),
            nft_mint: nft.mint_address.clone(),
            user_wallet: request.user_wallet.clone(),
            prize_id: nft.prize_id,
            shipment_provider: self.config.shipment_provider.clone(),
            shipment_id: uuid::Uuid::new_v4().to_string(),
            tracking_number: None,
            carrier: None,
            carrier_code: None,
            label_pdf_url: None,
            label_png_url: None,
            tracking_url: None,
            status: RedemptionStatus::Processing,
            estimated_delivery: None,
            redeemed_at: now,
            shipped_at: None,
            delivered_at: None,
            failure_reason: None,
            retry_count: 0,
            data_deletion_scheduled_at: None,
        };

        let redemptions = RedemptionStore::new(&self.storage);
        if !redemptions.try_claim(&redemption).await? {
            return Err(GachaponError::conflict(
                "A redemption for this NFT already exists",
            ));
        }
        if !nfts
            .mark_redeemed(&nft.mint_address, &redemption.id, now)
            .await?
        {
            return Err(GachaponError::conflict("NFT has already been redeemed"));
        }

        self.ship(&redemption.id, &redemption.shipment_id, &prize, address)
            .await
    }

    /// Retry the label purchase for a failed redemption. Requires the same
    /// wallet-signed authorization as `redeem` plus a freshly resubmitted
    /// encrypted address, since the original was never stored.
    pub async fn retry(&self, request: &RedeemRequest) -> Result<Redemption> {
        self.check_auth(request)?;

        let redemptions = RedemptionStore::new(&self.storage);
        let redemption = redemptions
            .get_by_mint(&request.nft_mint)
            .await?
            .ok_or_else(|| GachaponError::validation("No redemption exists for this NFT"))?;

        // Bind the retry to the wallet that redeemed; outsiders learn
        // nothing about whose redemption it is.
        if redemption.user_wallet != request.user_wallet {
            return Err(GachaponError::Authentication);
        }
        if redemption.status != RedemptionStatus::Failed {
            return Err(GachaponError::conflict(format!(
                "Redemption is {} and cannot be retried",
                redemption.status
            )));
        }
        if redemption.retry_count >= self.config.max_label_retries {
            return Err(GachaponError::conflict(
                "Label retry limit reached; contact support",
            ));
        }

        let key = self.config.shipping_key_bytes()?;
        let address = decrypt_shipping_data(&key, &request.encrypted_shipping_data)?;

        let nft = NftStore::new(&self.storage)
            .get(&request.nft_mint)
            .await?
            .ok_or_else(|| {
                GachaponError::internal(format!(
                    "Redemption {} has no NFT row for mint {}",
                    redemption.id, request.nft_mint
                ))
            })?;
        let prize = PrizeStore::new(&self.storage)
            .get(&nft.game_id, nft.prize_id)
            .await?
            .ok_or_else(|| {
                GachaponError::internal(format!(
                    "NFT {} references missing prize {} in game {}",
                    nft.mint_address, nft.prize_id, nft.game_id
                ))
            })?;

        self.ship(&redemption.id, &redemption.shipment_id, &prize, address)
            .await
    }

    /// Repackage the prize, buy the label, and advance the row. On failure
    /// the row is marked `failed` and the provider error goes back to the
    /// caller.
    async fn ship(
        &self,
        redemption_id: &str,
        shipment_id: &str,
        prize: &Prize,
        address: ShippingAddress,
    ) -> Result<Redemption> {
        let selection = select_box(
            prize.length_in,
            prize.width_in,
            prize.height_in,
            grams_to_lbs(prize.weight_grams),
            self.config.dim_divisor,
        );
        let request = LabelRequest {
            shipment_id: shipment_id.to_string(),
            box_name: selection.box_spec.name.clone(),
            length_in: selection.box_spec.length_in,
            width_in: selection.box_spec.width_in,
            height_in: selection.box_spec.height_in,
            billable_weight_lbs: selection.billable_weight_lbs,
            requires_additional_handling: selection.requires_additional_handling,
            address,
        };

        let redemptions = RedemptionStore::new(&self.storage);
        match self.labels.purchase_label(&request).await {
            Ok(label) => {
                let shipped_at = Utc::now();
                // Without delivery confirmation the purge is scheduled off
                // the worst-case transit horizon.
                let deletion_at = shipped_at
                    + Duration::days(
                        self.config.delivery_horizon_days + self.config.pii_retention_days,
                    );
                if !redemptions
                    .record_shipped(redemption_id, &label, shipped_at, deletion_at)
                    .await?
                {
                    return Err(GachaponError::internal(format!(
                        "Redemption {} refused the shipped transition",
                        redemption_id
                    )));
                }
                info!(
                    "Redemption {} shipped, tracking {}",
                    redemption_id, label.tracking_number
                );
                self.require(redemption_id).await
            }
            Err(err) => {
                redemptions
                    .record_failure(redemption_id, &err.to_string())
                    .await?;
                warn!("Label purchase failed for redemption {}: {}", redemption_id, err);
                Err(err)
            }
        }
    }

    /// Carrier confirmed delivery. Moves the purge schedule from the
    /// shipping horizon to the actual delivery date plus retention.
    pub async fn confirm_delivered(
        &self,
        nft_mint: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<Redemption> {
        let redemptions = RedemptionStore::new(&self.storage);
        let redemption = redemptions
            .get_by_mint(nft_mint)
            .await?
            .ok_or_else(|| GachaponError::validation("No redemption exists for this NFT"))?;

        let deletion_at = delivered_at + Duration::days(self.config.pii_retention_days);
        if !redemptions
            .mark_delivered(nft_mint, delivered_at, deletion_at)
            .await?
        {
            return Err(GachaponError::conflict(format!(
                "Redemption is {} and cannot be marked delivered",
                redemption.status
            )));
        }

        info!("Redemption {} delivered", redemption.id);
        self.require(&redemption.id).await
    }

    /// Null out address-bearing label artifacts past their retention date.
    /// Meant to run on a schedule; returns how many rows were scrubbed.
    pub async fn purge_expired_pii(&self, now: DateTime<Utc>) -> Result<usize> {
        RedemptionStore::new(&self.storage)
            .purge_expired_pii(now)
            .await
    }

    /// Full redemption record for a mint, tracking URLs included once
    /// shipped.
    pub async fn status(&self, nft_mint: &str) -> Result<Option<Redemption>> {
        RedemptionStore::new(&self.storage)
            .get_by_mint(nft_mint)
            .await
    }

    fn check_auth(&self, request: &RedeemRequest) -> Result<()> {
        let auth = RedemptionAuth {
            user_wallet: &request.user_wallet,
            nft_mint: &request.nft_mint,
            message: &request.message,
            signature: &request.signature,
            timestamp_ms: request.timestamp_ms,
        };
        verify_auth(
            &auth,
            Utc::now(),
            Duration::seconds(self.config.replay_window_secs),
            Duration::seconds(self.config.future_skew_secs),
        )
    }

    async fn require(&self, redemption_id: &str) -> Result<Redemption> {
        RedemptionStore::new(&self.storage)
            .get(redemption_id)
            .await?
            .ok_or_else(|| {
                GachaponError::internal(format!("Redemption {} disappeared", redemption_id))
            })
    }
}

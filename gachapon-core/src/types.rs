use crate::error::GachaponError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered gachapon machine. Maintained by out-of-scope admin tooling;
/// the protocol only reads it (and bumps `total_plays` on finalization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    /// On-chain game account, base58. Incoming plays are resolved by this.
    pub address: String,
    pub name: String,
    pub token_mint: String,
    pub token_decimals: u8,
    pub cost_usd_cents: u64,
    pub treasury: String,
    pub is_active: bool,
    pub total_plays: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Pending,
    Completed,
    Failed,
}

impl PlayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayStatus::Pending => "pending",
            PlayStatus::Completed => "completed",
            PlayStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlayStatus::Pending)
    }
}

impl FromStr for PlayStatus {
    type Err = GachaponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlayStatus::Pending),
            "completed" => Ok(PlayStatus::Completed),
            "failed" => Ok(PlayStatus::Failed),
            other => Err(GachaponError::validation(format!(
                "unknown play status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PlayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Verified,
    Rejected,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Verified => "verified",
            PaymentState::Rejected => "rejected",
        }
    }
}

impl FromStr for PaymentState {
    type Err = GachaponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(PaymentState::Verified),
            "rejected" => Ok(PaymentState::Rejected),
            other => Err(GachaponError::validation(format!(
                "unknown payment state: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paid spin of a machine. Exactly one row per on-chain transaction
/// signature; `status` leaves `pending` exactly once and never reverses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub id: String,
    pub game_id: String,
    pub user_wallet: String,
    /// Within-game prize index, set on a winning finalization.
    pub prize_id: Option<u32>,
    pub nft_mint: Option<String>,
    pub transaction_signature: String,
    /// 32 bytes, hex. Server-generated at ingest, replaced by the on-chain
    /// value when the finalize instruction arrives.
    pub random_value: String,
    pub token_amount_paid: u64,
    /// None until the payment verifier has ruled. Written exactly once,
    /// strictly before any prize outcome is computed.
    pub payment: Option<PaymentState>,
    /// USD value the verifier measured, kept so verdict replays never
    /// re-query the oracle.
    pub payment_usd_value: Option<f64>,
    pub status: PlayStatus,
    pub played_at: DateTime<Utc>,
}

impl Play {
    pub fn random_value_bytes(&self) -> crate::error::Result<[u8; 32]> {
        let bytes = hex::decode(&self.random_value)
            .map_err(|_| GachaponError::validation("random value is not valid hex"))?;
        bytes
            .try_into()
            .map_err(|_| GachaponError::validation("random value must be 32 bytes"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeTier {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl PrizeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeTier::Common => "common",
            PrizeTier::Uncommon => "uncommon",
            PrizeTier::Rare => "rare",
            PrizeTier::Legendary => "legendary",
        }
    }
}

impl FromStr for PrizeTier {
    type Err = GachaponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(PrizeTier::Common),
            "uncommon" => Ok(PrizeTier::Uncommon),
            "rare" => Ok(PrizeTier::Rare),
            "legendary" => Ok(PrizeTier::Legendary),
            other => Err(GachaponError::validation(format!(
                "unknown prize tier: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PrizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical prize stocked in a machine. Dimensions are inches, weight is
/// grams; both feed the shipping calculator at redemption time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prize {
    pub id: String,
    pub game_id: String,
    /// Within-game index, matches the on-chain prize table.
    pub prize_id: u32,
    pub name: String,
    pub tier: PrizeTier,
    /// Win probability out of 10000. A game's prizes may sum below 10000;
    /// the remainder is the no-win band.
    pub probability_bp: u16,
    pub supply_total: u32,
    pub supply_remaining: u32,
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
    pub weight_grams: u32,
    pub cost_usd_cents: u64,
}

/// Collectible issued for a winning play. `is_redeemed` flips once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nft {
    pub mint_address: String,
    pub prize_id: u32,
    pub game_id: String,
    pub current_owner: String,
    pub is_redeemed: bool,
    pub redemption_tx: Option<String>,
    pub minted_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// Chain-side holdings projection, keyed (mint, owner). Reconciled from
/// chain snapshots; distinct from `Nft::current_owner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftOwnership {
    pub mint_address: String,
    pub owner: String,
    pub amount: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Processing,
    Shipped,
    Delivered,
    Failed,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Processing => "processing",
            RedemptionStatus::Shipped => "shipped",
            RedemptionStatus::Delivered => "delivered",
            RedemptionStatus::Failed => "failed",
        }
    }
}

impl FromStr for RedemptionStatus {
    type Err = GachaponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(RedemptionStatus::Processing),
            "shipped" => Ok(RedemptionStatus::Shipped),
            "delivered" => Ok(RedemptionStatus::Delivered),
            "failed" => Ok(RedemptionStatus::Failed),
            other => Err(GachaponError::validation(format!(
                "unknown redemption status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipment record for a redeemed NFT. At most one per mint; the decrypted
/// shipping address is never stored, only the carrier artifacts are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub nft_mint: String,
    pub user_wallet: String,
    pub prize_id: u32,
    pub shipment_provider: String,
    pub shipment_id: String,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub carrier_code: Option<String>,
    pub label_pdf_url: Option<String>,
    pub label_png_url: Option<String>,
    pub tracking_url: Option<String>,
    pub status: RedemptionStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub redeemed_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub data_deletion_scheduled_at: Option<DateTime<Utc>>,
}

/// Payment verifier ruling for a play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerdict {
    pub status: PaymentState,
    pub message: String,
    pub actual_usd_value: f64,
}

/// Finalizer ruling for a play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub status: PlayStatus,
    pub prize_id: Option<u32>,
    pub nft_mint: Option<String>,
    pub message: String,
}

/// Carrier artifacts returned by a label purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentLabel {
    pub tracking_number: String,
    pub carrier: String,
    pub carrier_code: String,
    pub label_pdf_url: String,
    pub label_png_url: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// Decrypted shipping destination. Lives only on the stack between
/// decryption and the label purchase call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_status_round_trips() {
        let cases = [
            (PlayStatus::Pending, "pending"),
            (PlayStatus::Completed, "completed"),
            (PlayStatus::Failed, "failed"),
        ];
        for (status, s) in cases {
            assert_eq!(status.as_str(), s);
            assert_eq!(s.parse::<PlayStatus>().unwrap(), status);
        }
        assert!("done".parse::<PlayStatus>().is_err());
    }

    #[test]
    fn redemption_status_round_trips() {
        let cases = [
            (RedemptionStatus::Processing, "processing"),
            (RedemptionStatus::Shipped, "shipped"),
            (RedemptionStatus::Delivered, "delivered"),
            (RedemptionStatus::Failed, "failed"),
        ];
        for (status, s) in cases {
            assert_eq!(status.as_str(), s);
            assert_eq!(s.parse::<RedemptionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn prize_tier_round_trips() {
        for s in ["common", "uncommon", "rare", "legendary"] {
            assert_eq!(s.parse::<PrizeTier>().unwrap().as_str(), s);
        }
        assert!("mythic".parse::<PrizeTier>().is_err());
    }

    #[test]
    fn random_value_decodes_to_32_bytes() {
        let play = Play {
            id: "p".into(),
            game_id: "g".into(),
            user_wallet: "w".into(),
            prize_id: None,
            nft_mint: None,
            transaction_signature: "sig".into(),
            random_value: hex::encode([7u8; 32]),
            token_amount_paid: 0,
            payment: None,
            payment_usd_value: None,
            status: PlayStatus::Pending,
            played_at: chrono::Utc::now(),
        };
        assert_eq!(play.random_value_bytes().unwrap(), [7u8; 32]);

        let short = Play {
            random_value: "abcd".into(),
            ..play
        };
        assert!(short.random_value_bytes().is_err());
    }
}

use crate::error::{GachaponError, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the play finalization and redemption protocol.
///
/// Everything is plain data so deployments can ship it as JSON; call
/// [`ProtocolConfig::validate`] after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Payment tolerance in basis points below the listed USD cost.
    pub slippage_bps: u16,
    /// Redemption signatures older than this are rejected.
    pub replay_window_secs: i64,
    /// Clock-skew allowance for timestamps slightly in the future.
    pub future_skew_secs: i64,
    /// How long a subscriber waits for the payment verdict broadcast.
    pub payment_verified_timeout_secs: u64,
    /// How long a subscriber waits for the finalize broadcast.
    pub finalized_timeout_secs: u64,
    /// Idle broadcast channels older than this are swept.
    pub channel_ttl_secs: i64,
    /// Oracle price quotes are reused for this long.
    pub price_cache_ttl_secs: u64,
    /// Label purchases are retried at most this many times per redemption.
    pub max_label_retries: u32,
    /// Dimensional-weight divisor (in^3 per lb).
    pub dim_divisor: f64,
    /// Days after delivery before shipping artifacts are purged.
    pub pii_retention_days: i64,
    /// Worst-case shipping transit, used to schedule the purge when no
    /// delivery confirmation ever arrives.
    pub delivery_horizon_days: i64,
    /// Recorded on redemption rows as the label provider.
    pub shipment_provider: String,
    /// 32-byte AES-256-GCM key for shipping data, hex encoded.
    pub shipping_data_key: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 200,
            replay_window_secs: 300,
            future_skew_secs: 30,
            payment_verified_timeout_secs: 30,
            finalized_timeout_secs: 60,
            channel_ttl_secs: 900,
            price_cache_ttl_secs: 60,
            max_label_retries: 3,
            dim_divisor: 139.0,
            pii_retention_days: 30,
            delivery_horizon_days: 21,
            shipment_provider: "easypost".to_string(),
            shipping_data_key: hex::encode([0u8; 32]),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slippage_bps > 10_000 {
            return Err(GachaponError::config("slippage cannot exceed 10000 bps"));
        }
        if self.replay_window_secs <= 0 {
            return Err(GachaponError::config("replay window must be positive"));
        }
        if self.payment_verified_timeout_secs == 0 || self.finalized_timeout_secs == 0 {
            return Err(GachaponError::config("broadcast timeouts must be positive"));
        }
        if self.max_label_retries == 0 {
            return Err(GachaponError::config("label retries must be at least 1"));
        }
        if self.dim_divisor <= 0.0 {
            return Err(GachaponError::config("dim divisor must be positive"));
        }
        self.shipping_key_bytes()?;
        Ok(())
    }

    pub fn shipping_key_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex::decode(&self.shipping_data_key)
            .map_err(|_| GachaponError::config("shipping data key is not valid hex"))?;
        bytes
            .try_into()
            .map_err(|_| GachaponError::config("shipping data key must be 32 bytes"))
    }

    pub fn payment_verified_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.payment_verified_timeout_secs)
    }

    pub fn finalized_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.finalized_timeout_secs)
    }

    pub fn price_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.price_cache_ttl_secs)
    }
}

//! Gachapon protocol - play finalization and prize redemption
//!
//! This library takes gachapon plays from raw chain events through payment
//! verification and prize resolution, and handles the physical redemption
//! of won prizes with encrypted shipping data end to end.

pub mod cache;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod payment;
pub mod play;
pub mod realtime;
pub mod redemption;
pub mod shipping;
pub mod storage;
pub mod types;

pub use cache::PriceCache;
pub use chain::{Ack, ChainEvent, ChainEventListener};
pub use config::ProtocolConfig;
pub use engine::{EngineOutcome, PlayEngine};
pub use error::{GachaponError, Result};
pub use payment::{FixedPriceOracle, PaymentVerifier, PriceOracle};
pub use play::PlayFinalizer;
pub use realtime::{BroadcastHub, EventKind, PlayEvent};
pub use redemption::{RedeemRequest, RedemptionService};
pub use shipping::{select_box, validate_parcel, BoxSelection, BoxSpec};
pub use storage::Storage;
pub use types::{
    FinalizeOutcome, Game, Nft, PaymentState, PaymentVerdict, Play, PlayStatus, Prize, PrizeTier,
    Redemption, RedemptionStatus, ShipmentLabel, ShippingAddress,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn storage_opens_and_stores_a_game() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(
            Storage::new(&temp_dir.path().join("gachapon.db"))
                .await
                .unwrap(),
        );

        let game = Game {
            id: "game-1".to_string(),
            address: "GameAddr11111111111111111111111111111111111".to_string(),
            name: "Neko Machine".to_string(),
            token_mint: "So11111111111111111111111111111111111111112".to_string(),
            token_decimals: 9,
            cost_usd_cents: 500,
            treasury: "Treasury111111111111111111111111111111111111".to_string(),
            is_active: true,
            total_plays: 0,
            created_at: chrono::Utc::now(),
        };
        storage::GameStore::new(&storage).upsert(&game).await.unwrap();

        let stored = storage::GameStore::new(&storage)
            .get("game-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Neko Machine");
        assert_eq!(stored.cost_usd_cents, 500);
    }
}

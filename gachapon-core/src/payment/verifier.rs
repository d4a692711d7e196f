use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::PriceCache;
use crate::error::{GachaponError, Result};
use crate::payment::PriceOracle;
use crate::realtime::{BroadcastHub, PlayEvent};
use crate::storage::{GameStore, PlayStore, Storage};
use crate::types::{PaymentState, PaymentVerdict, Play};

/// Rules on whether a play paid enough for its game.
///
/// The verdict is committed to the play row before the broadcast goes out,
/// and a rejected verdict fails the play in the same update, so a prize can
/// never be drawn for a play whose payment did not clear.
pub struct PaymentVerifier {
    storage: Arc<Storage>,
    oracle: Arc<dyn PriceOracle>,
    cache: Arc<PriceCache>,
    hub: Arc<BroadcastHub>,
    slippage_bps: u16,
}

impl PaymentVerifier {
    pub fn new(
        storage: Arc<Storage>,
        oracle: Arc<dyn PriceOracle>,
        cache: Arc<PriceCache>,
        hub: Arc<BroadcastHub>,
        slippage_bps: u16,
    ) -> Self {
        Self {
            storage,
            oracle,
            cache,
            hub,
            slippage_bps,
        }
    }

    /// Verify the play's payment against the game's USD cost, allowing the
    /// configured slippage below list price. Re-verifying an already
    /// verdicted play returns the stored verdict without touching the
    /// oracle.
    pub async fn verify(&self, play: &Play) -> Result<PaymentVerdict> {
        if let Some(state) = play.payment {
            return Ok(stored_verdict(state, play.payment_usd_value));
        }

        let game = GameStore::new(&self.storage)
            .get(&play.game_id)
            .await?
            .ok_or_else(|| GachaponError::GameNotFound(play.game_id.clone()))?;

        let price_usd = self.price_for(&game.token_mint).await?;
        let tokens = play.token_amount_paid as f64 / 10f64.powi(i32::from(game.token_decimals));
        let actual_usd = tokens * price_usd;
        let cost_usd = game.cost_usd_cents as f64 / 100.0;
        let required_usd = cost_usd * (1.0 - f64::from(self.slippage_bps) / 10_000.0);

        let (state, message) = if actual_usd >= required_usd {
            (PaymentState::Verified, "Payment verified".to_string())
        } else {
            (
                PaymentState::Rejected,
                format!(
                    "Insufficient payment: ${:.4} received, at least ${:.4} required",
                    actual_usd, required_usd
                ),
            )
        };

        let recorded = PlayStore::new(&self.storage)
            .record_verdict(&play.id, state, actual_usd)
            .await?;
        if !recorded {
            // Another worker got there first; their verdict stands.
            let stored = PlayStore::new(&self.storage)
                .get(&play.id)
                .await?
                .ok_or_else(|| GachaponError::PlayNotFound(play.id.clone()))?;
            let state = stored.payment.ok_or_else(|| {
                GachaponError::internal(format!(
                    "Play {} lost verdict race yet has no verdict",
                    play.id
                ))
            })?;
            return Ok(stored_verdict(state, stored.payment_usd_value));
        }

        info!(
            play_id = %play.id,
            signature = %play.transaction_signature,
            verdict = %state,
            actual_usd = actual_usd,
            required_usd = required_usd,
            "Recorded payment verdict"
        );

        self.hub.publish(PlayEvent::PaymentVerified {
            signature: play.transaction_signature.clone(),
            status: state,
            message: message.clone(),
            actual_usd_value: actual_usd,
        });

        Ok(PaymentVerdict {
            status: state,
            message,
            actual_usd_value: actual_usd,
        })
    }

    async fn price_for(&self, token_mint: &str) -> Result<f64> {
        if let Some(price) = self.cache.get(token_mint) {
            debug!(token_mint = %token_mint, price_usd = price, "Price cache hit");
            return Ok(price);
        }

        let price = self.oracle.price_usd(token_mint).await?;
        if !price.is_finite() || price <= 0.0 {
            return Err(GachaponError::external(format!(
                "Oracle returned unusable price {} for token {}",
                price, token_mint
            )));
        }
        self.cache.set(token_mint, price);
        Ok(price)
    }
}

pub(crate) fn stored_verdict(state: PaymentState, usd_value: Option<f64>) -> PaymentVerdict {
    let message = match state {
        PaymentState::Verified => "Payment verified",
        PaymentState::Rejected => "Payment rejected",
    };
    PaymentVerdict {
        status: state,
        message: message.to_string(),
        actual_usd_value: usd_value.unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::FixedPriceOracle;
    use crate::realtime::EventKind;
    use crate::types::{Game, PlayStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    const MINT: &str = "So11111111111111111111111111111111111111112";

    struct CountingOracle {
        inner: FixedPriceOracle,
        calls: AtomicU32,
    }

    impl CountingOracle {
        fn new(price: f64) -> Self {
            Self {
                inner: FixedPriceOracle::new().with_price(MINT, price),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        async fn price_usd(&self, token_mint: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.price_usd(token_mint).await
        }
    }

    fn sample_game() -> Game {
        Game {
            id: "game-1".to_string(),
            address: "GameAddr1111111111111111111111111111111111".to_string(),
            name: "Test Machine".to_string(),
            token_mint: MINT.to_string(),
            token_decimals: 9,
            cost_usd_cents: 500,
            treasury: "Treasury11111111111111111111111111111111111".to_string(),
            is_active: true,
            total_plays: 0,
            created_at: Utc::now(),
        }
    }

    fn pending_play(signature: &str, token_amount_paid: u64) -> Play {
        Play {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: "game-1".to_string(),
            user_wallet: "Wallet1111111111111111111111111111111111111".to_string(),
            prize_id: None,
            nft_mint: None,
            transaction_signature: signature.to_string(),
            random_value: hex::encode([7u8; 32]),
            token_amount_paid,
            payment: None,
            payment_usd_value: None,
            status: PlayStatus::Pending,
            played_at: Utc::now(),
        }
    }

    async fn setup(
        price: f64,
    ) -> (
        tempfile::TempDir,
        Arc<Storage>,
        Arc<CountingOracle>,
        PaymentVerifier,
    ) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("test.db")).await.unwrap());

        GameStore::new(&storage).upsert(&sample_game()).await.unwrap();

        let oracle = Arc::new(CountingOracle::new(price));
        let verifier = PaymentVerifier::new(
            storage.clone(),
            oracle.clone(),
            Arc::new(PriceCache::new(Duration::from_secs(60))),
            Arc::new(BroadcastHub::new()),
            200,
        );
        (dir, storage, oracle, verifier)
    }

    #[tokio::test]
    async fn sufficient_payment_is_verified() {
        let (_dir, storage, _, verifier) = setup(5.0).await;
        let store = PlayStore::new(&storage);

        // $5.00 game, 200 bps slippage: $4.905 clears the $4.90 floor
        let play = pending_play("sig-pay-ok", 981_000_000);
        store.insert_pending(&play).await.unwrap();

        let verdict = verifier.verify(&play).await.unwrap();
        assert_eq!(verdict.status, PaymentState::Verified);
        assert!((verdict.actual_usd_value - 4.905).abs() < 1e-9);

        let stored = store.get(&play.id).await.unwrap().unwrap();
        assert_eq!(stored.payment, Some(PaymentState::Verified));
        assert_eq!(stored.status, PlayStatus::Pending);
    }

    #[tokio::test]
    async fn underpaid_play_is_rejected_and_failed() {
        let (_dir, storage, _, verifier) = setup(5.0).await;
        let store = PlayStore::new(&storage);

        // $4.895 misses the $4.90 floor
        let play = pending_play("sig-pay-short", 979_000_000);
        store.insert_pending(&play).await.unwrap();

        let verdict = verifier.verify(&play).await.unwrap();
        assert_eq!(verdict.status, PaymentState::Rejected);
        assert!(verdict.message.contains("Insufficient payment"));

        let stored = store.get(&play.id).await.unwrap().unwrap();
        assert_eq!(stored.payment, Some(PaymentState::Rejected));
        assert_eq!(stored.status, PlayStatus::Failed);
    }

    #[tokio::test]
    async fn replay_returns_stored_verdict_without_oracle() {
        let (_dir, storage, oracle, verifier) = setup(5.0).await;
        let store = PlayStore::new(&storage);

        let play = pending_play("sig-pay-replay", 981_000_000);
        store.insert_pending(&play).await.unwrap();
        verifier.verify(&play).await.unwrap();
        assert_eq!(oracle.calls(), 1);

        // Fresh verifier with an empty cache: only the stored verdict can
        // keep the oracle out of the replay path
        let replay_verifier = PaymentVerifier::new(
            storage.clone(),
            oracle.clone(),
            Arc::new(PriceCache::new(Duration::from_secs(60))),
            Arc::new(BroadcastHub::new()),
            200,
        );
        let stored = store.get(&play.id).await.unwrap().unwrap();
        let verdict = replay_verifier.verify(&stored).await.unwrap();

        assert_eq!(verdict.status, PaymentState::Verified);
        assert!((verdict.actual_usd_value - 4.905).abs() < 1e-9);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn price_cache_serves_repeat_lookups() {
        let (_dir, storage, oracle, verifier) = setup(5.0).await;
        let store = PlayStore::new(&storage);

        let first = pending_play("sig-cache-1", 981_000_000);
        let second = pending_play("sig-cache-2", 981_000_000);
        store.insert_pending(&first).await.unwrap();
        store.insert_pending(&second).await.unwrap();

        verifier.verify(&first).await.unwrap();
        verifier.verify(&second).await.unwrap();
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn unusable_price_is_an_error_not_a_verdict() {
        let (_dir, storage, _, verifier) = setup(0.0).await;
        let store = PlayStore::new(&storage);

        let play = pending_play("sig-zero-price", 981_000_000);
        store.insert_pending(&play).await.unwrap();

        assert!(verifier.verify(&play).await.is_err());

        // No verdict was written; the play is still eligible for retry
        let stored = store.get(&play.id).await.unwrap().unwrap();
        assert_eq!(stored.payment, None);
        assert_eq!(stored.status, PlayStatus::Pending);
    }

    #[tokio::test]
    async fn verdict_event_reaches_subscribers() {
        let (_dir, storage, _, verifier) = setup(5.0).await;
        let store = PlayStore::new(&storage);

        let play = pending_play("sig-pay-event", 981_000_000);
        store.insert_pending(&play).await.unwrap();

        let hub = verifier.hub.clone();
        let waiting = tokio::spawn(async move {
            hub.subscribe_once(
                "sig-pay-event",
                EventKind::PaymentVerified,
                Duration::from_secs(2),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        verifier.verify(&play).await.unwrap();

        let event = waiting.await.unwrap().expect("subscriber timed out");
        match event {
            PlayEvent::PaymentVerified {
                status,
                actual_usd_value,
                ..
            } => {
                assert_eq!(status, PaymentState::Verified);
                assert!((actual_usd_value - 4.905).abs() < 1e-9);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

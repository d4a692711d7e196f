use std::sync::Arc;

use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use tracing::{info, warn};

use crate::error::{GachaponError, Result};
use crate::realtime::{BroadcastHub, PlayEvent};
use crate::storage::{GameStore, PlayStore, PrizeStore, Storage};
use crate::types::{FinalizeOutcome, Nft, PaymentState, Play, PlayStatus, Prize};

/// Prize probabilities are expressed in basis points of this denominator.
const PROBABILITY_DENOMINATOR: u64 = 10_000;

/// Resolves the prize outcome for payment-verified plays.
///
/// The draw is fully determined by the play's on-chain random value, so
/// replaying a finalization can never change the result. A prize whose
/// supply ran out between the draw and the commit resolves as a no-win
/// rather than a redraw; redrawing would skew tier odds under contention.
/// A play counts into `Game.total_plays` exactly once, when it settles,
/// mirroring the on-chain counter.
pub struct PlayFinalizer {
    storage: Arc<Storage>,
    hub: Arc<BroadcastHub>,
}

impl PlayFinalizer {
    pub fn new(storage: Arc<Storage>, hub: Arc<BroadcastHub>) -> Self {
        Self { storage, hub }
    }

    pub async fn finalize(&self, play: &Play) -> Result<FinalizeOutcome> {
        if play.status.is_terminal() {
            return self.stored_outcome(play).await;
        }

        match play.payment {
            Some(PaymentState::Verified) => {}
            Some(PaymentState::Rejected) => {
                return Err(GachaponError::conflict(format!(
                    "Play {} was rejected and cannot be finalized",
                    play.id
                )));
            }
            None => {
                return Err(GachaponError::conflict(format!(
                    "Play {} has no payment verdict yet",
                    play.id
                )));
            }
        }

        let prizes = PrizeStore::new(&self.storage)
            .list_for_game(&play.game_id)
            .await?;
        let draw = draw_from(&play.random_value_bytes()?);

        let outcome = match winning_prize(&prizes, draw) {
            Some(prize) => self.commit_win(play, prize, draw).await?,
            None => {
                info!(
                    play_id = %play.id,
                    signature = %play.transaction_signature,
                    draw = draw,
                    "Draw landed in the no-win band"
                );
                self.commit_no_win(play, "No win this time").await?
            }
        };

        self.hub.publish(PlayEvent::Finalized {
            signature: play.transaction_signature.clone(),
            status: outcome.status,
            prize_id: outcome.prize_id,
            nft_mint: outcome.nft_mint.clone(),
            message: outcome.message.clone(),
        });

        Ok(outcome)
    }

    async fn commit_win(&self, play: &Play, prize: &Prize, draw: u64) -> Result<FinalizeOutcome> {
        let nft = Nft {
            mint_address: generate_mint_address(),
            prize_id: prize.prize_id,
            game_id: play.game_id.clone(),
            current_owner: play.user_wallet.clone(),
            is_redeemed: false,
            redemption_tx: None,
            minted_at: Utc::now(),
            redeemed_at: None,
        };

        let committed = PlayStore::new(&self.storage)
            .commit_win(&play.id, &nft)
            .await?;
        if !committed {
            warn!(
                play_id = %play.id,
                prize_id = prize.prize_id,
                "Prize supply exhausted at commit, resolving as no-win"
            );
            let message = format!("Prize {} supply exhausted", prize.name);
            return self.commit_no_win(play, &message).await;
        }
        GameStore::new(&self.storage)
            .increment_total_plays(&play.game_id)
            .await?;

        info!(
            play_id = %play.id,
            signature = %play.transaction_signature,
            prize_id = prize.prize_id,
            draw = draw,
            mint = %nft.mint_address,
            "Play won a prize"
        );

        Ok(FinalizeOutcome {
            status: PlayStatus::Completed,
            prize_id: Some(prize.prize_id),
            nft_mint: Some(nft.mint_address),
            message: format!("Won {}", prize.name),
        })
    }

    async fn commit_no_win(&self, play: &Play, message: &str) -> Result<FinalizeOutcome> {
        let failed = PlayStore::new(&self.storage).mark_failed(&play.id).await?;
        if !failed {
            // Another worker settled this play first; report their result.
            let stored = PlayStore::new(&self.storage)
                .get(&play.id)
                .await?
                .ok_or_else(|| GachaponError::PlayNotFound(play.id.clone()))?;
            return self.stored_outcome(&stored).await;
        }
        GameStore::new(&self.storage)
            .increment_total_plays(&play.game_id)
            .await?;

        Ok(FinalizeOutcome {
            status: PlayStatus::Failed,
            prize_id: None,
            nft_mint: None,
            message: message.to_string(),
        })
    }

    /// Outcome of a play that already reached a terminal status.
    async fn stored_outcome(&self, play: &Play) -> Result<FinalizeOutcome> {
        match play.status {
            PlayStatus::Completed => {
                let message = match play.prize_id {
                    Some(prize_id) => PrizeStore::new(&self.storage)
                        .get(&play.game_id, prize_id)
                        .await?
                        .map(|prize| format!("Won {}", prize.name))
                        .unwrap_or_else(|| "Won a prize".to_string()),
                    None => "Won a prize".to_string(),
                };
                Ok(FinalizeOutcome {
                    status: PlayStatus::Completed,
                    prize_id: play.prize_id,
                    nft_mint: play.nft_mint.clone(),
                    message,
                })
            }
            PlayStatus::Failed => {
                let message = match play.payment {
                    Some(PaymentState::Rejected) => "Payment rejected".to_string(),
                    _ => "No win this time".to_string(),
                };
                Ok(FinalizeOutcome {
                    status: PlayStatus::Failed,
                    prize_id: None,
                    nft_mint: None,
                    message,
                })
            }
            PlayStatus::Pending => Err(GachaponError::internal(format!(
                "Play {} is not terminal",
                play.id
            ))),
        }
    }
}

/// Map the first 8 bytes of the chain randomness onto the probability space.
fn draw_from(random_value: &[u8; 32]) -> u64 {
    let mut first = [0u8; 8];
    first.copy_from_slice(&random_value[..8]);
    u64::from_le_bytes(first) % PROBABILITY_DENOMINATOR
}

/// First prize whose cumulative band, in ascending prize id order, covers
/// the draw. Bands may sum below the denominator; a draw past them all is
/// a no-win. Sold-out prizes keep their band, the commit fails them closed.
fn winning_prize(prizes: &[Prize], draw: u64) -> Option<&Prize> {
    let mut cumulative = 0u64;
    for prize in prizes {
        cumulative += u64::from(prize.probability_bp);
        if draw < cumulative {
            return Some(prize);
        }
    }
    None
}

fn generate_mint_address() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::EventKind;
    use crate::storage::NftStore;
    use crate::types::{Game, PrizeTier};
    use std::time::Duration;
    use tempfile::tempdir;

    const WALLET: &str = "PlayerWallet1111111111111111111111111111111";

    fn random_for_draw(draw: u64) -> String {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&draw.to_le_bytes());
        hex::encode(bytes)
    }

    fn sample_prize(prize_id: u32, name: &str, probability_bp: u16, supply: u32) -> Prize {
        Prize {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: "game-1".to_string(),
            prize_id,
            name: name.to_string(),
            tier: PrizeTier::Rare,
            probability_bp,
            supply_total: supply,
            supply_remaining: supply,
            length_in: 10.0,
            width_in: 8.0,
            height_in: 2.0,
            weight_grams: 500,
            cost_usd_cents: 1200,
        }
    }

    async fn setup() -> (tempfile::TempDir, Arc<Storage>, PlayFinalizer) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("test.db")).await.unwrap());

        GameStore::new(&storage)
            .upsert(&Game {
                id: "game-1".to_string(),
                address: "GameAddr1111111111111111111111111111111111".to_string(),
                name: "Test Machine".to_string(),
                token_mint: "So11111111111111111111111111111111111111112".to_string(),
                token_decimals: 9,
                cost_usd_cents: 500,
                treasury: "Treasury11111111111111111111111111111111111".to_string(),
                is_active: true,
                total_plays: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Bands: [0, 100) Gold Axolotl, [100, 500) Sticker Pack, rest no-win
        let prize_store = PrizeStore::new(&storage);
        prize_store
            .upsert(&sample_prize(0, "Gold Axolotl", 100, 1))
            .await
            .unwrap();
        prize_store
            .upsert(&sample_prize(1, "Sticker Pack", 400, 5))
            .await
            .unwrap();

        let finalizer = PlayFinalizer::new(storage.clone(), Arc::new(BroadcastHub::new()));
        (dir, storage, finalizer)
    }

    async fn verified_play(storage: &Storage, signature: &str, draw: u64) -> Play {
        let store = PlayStore::new(storage);
        let play = Play {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: "game-1".to_string(),
            user_wallet: WALLET.to_string(),
            prize_id: None,
            nft_mint: None,
            transaction_signature: signature.to_string(),
            random_value: random_for_draw(draw),
            token_amount_paid: 1_000_000_000,
            payment: None,
            payment_usd_value: None,
            status: PlayStatus::Pending,
            played_at: Utc::now(),
        };
        store.insert_pending(&play).await.unwrap();
        store
            .record_verdict(&play.id, PaymentState::Verified, 5.0)
            .await
            .unwrap();
        store.get(&play.id).await.unwrap().unwrap()
    }

    #[test]
    fn bands_accumulate_in_prize_id_order() {
        let prizes = vec![
            sample_prize(0, "A", 100, 1),
            sample_prize(1, "B", 400, 1),
        ];

        assert_eq!(winning_prize(&prizes, 0).unwrap().prize_id, 0);
        assert_eq!(winning_prize(&prizes, 99).unwrap().prize_id, 0);
        // Boundary draw falls into the next band
        assert_eq!(winning_prize(&prizes, 100).unwrap().prize_id, 1);
        assert_eq!(winning_prize(&prizes, 499).unwrap().prize_id, 1);
        assert!(winning_prize(&prizes, 500).is_none());
        assert!(winning_prize(&prizes, 9_999).is_none());
    }

    #[test]
    fn draw_uses_first_eight_bytes_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x0F;
        bytes[1] = 0x27; // 9999 LE
        assert_eq!(draw_from(&bytes), 9_999);

        bytes[8] = 0xFF; // past the draw window, must not matter
        assert_eq!(draw_from(&bytes), 9_999);
    }

    #[tokio::test]
    async fn draw_inside_band_wins_the_prize() {
        let (_dir, storage, finalizer) = setup().await;
        let play = verified_play(&storage, "sig-win", 50).await;

        let outcome = finalizer.finalize(&play).await.unwrap();
        assert_eq!(outcome.status, PlayStatus::Completed);
        assert_eq!(outcome.prize_id, Some(0));
        assert_eq!(outcome.message, "Won Gold Axolotl");
        let mint = outcome.nft_mint.expect("win carries a mint");

        let nft = NftStore::new(&storage).get(&mint).await.unwrap().unwrap();
        assert_eq!(nft.current_owner, WALLET);
        assert!(!nft.is_redeemed);

        let prize = PrizeStore::new(&storage)
            .get("game-1", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prize.supply_remaining, 0);

        let game = GameStore::new(&storage).get("game-1").await.unwrap().unwrap();
        assert_eq!(game.total_plays, 1);
    }

    #[tokio::test]
    async fn draw_past_all_bands_is_no_win() {
        let (_dir, storage, finalizer) = setup().await;
        let play = verified_play(&storage, "sig-no-win", 500).await;

        let outcome = finalizer.finalize(&play).await.unwrap();
        assert_eq!(outcome.status, PlayStatus::Failed);
        assert_eq!(outcome.prize_id, None);
        assert_eq!(outcome.nft_mint, None);
        assert_eq!(outcome.message, "No win this time");

        let stored = PlayStore::new(&storage)
            .get(&play.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PlayStatus::Failed);

        // Losses count as plays too
        let game = GameStore::new(&storage).get("game-1").await.unwrap().unwrap();
        assert_eq!(game.total_plays, 1);
    }

    #[tokio::test]
    async fn supply_exhausted_resolves_no_win_without_redraw() {
        let (_dir, storage, finalizer) = setup().await;

        let first = verified_play(&storage, "sig-supply-1", 50).await;
        let outcome = finalizer.finalize(&first).await.unwrap();
        assert_eq!(outcome.status, PlayStatus::Completed);

        // Same band, but the sole Gold Axolotl is gone
        let second = verified_play(&storage, "sig-supply-2", 50).await;
        let outcome = finalizer.finalize(&second).await.unwrap();
        assert_eq!(outcome.status, PlayStatus::Failed);
        assert_eq!(outcome.prize_id, None);
        assert!(outcome.message.contains("supply exhausted"));

        let prize = PrizeStore::new(&storage)
            .get("game-1", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prize.supply_remaining, 0);
    }

    #[tokio::test]
    async fn concurrent_wins_never_oversell_supply() {
        let (_dir, storage, finalizer) = setup().await;
        let finalizer = Arc::new(finalizer);

        // Four verified plays, all drawing into the one-unit Gold Axolotl band
        let mut plays = Vec::new();
        for i in 0..4 {
            plays.push(verified_play(&storage, &format!("sig-race-{}", i), 50).await);
        }

        let mut handles = Vec::new();
        for play in plays {
            let finalizer = Arc::clone(&finalizer);
            handles.push(tokio::spawn(
                async move { finalizer.finalize(&play).await },
            ));
        }

        let mut wins = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            match outcome.status {
                PlayStatus::Completed => {
                    assert_eq!(outcome.prize_id, Some(0));
                    wins += 1;
                }
                PlayStatus::Failed => assert!(outcome.message.contains("supply exhausted")),
                PlayStatus::Pending => panic!("finalize left a play pending"),
            }
        }
        assert_eq!(wins, 1);

        let prize = PrizeStore::new(&storage)
            .get("game-1", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prize.supply_remaining, 0);

        let game = GameStore::new(&storage).get("game-1").await.unwrap().unwrap();
        assert_eq!(game.total_plays, 4);
    }

    #[tokio::test]
    async fn refinalizing_returns_stored_outcome() {
        let (_dir, storage, finalizer) = setup().await;
        let play = verified_play(&storage, "sig-replay", 50).await;

        let first = finalizer.finalize(&play).await.unwrap();
        let stored = PlayStore::new(&storage)
            .get(&play.id)
            .await
            .unwrap()
            .unwrap();
        let replay = finalizer.finalize(&stored).await.unwrap();

        assert_eq!(replay.status, PlayStatus::Completed);
        assert_eq!(replay.prize_id, first.prize_id);
        assert_eq!(replay.nft_mint, first.nft_mint);
        assert_eq!(replay.message, "Won Gold Axolotl");

        // Replay must not touch the supply or the play counter again
        let prize = PrizeStore::new(&storage)
            .get("game-1", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prize.supply_remaining, 0);

        let game = GameStore::new(&storage).get("game-1").await.unwrap().unwrap();
        assert_eq!(game.total_plays, 1);
    }

    #[tokio::test]
    async fn unverified_play_cannot_finalize() {
        let (_dir, storage, finalizer) = setup().await;

        let store = PlayStore::new(&storage);
        let play = Play {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: "game-1".to_string(),
            user_wallet: WALLET.to_string(),
            prize_id: None,
            nft_mint: None,
            transaction_signature: "sig-unverified".to_string(),
            random_value: random_for_draw(50),
            token_amount_paid: 1_000_000_000,
            payment: None,
            payment_usd_value: None,
            status: PlayStatus::Pending,
            played_at: Utc::now(),
        };
        store.insert_pending(&play).await.unwrap();

        let err = finalizer.finalize(&play).await.unwrap_err();
        assert!(matches!(err, GachaponError::Conflict(_)));

        let stored = store.get(&play.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PlayStatus::Pending);
    }

    #[tokio::test]
    async fn finalized_event_reaches_subscribers() {
        let (_dir, storage, finalizer) = setup().await;
        let play = verified_play(&storage, "sig-fin-event", 250).await;

        let hub = finalizer.hub.clone();
        let waiting = tokio::spawn(async move {
            hub.subscribe_once("sig-fin-event", EventKind::Finalized, Duration::from_secs(2))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        finalizer.finalize(&play).await.unwrap();

        let event = waiting.await.unwrap().expect("subscriber timed out");
        match event {
            PlayEvent::Finalized {
                status, prize_id, ..
            } => {
                assert_eq!(status, PlayStatus::Completed);
                assert_eq!(prize_id, Some(1));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

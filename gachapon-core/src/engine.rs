//! Event-driven orchestration of the play lifecycle.
//!
//! [`PlayEngine`] wires the listener, payment verifier and finalizer
//! behind a single `process_event` entry point, so an event source only
//! has to hand over envelopes and ack on the result.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::PriceCache;
use crate::chain::{decode_instruction, Ack, ChainEvent, ChainEventListener, PlayInstruction};
use crate::config::ProtocolConfig;
use crate::error::{GachaponError, Result};
use crate::payment::verifier::stored_verdict;
use crate::payment::{PaymentVerifier, PriceOracle};
use crate::play::PlayFinalizer;
use crate::realtime::{BroadcastHub, EventKind, PlayEvent};
use crate::storage::{PlayStore, Storage};
use crate::types::{FinalizeOutcome, PaymentState, PaymentVerdict, Play};

/// How far one event advanced the play it belongs to.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// Failed transaction, foreign instruction or unknown game.
    Ignored,
    /// Payment cleared; the play now waits for the finalize instruction.
    PaymentVerified(PaymentVerdict),
    /// Payment did not cover the game cost; the play is foreclosed.
    PaymentRejected(PaymentVerdict),
    /// The play reached a terminal status, win or no-win.
    Settled(FinalizeOutcome),
}

/// Drives plays from chain event to settled outcome.
///
/// Processing is idempotent end to end: replaying any event re-reads
/// stored state and reports it instead of recomputing. Payment is
/// verified as soon as the play event lands; prize resolution waits for
/// the finalize instruction, whose random value is authoritative.
pub struct PlayEngine {
    storage: Arc<Storage>,
    listener: ChainEventListener,
    verifier: PaymentVerifier,
    finalizer: PlayFinalizer,
    hub: Arc<BroadcastHub>,
    config: ProtocolConfig,
}

impl PlayEngine {
    pub fn new(
        storage: Arc<Storage>,
        oracle: Arc<dyn PriceOracle>,
        config: ProtocolConfig,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let cache = Arc::new(PriceCache::new(config.price_cache_ttl()));
        Self {
            listener: ChainEventListener::new(Arc::clone(&storage)),
            verifier: PaymentVerifier::new(
                Arc::clone(&storage),
                oracle,
                cache,
                Arc::clone(&hub),
                config.slippage_bps,
            ),
            finalizer: PlayFinalizer::new(Arc::clone(&storage), Arc::clone(&hub)),
            storage,
            hub,
            config,
        }
    }

    /// The hub this engine broadcasts lifecycle events on. Realtime
    /// frontends subscribe here.
    pub fn hub(&self) -> Arc<BroadcastHub> {
        Arc::clone(&self.hub)
    }

    /// Ingest one transaction event and advance its play as far as the
    /// stored state allows. Transient errors (see
    /// [`GachaponError::is_transient`]) mean the source should redeliver.
    pub async fn process_event(&self, event: &ChainEvent) -> Result<EngineOutcome> {
        if self.listener.ingest(event).await? == Ack::Ignored {
            return Ok(EngineOutcome::Ignored);
        }

        let play = self.play_by_signature(&event.signature).await?;
        if play.status.is_terminal() {
            // Duplicate delivery after settlement; report the stored result.
            let outcome = self.finalizer.finalize(&play).await?;
            return Ok(EngineOutcome::Settled(outcome));
        }

        let verdict = self.verifier.verify(&play).await?;
        if verdict.status == PaymentState::Rejected {
            return Ok(EngineOutcome::PaymentRejected(verdict));
        }

        // The draw needs the chain's randomness, delivered by the finalize
        // instruction. Until then the play stays pending, verified.
        if !matches!(
            decode_instruction(&event.instruction_data)?,
            PlayInstruction::Finalize { .. }
        ) {
            return Ok(EngineOutcome::PaymentVerified(verdict));
        }

        // Re-read: the verdict and the adopted random value live on the row.
        let play = self.play_by_signature(&event.signature).await?;
        let outcome = self.finalizer.finalize(&play).await?;
        Ok(EngineOutcome::Settled(outcome))
    }

    /// Wait until the payment verdict for `signature` is known: stored
    /// verdicts return immediately, otherwise this listens on the hub up
    /// to the configured timeout. The store is re-checked after a timeout
    /// so a verdict committed while subscribing is not lost.
    pub async fn await_payment_verified(&self, signature: &str) -> Result<PaymentVerdict> {
        if let Some(play) = PlayStore::new(&self.storage)
            .get_by_signature(signature)
            .await?
        {
            if let Some(state) = play.payment {
                return Ok(stored_verdict(state, play.payment_usd_value));
            }
        }

        let subscribed = self
            .hub
            .subscribe_once(
                signature,
                EventKind::PaymentVerified,
                self.config.payment_verified_timeout(),
            )
            .await;
        if let Some(PlayEvent::PaymentVerified {
            status,
            message,
            actual_usd_value,
            ..
        }) = subscribed
        {
            return Ok(PaymentVerdict {
                status,
                message,
                actual_usd_value,
            });
        }

        let play = self.play_by_signature(signature).await?;
        match play.payment {
            Some(state) => Ok(stored_verdict(state, play.payment_usd_value)),
            None => Err(GachaponError::timeout(format!(
                "No payment verdict for {} yet",
                signature
            ))),
        }
    }

    /// Wait until the play for `signature` settles. Same store-first,
    /// hub-second, store-again strategy as [`Self::await_payment_verified`].
    pub async fn await_finalized(&self, signature: &str) -> Result<FinalizeOutcome> {
        if let Some(play) = PlayStore::new(&self.storage)
            .get_by_signature(signature)
            .await?
        {
            if play.status.is_terminal() {
                return self.finalizer.finalize(&play).await;
            }
        }

        let subscribed = self
            .hub
            .subscribe_once(signature, EventKind::Finalized, self.config.finalized_timeout())
            .await;
        if let Some(PlayEvent::Finalized {
            status,
            prize_id,
            nft_mint,
            message,
            ..
        }) = subscribed
        {
            return Ok(FinalizeOutcome {
                status,
                prize_id,
                nft_mint,
                message,
            });
        }

        let play = self.play_by_signature(signature).await?;
        if play.status.is_terminal() {
            return self.finalizer.finalize(&play).await;
        }
        Err(GachaponError::timeout(format!(
            "Play {} has not settled yet",
            signature
        )))
    }

    /// Drop broadcast channels idle past the configured TTL.
    pub fn sweep_channels(&self) -> usize {
        let ttl = Duration::from_secs(self.config.channel_ttl_secs.max(0) as u64);
        self.hub.sweep(ttl)
    }

    async fn play_by_signature(&self, signature: &str) -> Result<Play> {
        PlayStore::new(&self.storage)
            .get_by_signature(signature)
            .await?
            .ok_or_else(|| GachaponError::PlayNotFound(signature.to_string()))
    }
}

pub mod events;

pub use events::{
    decode_instruction, encode_finalize_instruction, encode_play_instruction, ChainEvent,
    PlayInstruction, FINALIZE_DISCRIMINATOR, PLAY_DISCRIMINATOR,
};

use crate::error::{GachaponError, Result};
use crate::storage::{GameStore, PlayStore, Storage};
use crate::types::{Play, PlayStatus};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use uuid::Uuid;

/// Ingestion outcome the event source acks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// New state recorded; downstream processing should run.
    Accepted,
    /// Duplicate delivery of something already recorded or terminal.
    AlreadyProcessed,
    /// Not ours: failed transaction, foreign instruction, unknown game.
    Ignored,
}

/// Turns raw transaction events into play rows. Safe under concurrent,
/// duplicated and reordered delivery; the unique signature constraint in
/// the plays table does the de-duplication.
pub struct ChainEventListener {
    storage: Arc<Storage>,
}

impl ChainEventListener {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn ingest(&self, event: &ChainEvent) -> Result<Ack> {
        if event.err.is_some() {
            tracing::debug!("Ignoring failed transaction {}", event.signature);
            return Ok(Ack::Ignored);
        }

        match decode_instruction(&event.instruction_data)? {
            PlayInstruction::Play { token_amount, .. } => {
                self.ingest_play(event, token_amount).await
            }
            PlayInstruction::Finalize { random_value } => {
                self.ingest_finalize(event, random_value).await
            }
            PlayInstruction::Unknown { discriminator } => {
                tracing::warn!(
                    "Ignoring unknown discriminator {} on {}",
                    hex::encode(discriminator),
                    event.signature
                );
                Ok(Ack::Ignored)
            }
        }
    }

    async fn ingest_play(&self, event: &ChainEvent, token_amount: u64) -> Result<Ack> {
        let game_address = event
            .accounts
            .first()
            .ok_or_else(|| GachaponError::validation("play event carries no accounts"))?;
        let user_wallet = event
            .accounts
            .get(1)
            .ok_or_else(|| GachaponError::validation("play event missing payer account"))?;

        let game_store = GameStore::new(&self.storage);
        let Some(game) = game_store.get_by_address(game_address).await? else {
            tracing::warn!(
                "Play {} references unknown game {}; ignoring",
                event.signature,
                game_address
            );
            return Ok(Ack::Ignored);
        };

        // Server-side randomness; the on-chain finalize value replaces it
        // if and when that instruction arrives.
        let mut random_value = [0u8; 32];
        OsRng.fill_bytes(&mut random_value);

        let play = Play {
            id: Uuid::new_v4().to_string(),
            game_id: game.id.clone(),
            user_wallet: user_wallet.clone(),
            prize_id: None,
            nft_mint: None,
            transaction_signature: event.signature.clone(),
            random_value: hex::encode(random_value),
            token_amount_paid: token_amount,
            payment: None,
            payment_usd_value: None,
            status: PlayStatus::Pending,
            played_at: event
                .block_time
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .unwrap_or_else(Utc::now),
        };

        let play_store = PlayStore::new(&self.storage);
        if play_store.insert_pending(&play).await? {
            Ok(Ack::Accepted)
        } else {
            Ok(Ack::AlreadyProcessed)
        }
    }

    async fn ingest_finalize(&self, event: &ChainEvent, random_value: [u8; 32]) -> Result<Ack> {
        let play_store = PlayStore::new(&self.storage);

        let Some(play) = play_store.get_by_signature(&event.signature).await? else {
            // Reordered delivery: the play event has not landed yet. This
            // error is transient so the source redelivers.
            return Err(GachaponError::PlayNotFound(event.signature.clone()));
        };

        if play.status.is_terminal() {
            return Ok(Ack::AlreadyProcessed);
        }

        // The chain's randomness is authoritative over our placeholder.
        play_store
            .adopt_random_value(&event.signature, &hex::encode(random_value))
            .await?;
        Ok(Ack::Accepted)
    }
}

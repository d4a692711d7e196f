use crate::error::{GachaponError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Anchor-style discriminator: sha256("global:play_game")[..8].
pub const PLAY_DISCRIMINATOR: [u8; 8] = [37, 88, 207, 85, 42, 144, 122, 197];
/// sha256("global:finalize_play")[..8].
pub const FINALIZE_DISCRIMINATOR: [u8; 8] = [217, 0, 74, 63, 118, 193, 160, 9];

/// Transaction notification as the webhook/stream source delivers it.
/// Delivery is at-least-once and may be duplicated or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub signature: String,
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
    /// Present when the transaction failed on chain.
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    pub accounts: Vec<String>,
    /// base64 of the instruction: 8-byte discriminator, then fixed
    /// little-endian fields.
    pub instruction_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayInstruction {
    /// play_game(token_amount, session_seed).
    /// accounts[0] is the game address, accounts[1] the paying wallet.
    Play {
        token_amount: u64,
        session_seed: [u8; 32],
    },
    /// finalize_play(random_value).
    Finalize { random_value: [u8; 32] },
    /// Some other program instruction. Acked without side effects.
    Unknown { discriminator: [u8; 8] },
}

/// Strict decode: exact payload lengths, no best-effort parsing. Unknown
/// discriminators are data, not errors; malformed payloads for known
/// discriminators are validation errors.
pub fn decode_instruction(data_b64: &str) -> Result<PlayInstruction> {
    let data = general_purpose::STANDARD
        .decode(data_b64)
        .map_err(|_| GachaponError::validation("instruction data is not valid base64"))?;

    if data.len() < 8 {
        return Err(GachaponError::validation(
            "instruction data shorter than a discriminator",
        ));
    }
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&data[..8]);
    let body = &data[8..];

    match discriminator {
        PLAY_DISCRIMINATOR => {
            if body.len() != 40 {
                return Err(GachaponError::validation(format!(
                    "play instruction payload must be 40 bytes, got {}",
                    body.len()
                )));
            }
            let mut amount = [0u8; 8];
            amount.copy_from_slice(&body[..8]);
            let mut session_seed = [0u8; 32];
            session_seed.copy_from_slice(&body[8..40]);
            Ok(PlayInstruction::Play {
                token_amount: u64::from_le_bytes(amount),
                session_seed,
            })
        }
        FINALIZE_DISCRIMINATOR => {
            if body.len() != 32 {
                return Err(GachaponError::validation(format!(
                    "finalize instruction payload must be 32 bytes, got {}",
                    body.len()
                )));
            }
            let mut random_value = [0u8; 32];
            random_value.copy_from_slice(body);
            Ok(PlayInstruction::Finalize { random_value })
        }
        other => Ok(PlayInstruction::Unknown {
            discriminator: other,
        }),
    }
}

/// Build play instruction data. Used by the CLI simulator and tests.
pub fn encode_play_instruction(token_amount: u64, session_seed: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(48);
    data.extend_from_slice(&PLAY_DISCRIMINATOR);
    data.extend_from_slice(&token_amount.to_le_bytes());
    data.extend_from_slice(session_seed);
    general_purpose::STANDARD.encode(data)
}

/// Build finalize instruction data. Used by the CLI simulator and tests.
pub fn encode_finalize_instruction(random_value: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(40);
    data.extend_from_slice(&FINALIZE_DISCRIMINATOR);
    data.extend_from_slice(random_value);
    general_purpose::STANDARD.encode(data)
}

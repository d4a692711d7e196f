use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::{GachaponError, Result};

/// Wallet-signed authorization accompanying a redemption request. Keys and
/// signatures travel base58, timestamps in unix milliseconds.
#[derive(Debug, Clone)]
pub struct RedemptionAuth<'a> {
    pub user_wallet: &'a str,
    pub nft_mint: &'a str,
    pub message: &'a str,
    pub signature: &'a str,
    pub timestamp_ms: i64,
}

/// The message a wallet signs to redeem an NFT.
pub fn redemption_message(nft_mint: &str, timestamp_ms: i64) -> String {
    format!("gachapon:redeem:{}:{}", nft_mint, timestamp_ms)
}

/// Check the supplied message against the server-side reconstruction, the
/// timestamp against the replay window, and the ed25519 signature against
/// the wallet key. Every failure collapses into the same `Authentication`
/// error; callers cannot tell a forged signature from a stale timestamp.
pub fn verify_auth(
    auth: &RedemptionAuth<'_>,
    now: DateTime<Utc>,
    replay_window: Duration,
    future_skew: Duration,
) -> Result<()> {
    let expected = redemption_message(auth.nft_mint, auth.timestamp_ms);
    if auth.message != expected {
        return Err(GachaponError::Authentication);
    }

    let signed_at =
        DateTime::from_timestamp_millis(auth.timestamp_ms).ok_or(GachaponError::Authentication)?;
    if signed_at - now > future_skew {
        return Err(GachaponError::Authentication);
    }
    if now - signed_at > replay_window {
        return Err(GachaponError::Authentication);
    }

    verify_wallet_signature(auth.user_wallet, auth.message.as_bytes(), auth.signature)
}

fn verify_wallet_signature(wallet: &str, message: &[u8], signature: &str) -> Result<()> {
    let key_bytes: [u8; 32] = bs58::decode(wallet)
        .into_vec()
        .map_err(|_| GachaponError::Authentication)?
        .try_into()
        .map_err(|_| GachaponError::Authentication)?;
    let sig_bytes: [u8; 64] = bs58::decode(signature)
        .into_vec()
        .map_err(|_| GachaponError::Authentication)?
        .try_into()
        .map_err(|_| GachaponError::Authentication)?;

    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| GachaponError::Authentication)?;
    let signature = Signature::from_bytes(&sig_bytes);
    key.verify_strict(message, &signature)
        .map_err(|_| GachaponError::Authentication)
}

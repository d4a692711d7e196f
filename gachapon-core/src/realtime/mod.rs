//! Per-signature broadcast channels for play lifecycle notifications.
//!
//! Events are delivery hints, not the source of truth: a subscriber that
//! times out or lags simply falls back to querying the store. Dropping a
//! subscription never retracts anything already committed.

use crate::types::{PaymentState, PlayStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayEvent {
    PaymentVerified {
        signature: String,
        status: PaymentState,
        message: String,
        actual_usd_value: f64,
    },
    Finalized {
        signature: String,
        status: PlayStatus,
        prize_id: Option<u32>,
        nft_mint: Option<String>,
        message: String,
    },
}

impl PlayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayEvent::PaymentVerified { .. } => EventKind::PaymentVerified,
            PlayEvent::Finalized { .. } => EventKind::Finalized,
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            PlayEvent::PaymentVerified { signature, .. } => signature,
            PlayEvent::Finalized { signature, .. } => signature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentVerified,
    Finalized,
}

struct Channel {
    sender: broadcast::Sender<PlayEvent>,
    created_at: Instant,
    /// Set once a rejected verdict goes out; finalized events for this
    /// signature are dropped from then on.
    rejected: bool,
}

impl Channel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            created_at: Instant::now(),
            rejected: false,
        }
    }
}

/// One logical channel per transaction signature.
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, Channel>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Fan out an event to current subscribers. Returns how many received
    /// it; zero is normal when nobody is listening yet.
    pub fn publish(&self, event: PlayEvent) -> usize {
        let mut channels = self.channels.lock();
        let channel = channels
            .entry(event.signature().to_string())
            .or_insert_with(Channel::new);

        match &event {
            PlayEvent::PaymentVerified {
                status: PaymentState::Rejected,
                ..
            } => {
                channel.rejected = true;
            }
            PlayEvent::Finalized { signature, .. } if channel.rejected => {
                tracing::warn!(
                    "Dropping finalized event for rejected play {}",
                    signature
                );
                return 0;
            }
            _ => {}
        }

        channel.sender.send(event).unwrap_or(0)
    }

    /// Wait for the next event of `kind` on this signature, or None when
    /// the timeout lapses. Mismatched kinds and lagged gaps are skipped.
    pub async fn subscribe_once(
        &self,
        signature: &str,
        kind: EventKind,
        timeout: Duration,
    ) -> Option<PlayEvent> {
        let mut receiver = {
            let mut channels = self.channels.lock();
            channels
                .entry(signature.to_string())
                .or_insert_with(Channel::new)
                .sender
                .subscribe()
            // lock released before any await
        };

        tokio::time::timeout(timeout, async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.kind() == kind => return Some(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .unwrap_or(None)
    }

    /// Drop channels older than `ttl`. Returns how many were removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|_, channel| channel.created_at.elapsed() <= ttl);
        let removed = before - channels.len();
        if removed > 0 {
            tracing::debug!("Swept {} idle broadcast channels", removed);
        }
        removed
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn finalized(signature: &str) -> PlayEvent {
        PlayEvent::Finalized {
            signature: signature.to_string(),
            status: PlayStatus::Completed,
            prize_id: Some(1),
            nft_mint: Some("Mint111".to_string()),
            message: "you won".to_string(),
        }
    }

    fn verified(signature: &str) -> PlayEvent {
        PlayEvent::PaymentVerified {
            signature: signature.to_string(),
            status: PaymentState::Verified,
            message: "payment ok".to_string(),
            actual_usd_value: 5.02,
        }
    }

    fn rejected(signature: &str) -> PlayEvent {
        PlayEvent::PaymentVerified {
            signature: signature.to_string(),
            status: PaymentState::Rejected,
            message: "underpaid".to_string(),
            actual_usd_value: 0.32,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_matching_kind() {
        let hub = Arc::new(BroadcastHub::new());

        let waiting = {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.subscribe_once("sig-1", EventKind::Finalized, Duration::from_secs(2))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The payment event must be skipped, not returned
        assert_eq!(hub.publish(verified("sig-1")), 1);
        assert_eq!(hub.publish(finalized("sig-1")), 1);

        let event = waiting.await.unwrap().expect("subscriber timed out");
        assert_eq!(event.kind(), EventKind::Finalized);
        assert_eq!(event.signature(), "sig-1");
    }

    #[tokio::test]
    async fn timeout_yields_none() {
        let hub = BroadcastHub::new();
        let got = hub
            .subscribe_once("sig-quiet", EventKind::PaymentVerified, Duration::from_millis(30))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn rejected_verdict_suppresses_finalized() {
        let hub = Arc::new(BroadcastHub::new());

        let waiting = {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.subscribe_once("sig-2", EventKind::Finalized, Duration::from_millis(200))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        hub.publish(rejected("sig-2"));
        assert_eq!(hub.publish(finalized("sig-2")), 0);

        assert!(waiting.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publishing_to_nobody_is_fine() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish(finalized("sig-3")), 0);
    }

    #[tokio::test]
    async fn sweep_drops_idle_channels() {
        let hub = BroadcastHub::new();
        hub.publish(verified("sig-a"));
        hub.publish(verified("sig-b"));
        assert_eq!(hub.channel_count(), 2);

        assert_eq!(hub.sweep(Duration::ZERO), 2);
        assert_eq!(hub.channel_count(), 0);

        // A swept signature can come back; it just starts a fresh channel
        hub.publish(verified("sig-a"));
        assert_eq!(hub.channel_count(), 1);
    }
}

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// TTL cache for oracle price quotes, keyed by token mint.
///
/// Injected into the payment verifier rather than living as module state,
/// so tests and multi-tenant deployments control staleness explicitly.
pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, PriceEntry>>,
}

struct PriceEntry {
    price_usd: f64,
    inserted_at: Instant,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, token_mint: &str) -> Option<f64> {
        let entries = self.entries.lock();
        let entry = entries.get(token_mint)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.price_usd)
    }

    pub fn set(&self, token_mint: &str, price_usd: f64) {
        self.entries.lock().insert(
            token_mint.to_string(),
            PriceEntry {
                price_usd,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop entries past their TTL. Returns how many were removed.
    pub fn expire(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GachaponError, Result};

/// Source of USD token prices. Implementations wrap whatever market-data
/// feed the deployment uses; the verifier treats them as a black box.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one whole token of the given mint.
    async fn price_usd(&self, token_mint: &str) -> Result<f64>;
}

/// Oracle with preloaded prices, for tests and offline replay.
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    prices: Mutex<HashMap<String, f64>>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_price(self, token_mint: &str, price_usd: f64) -> Self {
        self.prices
            .lock()
            .insert(token_mint.to_string(), price_usd);
        self
    }

    pub fn set_price(&self, token_mint: &str, price_usd: f64) {
        self.prices
            .lock()
            .insert(token_mint.to_string(), price_usd);
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn price_usd(&self, token_mint: &str) -> Result<f64> {
        self.prices.lock().get(token_mint).copied().ok_or_else(|| {
            GachaponError::external(format!("No price feed for token {}", token_mint))
        })
    }
}

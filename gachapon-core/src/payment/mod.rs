//! Payment verification against the game's USD price.

pub mod oracle;
pub mod verifier;

pub use oracle::{FixedPriceOracle, PriceOracle};
pub use verifier::PaymentVerifier;

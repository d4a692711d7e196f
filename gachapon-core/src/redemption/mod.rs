//! Redeeming a prize NFT for the physical item.
//!
//! A redemption is a wallet-signed request carrying an encrypted shipping
//! address. [`auth`] checks the signature and replay window, [`crypto`]
//! opens the address, and [`service`] drives the claim and the shipment
//! state machine. The plaintext address exists only for the duration of
//! the label purchase.

pub mod auth;
pub mod crypto;
pub mod service;

pub use auth::{redemption_message, verify_auth, RedemptionAuth};
pub use crypto::{decrypt_shipping_data, encrypt_shipping_data};
pub use service::{LabelRequest, LabelService, RedeemRequest, RedemptionService};

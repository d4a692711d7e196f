use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use gachapon_core::chain::{encode_finalize_instruction, encode_play_instruction};
use gachapon_core::redemption::{encrypt_shipping_data, redemption_message, LabelRequest, LabelService};
use gachapon_core::storage::{GameStore, PrizeStore};
use gachapon_core::{
    ChainEvent, EngineOutcome, FixedPriceOracle, Game, PlayEngine, Prize, PrizeTier,
    ProtocolConfig, RedeemRequest, RedemptionService, Result, ShipmentLabel, ShippingAddress,
    Storage,
};
use std::sync::Arc;
use tempfile::tempdir;

/// Label provider stub that hands back a canned label.
struct ConsoleLabels;

#[async_trait]
impl LabelService for ConsoleLabels {
    async fn purchase_label(&self, request: &LabelRequest) -> Result<ShipmentLabel> {
        println!(
            "Purchasing label: shipment {}, {} box, {:.1} lbs billable",
            request.shipment_id, request.box_name, request.billable_weight_lbs
        );
        Ok(ShipmentLabel {
            tracking_number: "TRACK123456".to_string(),
            carrier: "USPS".to_string(),
            carrier_code: "usps".to_string(),
            label_pdf_url: "https://labels.example/TRACK123456.pdf".to_string(),
            label_png_url: None,
            tracking_url: Some("https://track.example/TRACK123456".to_string()),
            estimated_delivery: None,
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Create temp dir
    let temp_dir = tempdir()?;
    println!("Using temporary directory: {:?}", temp_dir.path());

    let storage = Arc::new(Storage::new(&temp_dir.path().join("gachapon.db")).await?);
    let config = ProtocolConfig::default();

    // The player's wallet is an ed25519 key; its base58 public key is
    // both the chain account and the redemption identity.
    let player_key = SigningKey::from_bytes(&[7u8; 32]);
    let player_wallet = bs58::encode(player_key.verifying_key().to_bytes()).into_string();

    println!("Seeding a $5 game with one prize...");
    let game = Game {
        id: "game-1".to_string(),
        address: "GameAddr11111111111111111111111111111111111".to_string(),
        name: "Neko Machine".to_string(),
        token_mint: "So11111111111111111111111111111111111111112".to_string(),
        token_decimals: 9,
        cost_usd_cents: 500,
        treasury: "Treasury111111111111111111111111111111111111".to_string(),
        is_active: true,
        total_plays: 0,
        created_at: Utc::now(),
    };
    GameStore::new(&storage).upsert(&game).await?;
    PrizeStore::new(&storage)
        .upsert(&Prize {
            id: "prize-1".to_string(),
            game_id: game.id.clone(),
            prize_id: 0,
            name: "Plush Cat".to_string(),
            tier: PrizeTier::Common,
            probability_bp: 4000,
            supply_total: 10,
            supply_remaining: 10,
            length_in: 10.0,
            width_in: 8.0,
            height_in: 4.0,
            weight_grams: 2268,
            cost_usd_cents: 1200,
        })
        .await?;

    // One token quoted at $5 covers the game cost.
    let oracle = Arc::new(FixedPriceOracle::new().with_price(&game.token_mint, 5.0));
    let engine = PlayEngine::new(Arc::clone(&storage), oracle, config.clone());

    println!("\nProcessing the play transaction...");
    let play_event = ChainEvent {
        signature: "PlaySig111".to_string(),
        slot: Some(1000),
        block_time: Some(Utc::now().timestamp()),
        err: None,
        accounts: vec![game.address.clone(), player_wallet.clone()],
        instruction_data: encode_play_instruction(1_000_000_000, &[1u8; 32]),
    };
    let outcome = engine.process_event(&play_event).await?;
    println!("Outcome: {:?}", outcome);

    println!("\nProcessing the finalize transaction...");
    // All-zero randomness draws 0, inside the prize band.
    let finalize_event = ChainEvent {
        signature: "PlaySig111".to_string(),
        slot: Some(1001),
        block_time: Some(Utc::now().timestamp()),
        err: None,
        accounts: vec![game.address.clone()],
        instruction_data: encode_finalize_instruction(&[0u8; 32]),
    };
    let outcome = engine.process_event(&finalize_event).await?;
    let EngineOutcome::Settled(settled) = outcome else {
        return Err("play did not settle".into());
    };
    println!("Result: {}", settled.message);
    let nft_mint = settled.nft_mint.expect("winning play mints an NFT");
    println!("NFT minted: {}", nft_mint);

    println!("\nRedeeming the prize...");
    let address = ShippingAddress {
        name: "Ayumi Tanaka".to_string(),
        line1: "123 Harbor St".to_string(),
        line2: None,
        city: "Portland".to_string(),
        state: "OR".to_string(),
        postal_code: "97201".to_string(),
        country: "US".to_string(),
        phone: None,
    };
    let key = config.shipping_key_bytes()?;
    let encrypted = encrypt_shipping_data(&key, &address)?;

    let timestamp_ms = Utc::now().timestamp_millis();
    let message = redemption_message(&nft_mint, timestamp_ms);
    let signature = bs58::encode(player_key.sign(message.as_bytes()).to_bytes()).into_string();

    let service = RedemptionService::new(Arc::clone(&storage), Arc::new(ConsoleLabels), config);
    let redemption = service
        .redeem(&RedeemRequest {
            nft_mint,
            user_wallet: player_wallet,
            message,
            signature,
            timestamp_ms,
            encrypted_shipping_data: encrypted,
        })
        .await?;

    println!("Redemption status: {}", redemption.status);
    println!(
        "Tracking: {}",
        redemption.tracking_number.as_deref().unwrap_or("-")
    );

    println!("\nExample completed successfully!");

    Ok(())
}

use chrono::Utc;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use gachapon_core::storage::RedemptionStore;
use gachapon_core::{GachaponError, Result, Storage};
use std::sync::Arc;

#[derive(Subcommand)]
pub enum RedemptionCommands {
    /// Show the redemption recorded for an NFT
    Status {
        /// NFT mint address
        nft_mint: String,
    },
    /// List recent redemptions
    List {
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Purge shipping artifacts past their retention deadline
    Purge {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn handle_redemption_command(
    cmd: RedemptionCommands,
    storage: &Arc<Storage>,
) -> Result<()> {
    match cmd {
        RedemptionCommands::Status { nft_mint } => {
            let Some(redemption) = RedemptionStore::new(storage).get_by_mint(&nft_mint).await?
            else {
                println!("No redemption recorded for NFT '{}'.", nft_mint);
                return Ok(());
            };

            println!("Redemption {}", redemption.id);
            println!("  NFT: {}", redemption.nft_mint);
            println!("  Wallet: {}", redemption.user_wallet);
            println!("  Prize: {}", redemption.prize_id);
            println!("  Status: {}", redemption.status);
            println!(
                "  Shipment: {} via {}",
                redemption.shipment_id, redemption.shipment_provider
            );
            if let Some(tracking) = &redemption.tracking_number {
                let carrier = redemption.carrier.as_deref().unwrap_or("unknown carrier");
                println!("  Tracking: {} ({})", tracking, carrier);
            }
            if let Some(url) = &redemption.tracking_url {
                println!("  Tracking URL: {}", url);
            }
            println!(
                "  Redeemed at: {}",
                redemption.redeemed_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(shipped) = redemption.shipped_at {
                println!("  Shipped at: {}", shipped.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(delivered) = redemption.delivered_at {
                println!("  Delivered at: {}", delivered.format("%Y-%m-%d %H:%M:%S"));
            } else if let Some(estimate) = redemption.estimated_delivery {
                println!("  Estimated delivery: {}", estimate.format("%Y-%m-%d"));
            }
            if let Some(reason) = &redemption.failure_reason {
                println!(
                    "  Last failure: {} ({} attempt(s))",
                    reason, redemption.retry_count
                );
            }
            if let Some(deletion) = redemption.data_deletion_scheduled_at {
                println!(
                    "  Shipping artifacts purge due: {}",
                    deletion.format("%Y-%m-%d")
                );
            }
        }

        RedemptionCommands::List { limit } => {
            let redemptions = RedemptionStore::new(storage).list_recent(limit).await?;
            if redemptions.is_empty() {
                println!("No redemptions recorded yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["NFT", "Wallet", "Prize", "Status", "Tracking"]);
            for redemption in redemptions {
                table.add_row(vec![
                    short(&redemption.nft_mint),
                    short(&redemption.user_wallet),
                    redemption.prize_id.to_string(),
                    redemption.status.to_string(),
                    redemption
                        .tracking_number
                        .clone()
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{}", table);
        }

        RedemptionCommands::Purge { force } => {
            if !force {
                let confirm = Confirm::new()
                    .with_prompt(
                        "Purge label and tracking URLs from redemptions past their retention deadline?",
                    )
                    .default(false)
                    .interact()
                    .map_err(|e| GachaponError::internal(e.to_string()))?;

                if !confirm {
                    println!("Purge cancelled.");
                    return Ok(());
                }
            }

            let purged = RedemptionStore::new(storage)
                .purge_expired_pii(Utc::now())
                .await?;
            println!("Purged shipping artifacts from {} redemption(s).", purged);
        }
    }

    Ok(())
}

fn short(value: &str) -> String {
    if value.len() > 16 {
        format!("{}..", &value[..16])
    } else {
        value.to_string()
    }
}

use clap::Subcommand;
use gachapon_core::{Result, Storage};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum DbCommands {
    /// Print the database location
    Path,
    /// Show row counts per table
    Stats,
}

pub async fn handle_db_command(
    cmd: DbCommands,
    storage: &Arc<Storage>,
    db_path: &Path,
) -> Result<()> {
    match cmd {
        DbCommands::Path => {
            println!("{}", db_path.display());
        }

        DbCommands::Stats => {
            let conn = storage.get_connection().await;
            for table in [
                "games",
                "prizes",
                "plays",
                "nfts",
                "nft_ownership",
                "redemptions",
            ] {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?;
                println!("{:>14}: {}", table, count);
            }
        }
    }

    Ok(())
}

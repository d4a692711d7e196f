use crate::error::Result;
use crate::storage::Storage;
use crate::types::Game;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub struct GameStore<'a> {
    storage: &'a Storage,
}

impl<'a> GameStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn upsert(&self, game: &Game) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO games
             (id, address, name, token_mint, token_decimals, cost_usd_cents,
              treasury, is_active, total_plays, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                game.id,
                game.address,
                game.name,
                game.token_mint,
                game.token_decimals,
                game.cost_usd_cents as i64,
                game.treasury,
                game.is_active,
                game.total_plays as i64,
                game.created_at.timestamp(),
            ],
        )?;

        tracing::info!("Saved game {} ({})", game.name, game.address);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Game>> {
        let conn = self.storage.get_connection().await;
        let game = conn
            .query_row(
                "SELECT id, address, name, token_mint, token_decimals, cost_usd_cents,
                        treasury, is_active, total_plays, created_at
                 FROM games WHERE id = ?1",
                params![id],
                row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    /// Resolve a game by its on-chain account address.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<Game>> {
        let conn = self.storage.get_connection().await;
        let game = conn
            .query_row(
                "SELECT id, address, name, token_mint, token_decimals, cost_usd_cents,
                        treasury, is_active, total_plays, created_at
                 FROM games WHERE address = ?1",
                params![address],
                row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    pub async fn list(&self) -> Result<Vec<Game>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT id, address, name, token_mint, token_decimals, cost_usd_cents,
                    treasury, is_active, total_plays, created_at
             FROM games ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_game)?;

        let mut games = Vec::new();
        for game in rows {
            games.push(game?);
        }
        Ok(games)
    }

    pub async fn increment_total_plays(&self, id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE games SET total_plays = total_plays + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

fn row_to_game(row: &rusqlite::Row<'_>) -> rusqlite::Result<Game> {
    let created_at: i64 = row.get(9)?;
    Ok(Game {
        id: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        token_mint: row.get(3)?,
        token_decimals: row.get(4)?,
        cost_usd_cents: row.get::<_, i64>(5)? as u64,
        treasury: row.get(6)?,
        is_active: row.get(7)?,
        total_plays: row.get::<_, i64>(8)? as u64,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_game() -> Game {
        Game {
            id: uuid::Uuid::new_v4().to_string(),
            address: "GameAcc111111111111111111111111111111111111".to_string(),
            name: "Neko Machine".to_string(),
            token_mint: "So11111111111111111111111111111111111111112".to_string(),
            token_decimals: 9,
            cost_usd_cents: 500,
            treasury: "Treas111111111111111111111111111111111111111".to_string(),
            is_active: true,
            total_plays: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolves_by_address_and_counts_plays() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("test.db")).await.unwrap();
        let store = GameStore::new(&storage);

        let game = sample_game();
        store.upsert(&game).await.unwrap();

        let loaded = store.get_by_address(&game.address).await.unwrap().unwrap();
        assert_eq!(loaded.id, game.id);
        assert_eq!(loaded.token_decimals, 9);

        assert!(store.get_by_address("unknown").await.unwrap().is_none());

        store.increment_total_plays(&game.id).await.unwrap();
        store.increment_total_plays(&game.id).await.unwrap();
        let loaded = store.get(&game.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_plays, 2);
    }
}

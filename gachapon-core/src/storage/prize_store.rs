use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Prize, PrizeTier};
use rusqlite::{params, OptionalExtension};

pub struct PrizeStore<'a> {
    storage: &'a Storage,
}

impl<'a> PrizeStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn upsert(&self, prize: &Prize) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO prizes
             (id, game_id, prize_id, name, tier, probability_bp, supply_total,
              supply_remaining, length_in, width_in, height_in, weight_grams, cost_usd_cents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(game_id, prize_id) DO UPDATE SET
                 name = excluded.name,
                 tier = excluded.tier,
                 probability_bp = excluded.probability_bp,
                 supply_total = excluded.supply_total,
                 supply_remaining = excluded.supply_remaining,
                 length_in = excluded.length_in,
                 width_in = excluded.width_in,
                 height_in = excluded.height_in,
                 weight_grams = excluded.weight_grams,
                 cost_usd_cents = excluded.cost_usd_cents",
            params![
                prize.id,
                prize.game_id,
                prize.prize_id,
                prize.name,
                prize.tier.as_str(),
                prize.probability_bp,
                prize.supply_total,
                prize.supply_remaining,
                prize.length_in,
                prize.width_in,
                prize.height_in,
                prize.weight_grams,
                prize.cost_usd_cents as i64,
            ],
        )?;

        Ok(())
    }

    pub async fn get(&self, game_id: &str, prize_id: u32) -> Result<Option<Prize>> {
        let conn = self.storage.get_connection().await;
        let prize = conn
            .query_row(
                "SELECT id, game_id, prize_id, name, tier, probability_bp, supply_total,
                        supply_remaining, length_in, width_in, height_in, weight_grams,
                        cost_usd_cents
                 FROM prizes WHERE game_id = ?1 AND prize_id = ?2",
                params![game_id, prize_id],
                row_to_prize,
            )
            .optional()?;
        Ok(prize)
    }

    /// Prizes in within-game index order. The finalizer builds its
    /// cumulative probability table from exactly this ordering.
    pub async fn list_for_game(&self, game_id: &str) -> Result<Vec<Prize>> {
        let conn = self.storage.get_connection().await;
        let mut stmt = conn.prepare(
            "SELECT id, game_id, prize_id, name, tier, probability_bp, supply_total,
                    supply_remaining, length_in, width_in, height_in, weight_grams,
                    cost_usd_cents
             FROM prizes WHERE game_id = ?1 ORDER BY prize_id ASC",
        )?;
        let rows = stmt.query_map(params![game_id], row_to_prize)?;

        let mut prizes = Vec::new();
        for prize in rows {
            prizes.push(prize?);
        }
        Ok(prizes)
    }
}

fn row_to_prize(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prize> {
    let tier_str: String = row.get(4)?;
    let tier: PrizeTier = tier_str.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(4, "tier".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(Prize {
        id: row.get(0)?,
        game_id: row.get(1)?,
        prize_id: row.get::<_, i64>(2)? as u32,
        name: row.get(3)?,
        tier,
        probability_bp: row.get::<_, i64>(5)? as u16,
        supply_total: row.get::<_, i64>(6)? as u32,
        supply_remaining: row.get::<_, i64>(7)? as u32,
        length_in: row.get(8)?,
        width_in: row.get(9)?,
        height_in: row.get(10)?,
        weight_grams: row.get::<_, i64>(11)? as u32,
        cost_usd_cents: row.get::<_, i64>(12)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn prize(game_id: &str, prize_id: u32, bp: u16) -> Prize {
        Prize {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            prize_id,
            name: format!("prize-{}", prize_id),
            tier: PrizeTier::Uncommon,
            probability_bp: bp,
            supply_total: 100,
            supply_remaining: 100,
            length_in: 6.5,
            width_in: 4.0,
            height_in: 3.0,
            weight_grams: 850,
            cost_usd_cents: 2500,
        }
    }

    #[tokio::test]
    async fn upsert_preserves_identity_and_updates_fields() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("test.db")).await.unwrap();
        let store = PrizeStore::new(&storage);

        let original = prize("game-1", 3, 1200);
        store.upsert(&original).await.unwrap();

        let mut updated = prize("game-1", 3, 900);
        updated.supply_remaining = 40;
        store.upsert(&updated).await.unwrap();

        let loaded = store.get("game-1", 3).await.unwrap().unwrap();
        // The (game_id, prize_id) row was replaced in place
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.probability_bp, 900);
        assert_eq!(loaded.supply_remaining, 40);
    }

    #[tokio::test]
    async fn lists_in_prize_index_order() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(&dir.path().join("test.db")).await.unwrap();
        let store = PrizeStore::new(&storage);

        for prize_id in [2u32, 0, 1] {
            store.upsert(&prize("game-1", prize_id, 100)).await.unwrap();
        }
        store.upsert(&prize("game-2", 0, 100)).await.unwrap();

        let prizes = store.list_for_game("game-1").await.unwrap();
        let ids: Vec<u32> = prizes.iter().map(|p| p.prize_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}

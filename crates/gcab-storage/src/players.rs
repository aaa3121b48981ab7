//! Players known through authenticated activity

use crate::error::Result;
use crate::{decode_address, decode_time, Store};
use chrono::{DateTime, Utc};
use gcab_core::{to_millis, Address, Player};
use sqlx::Row;

impl Store {
    /// Mark `address` active at `at`. New players start with zero energy;
    /// `last_seen_utc` never moves backward.
    pub async fn touch_player(&self, address: &Address, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO players (address, last_seen_utc, energy_balance) VALUES (?, ?, 0)
             ON CONFLICT(address) DO UPDATE SET
                last_seen_utc = MAX(players.last_seen_utc, excluded.last_seen_utc)",
        )
        .bind(address.to_hex())
        .bind(to_millis(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn player(&self, address: &Address) -> Result<Option<Player>> {
        let row = sqlx::query(
            "SELECT address, last_seen_utc, energy_balance FROM players WHERE address = ?",
        )
        .bind(address.to_hex())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let address: String = row.try_get("address")?;
                Ok(Some(Player {
                    address: decode_address("players", &address)?,
                    last_seen_utc: decode_time("players", row.try_get("last_seen_utc")?)?,
                    energy_balance: row.try_get("energy_balance")?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Players seen at or after `since`, ordered by address
    pub async fn active_players(&self, since: DateTime<Utc>) -> Result<Vec<Address>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT address FROM players WHERE last_seen_utc >= ? ORDER BY address ASC",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|a| decode_address("players", a)).collect()
    }

    /// Current energy balance; unknown players hold zero
    pub async fn energy_balance(&self, address: &Address) -> Result<i64> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT energy_balance FROM players WHERE address = ?")
                .bind(address.to_hex())
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    pub async fn player_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    #[tokio::test]
    async fn test_touch_creates_with_zero_energy() {
        let store = Store::open_in_memory().await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        store.touch_player(&addr(1), at).await.unwrap();

        let player = store.player(&addr(1)).await.unwrap().unwrap();
        assert_eq!(player.energy_balance, 0);
        assert_eq!(player.last_seen_utc, at);
        assert_eq!(store.energy_balance(&addr(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_touch_keeps_latest_seen() {
        let store = Store::open_in_memory().await.unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        store.touch_player(&addr(1), at).await.unwrap();
        store.touch_player(&addr(1), at - Duration::hours(3)).await.unwrap();

        let player = store.player(&addr(1)).await.unwrap().unwrap();
        assert_eq!(player.last_seen_utc, at);
        assert_eq!(store.player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_active_window() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 0, 2, 0).unwrap();
        store.touch_player(&addr(3), now - Duration::days(1)).await.unwrap();
        store.touch_player(&addr(1), now - Duration::days(7)).await.unwrap();
        store
            .touch_player(&addr(2), now - Duration::days(7) - Duration::seconds(1))
            .await
            .unwrap();

        let active = store.active_players(now - Duration::days(7)).await.unwrap();
        assert_eq!(active, vec![addr(1), addr(3)]);
    }
}

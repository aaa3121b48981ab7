//! Energy ledger and mint log
//!
//! The ledger is append-only. [`Store::commit_mint`] is the only writer: it
//! claims the day, appends one row per credit and increments each player's
//! balance in a single transaction.

use crate::error::{Result, StorageError};
use crate::{decode_address, decode_time, Store};
use chrono::{DateTime, Utc};
use gcab_core::{to_millis, Address, DayKey, LedgerEntry, MintDayRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Result of a mint commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MintCommit {
    /// Day claimed, entries written
    Committed { entries: usize, total: i64 },
    /// The day was already claimed; nothing written
    AlreadyMinted,
}

fn mint_record(row: &SqliteRow) -> Result<MintDayRecord> {
    let day: String = row.try_get("day")?;
    Ok(MintDayRecord {
        day: day
            .parse()
            .map_err(|e| StorageError::corrupt("mint_log", e))?,
        minted_at: decode_time("mint_log", row.try_get("minted_at")?)?,
    })
}

fn ledger_entry(row: &SqliteRow) -> Result<LedgerEntry> {
    let day: String = row.try_get("day")?;
    let address: String = row.try_get("address")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        day: day
            .parse()
            .map_err(|e| StorageError::corrupt("energy_ledger", e))?,
        address: decode_address("energy_ledger", &address)?,
        delta: row.try_get("delta")?,
        reason: row.try_get("reason")?,
        created_at: decode_time("energy_ledger", row.try_get("created_at")?)?,
    })
}

impl Store {
    pub async fn mint_record(&self, day: DayKey) -> Result<Option<MintDayRecord>> {
        let row = sqlx::query("SELECT day, minted_at FROM mint_log WHERE day = ?")
            .bind(day.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mint_record).transpose()
    }

    /// Most recently minted day
    pub async fn last_mint(&self) -> Result<Option<MintDayRecord>> {
        let row = sqlx::query("SELECT day, minted_at FROM mint_log ORDER BY day DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mint_record).transpose()
    }

    /// Claim `day` and credit every `(address, delta)` pair atomically.
    ///
    /// The first statement inserts the day record; if another writer already
    /// holds it the transaction is dropped and `AlreadyMinted` is returned.
    /// Every credited address must already exist in `players`.
    pub async fn commit_mint(
        &self,
        day: DayKey,
        credits: &[(Address, i64)],
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<MintCommit> {
        let now = to_millis(at);
        let day_key = day.to_string();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "INSERT INTO mint_log (day, minted_at) VALUES (?, ?) ON CONFLICT(day) DO NOTHING",
        )
        .bind(&day_key)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tracing::info!("Mint for {} already claimed", day);
            return Ok(MintCommit::AlreadyMinted);
        }

        let mut entries = 0usize;
        let mut total: i64 = 0;
        for (address, delta) in credits.iter().filter(|(_, d)| *d != 0) {
            let key = address.to_hex();
            sqlx::query(
                "INSERT INTO energy_ledger (day, address, delta, reason, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&day_key)
            .bind(&key)
            .bind(*delta)
            .bind(reason)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            let updated = sqlx::query(
                "UPDATE players SET energy_balance = energy_balance + ? WHERE address = ?",
            )
            .bind(*delta)
            .bind(&key)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated != 1 {
                tracing::error!("Mint credit for unknown player {}, rolling back {}", address, day);
                return Err(StorageError::Invariant(format!(
                    "player {} missing during mint commit for {}",
                    address, day
                )));
            }

            total = total.checked_add(*delta).ok_or_else(|| {
                StorageError::Invariant(format!("mint total overflow for {}", day))
            })?;
            entries += 1;
        }

        tx.commit().await?;
        Ok(MintCommit::Committed { entries, total })
    }

    /// Newest entries first
    pub async fn ledger_entries(&self, address: &Address, limit: u32) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, day, address, delta, reason, created_at FROM energy_ledger
             WHERE address = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(address.to_hex())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_entry).collect()
    }

    pub async fn ledger_for_day(&self, day: DayKey) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            "SELECT id, day, address, delta, reason, created_at FROM energy_ledger
             WHERE day = ? ORDER BY address ASC",
        )
        .bind(day.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_entry).collect()
    }

    /// Sum of all ledger deltas for `address`
    pub async fn ledger_total(&self, address: &Address) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM energy_ledger WHERE address = ?",
        )
        .bind(address.to_hex())
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

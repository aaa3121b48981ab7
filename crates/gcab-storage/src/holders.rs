//! Holder balance cache and scan cursor

use crate::error::{Result, StorageError};
use crate::{decode_address, decode_time, Store};
use chrono::{DateTime, Utc};
use gcab_core::units::{format_units, parse_amount};
use gcab_core::{to_millis, Address, BalanceRecord, HolderRank};
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;

pub const CURSOR_KEY: &str = "holders_last_block";
pub const DECIMALS_KEY: &str = "token_decimals";

/// Absolute balance observed outside the transfer scan (explorer bootstrap)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderSnapshot {
    pub address: Address,
    pub raw_balance: BigUint,
    /// `None` when the contract check failed; the stored flag is kept
    pub is_contract: Option<bool>,
}

fn decode_raw(s: &str) -> Result<BigUint> {
    parse_amount(s).map_err(|e| StorageError::corrupt("holders_cache", e))
}

fn balance_record(row: &SqliteRow) -> Result<BalanceRecord> {
    let address: String = row.try_get("address")?;
    let raw: String = row.try_get("balance_raw")?;
    let checked_at: Option<i64> = row.try_get("checked_at")?;
    Ok(BalanceRecord {
        address: decode_address("holders_cache", &address)?,
        raw_balance: decode_raw(&raw)?,
        numeric_balance: row.try_get("balance_num")?,
        is_contract: row.try_get("is_contract")?,
        updated_at: decode_time("holders_cache", row.try_get("updated_at")?)?,
        checked_at: checked_at
            .map(|ms| decode_time("holders_cache", ms))
            .transpose()?,
    })
}

impl Store {
    /// Next block to scan, if a scan ever started
    pub async fn scan_cursor(&self) -> Result<Option<u64>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(CURSOR_KEY)
            .fetch_optional(&self.pool)
            .await?;
        value
            .map(|v| {
                v.parse::<u64>().map_err(|_| StorageError::Corrupt {
                    table: "kv",
                    detail: format!("{} = {:?}", CURSOR_KEY, v),
                })
            })
            .transpose()
    }

    /// Persist `start` as the cursor unless one exists; returns the effective cursor
    pub async fn init_cursor(&self, start: u64) -> Result<u64> {
        sqlx::query("INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING")
            .bind(CURSOR_KEY)
            .bind(start.to_string())
            .execute(&self.pool)
            .await?;
        self.scan_cursor().await?.ok_or_else(|| {
            StorageError::Invariant(format!("{} missing after init", CURSOR_KEY))
        })
    }

    pub async fn token_decimals(&self) -> Result<Option<u8>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(DECIMALS_KEY)
            .fetch_optional(&self.pool)
            .await?;
        value
            .map(|v| {
                v.parse::<u8>().map_err(|_| StorageError::Corrupt {
                    table: "kv",
                    detail: format!("{} = {:?}", DECIMALS_KEY, v),
                })
            })
            .transpose()
    }

    pub async fn set_token_decimals(&self, decimals: u8) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(DECIMALS_KEY)
        .bind(decimals.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Merge one scan window's signed deltas and advance the cursor to
    /// `next_cursor`, atomically.
    ///
    /// Balances clamp at zero. A cursor that would not move forward aborts the
    /// whole window. Returns the number of addresses written.
    pub async fn apply_window(
        &self,
        deltas: &[(Address, BigInt)],
        next_cursor: u64,
        decimals: u8,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let now = to_millis(at);
        let mut tx = self.pool.begin().await?;
        let mut touched = 0usize;

        for (address, delta) in deltas {
            if delta.is_zero() {
                continue;
            }
            let key = address.to_hex();
            let previous: Option<String> =
                sqlx::query_scalar("SELECT balance_raw FROM holders_cache WHERE address = ?")
                    .bind(&key)
                    .fetch_optional(&mut *tx)
                    .await?;
            let previous = match previous {
                Some(raw) => BigInt::from(decode_raw(&raw)?),
                None => BigInt::zero(),
            };

            let updated = previous + delta;
            let new_raw = match updated.to_biguint() {
                Some(raw) => raw,
                None => {
                    tracing::debug!("Clamped negative balance for {} to zero", address);
                    BigUint::zero()
                }
            };

            sqlx::query(
                "INSERT INTO holders_cache (address, balance_raw, balance_num, is_contract, updated_at)
                 VALUES (?, ?, ?, 0, ?)
                 ON CONFLICT(address) DO UPDATE SET
                    balance_raw = excluded.balance_raw,
                    balance_num = excluded.balance_num,
                    updated_at = excluded.updated_at",
            )
            .bind(&key)
            .bind(new_raw.to_string())
            .bind(format_units(&new_raw, decimals))
            .bind(now)
            .execute(&mut *tx)
            .await?;
            touched += 1;
        }

        let advanced = sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value
             WHERE CAST(kv.value AS INTEGER) < CAST(excluded.value AS INTEGER)",
        )
        .bind(CURSOR_KEY)
        .bind(next_cursor.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if advanced != 1 {
            tracing::error!("Cursor refused to move to {}, rolling back window", next_cursor);
            return Err(StorageError::Invariant(format!(
                "scan cursor would not advance to {}",
                next_cursor
            )));
        }

        tx.commit().await?;
        Ok(touched)
    }

    pub async fn holder(&self, address: &Address) -> Result<Option<BalanceRecord>> {
        let row = sqlx::query(
            "SELECT address, balance_raw, balance_num, is_contract, updated_at, checked_at
             FROM holders_cache WHERE address = ?",
        )
        .bind(address.to_hex())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(balance_record).transpose()
    }

    /// Raw balances for the given addresses; unknown addresses are absent
    pub async fn holder_balances(&self, addresses: &[Address]) -> Result<HashMap<Address, BigUint>> {
        let mut conn = self.pool.acquire().await?;
        let mut balances = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let raw: Option<String> =
                sqlx::query_scalar("SELECT balance_raw FROM holders_cache WHERE address = ?")
                    .bind(address.to_hex())
                    .fetch_optional(&mut *conn)
                    .await?;
            if let Some(raw) = raw {
                balances.insert(*address, decode_raw(&raw)?);
            }
        }
        Ok(balances)
    }

    /// Upsert absolute balances. Returns rows written.
    pub async fn upsert_snapshots(
        &self,
        snapshots: &[HolderSnapshot],
        decimals: u8,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let now = to_millis(at);
        let mut tx = self.pool.begin().await?;
        for snap in snapshots {
            sqlx::query(
                "INSERT INTO holders_cache (address, balance_raw, balance_num, is_contract, updated_at, checked_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(address) DO UPDATE SET
                    balance_raw = excluded.balance_raw,
                    balance_num = excluded.balance_num,
                    is_contract = CASE WHEN excluded.checked_at IS NULL
                        THEN holders_cache.is_contract ELSE excluded.is_contract END,
                    updated_at = excluded.updated_at,
                    checked_at = COALESCE(excluded.checked_at, holders_cache.checked_at)",
            )
            .bind(snap.address.to_hex())
            .bind(snap.raw_balance.to_string())
            .bind(format_units(&snap.raw_balance, decimals))
            .bind(snap.is_contract.unwrap_or(false))
            .bind(now)
            .bind(snap.is_contract.map(|_| now))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(snapshots.len())
    }

    /// Stalest non-contract holders with a positive balance, never-checked first
    pub async fn classification_candidates(&self, limit: u32) -> Result<Vec<Address>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT address FROM holders_cache
             WHERE is_contract = 0 AND balance_raw != '0'
             ORDER BY checked_at IS NOT NULL, checked_at ASC, address ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|a| decode_address("holders_cache", a))
            .collect()
    }

    pub async fn record_classification(
        &self,
        address: &Address,
        is_contract: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE holders_cache SET is_contract = ?, checked_at = ? WHERE address = ?")
            .bind(is_contract)
            .bind(to_millis(at))
            .bind(address.to_hex())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Non-contract holders with `balance >= min`, largest first.
    /// Zero and dead addresses are never listed.
    pub async fn ranked_holders(&self, min: f64, limit: u32) -> Result<Vec<HolderRank>> {
        let rows = sqlx::query(
            "SELECT address, balance_num FROM holders_cache
             WHERE is_contract = 0 AND balance_num > 0 AND balance_num >= ?
               AND address NOT IN (?, ?)
             ORDER BY balance_num DESC, address ASC
             LIMIT ?",
        )
        .bind(min)
        .bind(Address::ZERO.to_hex())
        .bind(Address::DEAD.to_hex())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let address: String = row.try_get("address")?;
                Ok(HolderRank {
                    address: decode_address("holders_cache", &address)?,
                    balance: row.try_get("balance_num")?,
                })
            })
            .collect()
    }

    pub async fn holder_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM holders_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

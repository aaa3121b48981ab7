//! # GCAb Storage
//!
//! Persistent state in a single SQLite database.
//!
//! ## Storage Layout
//!
//! - `holders_cache` - address → raw balance, float projection, contract flag
//! - `kv` - named scalars: `holders_last_block` (scan cursor), `token_decimals`
//! - `players` - authenticated players and their energy balance
//! - `energy_ledger` - append-only energy credits (update/delete rejected by triggers)
//! - `mint_log` - one row per minted UTC day
//!
//! Every multi-row write runs inside one transaction: a scan window's deltas
//! together with its cursor advance, and a mint's ledger rows together with
//! the player increments and the day record.

pub mod error;
pub mod holders;
pub mod ledger;
pub mod players;

pub use error::{Result, StorageError};
pub use holders::HolderSnapshot;
pub use ledger::MintCommit;

use chrono::{DateTime, Utc};
use gcab_core::{from_millis, Address};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        address TEXT PRIMARY KEY,
        last_seen_utc INTEGER NOT NULL,
        energy_balance INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_players_last_seen ON players(last_seen_utc)",
    "CREATE TABLE IF NOT EXISTS energy_ledger (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        day TEXT NOT NULL,
        address TEXT NOT NULL,
        delta INTEGER NOT NULL,
        reason TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_energy_ledger_address ON energy_ledger(address)",
    "CREATE TRIGGER IF NOT EXISTS energy_ledger_no_update BEFORE UPDATE ON energy_ledger
     BEGIN SELECT RAISE(ABORT, 'energy_ledger is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS energy_ledger_no_delete BEFORE DELETE ON energy_ledger
     BEGIN SELECT RAISE(ABORT, 'energy_ledger is append-only'); END",
    "CREATE TABLE IF NOT EXISTS mint_log (
        day TEXT PRIMARY KEY,
        minted_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS holders_cache (
        address TEXT PRIMARY KEY,
        balance_raw TEXT NOT NULL,
        balance_num REAL NOT NULL,
        is_contract INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        checked_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_holders_cache_balance ON holders_cache(balance_num DESC)",
    "CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Connection settings
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the GCAb database
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file at `path`
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let connect = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await?;

        tracing::info!("Opened store at {:?}", path.as_ref());
        Self::with_pool(pool).await
    }

    /// Private in-memory database. One connection, kept for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn decode_address(table: &'static str, value: &str) -> Result<Address> {
    value.parse().map_err(|e| StorageError::corrupt(table, e))
}

pub(crate) fn decode_time(table: &'static str, ms: i64) -> Result<DateTime<Utc>> {
    from_millis(ms).map_err(|e| StorageError::corrupt(table, e))
}

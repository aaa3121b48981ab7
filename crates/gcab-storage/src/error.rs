//! Storage errors

use gcab_core::GcabError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value failed to parse back into its domain type
    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    /// A commit would break a ledger invariant; the transaction is rolled back
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl StorageError {
    pub(crate) fn corrupt(table: &'static str, err: GcabError) -> Self {
        Self::Corrupt {
            table,
            detail: err.to_string(),
        }
    }

    /// Busy/locked database; the next pass may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                let msg = db.message();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        }
    }
}

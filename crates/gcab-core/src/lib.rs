//! # GCAb Core
//!
//! Shared building blocks for the holder index and the daily energy mint:
//!
//! - [`Address`] - canonical EVM account key (lowercase storage form, EIP-55 display)
//! - [`DayKey`] - UTC calendar day used for mint idempotency
//! - record types persisted by the store (`BalanceRecord`, `Player`,
//!   `LedgerEntry`, `MintDayRecord`)
//! - raw amount helpers working on arbitrary-precision integers
//! - a [`Clock`] seam for time-dependent logic

pub mod address;
pub mod clock;
pub mod error;
pub mod types;
pub mod units;

pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GcabError, Result};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::error::{GcabError, Result};
    pub use crate::types::*;
    pub use num_bigint::{BigInt, BigUint};
}

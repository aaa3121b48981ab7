//! Domain records shared by the store, indexer and mint

use crate::address::Address;
use crate::error::{GcabError, Result};
use crate::units::decimal_string;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ledger reason recorded for the daily allocation
pub const REASON_DAILY_MINT: &str = "DAILY_MINT";

/// UTC calendar day, the anchor for all daily idempotency
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Day containing the given instant
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl fmt::Debug for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DayKey({})", self)
    }
}

impl FromStr for DayKey {
    type Err = GcabError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| GcabError::InvalidDayKey(s.into()))
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Milliseconds since the Unix epoch
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]
pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(GcabError::InvalidTimestamp(ms))
}

/// Cached holder balance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub address: Address,

    /// Authoritative balance in the token's smallest unit
    #[serde(with = "decimal_string")]
    pub raw_balance: BigUint,

    /// Decimal-adjusted projection, ranking/display only
    pub numeric_balance: f64,

    pub is_contract: bool,

    pub updated_at: DateTime<Utc>,

    /// Last successful contract-code check
    pub checked_at: Option<DateTime<Utc>>,
}

/// Ranked holder row exposed to readers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HolderRank {
    pub address: Address,
    pub balance: f64,
}

/// Player known through authenticated activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub address: Address,
    pub last_seen_utc: DateTime<Utc>,
    pub energy_balance: i64,
}

/// Append-only ledger row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub day: DayKey,
    pub address: Address,
    pub delta: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Idempotency guard: one per successfully minted day
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintDayRecord {
    pub day: DayKey,
    pub minted_at: DateTime<Utc>,
}

/// ERC-20 `Transfer` event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub value: BigUint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_day_key_from_datetime() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
        let day = DayKey::from_datetime(at);
        assert_eq!(day.to_string(), "2026-03-09");
        assert_eq!("2026-03-09".parse::<DayKey>().unwrap(), day);
    }

    #[test]
    fn test_day_key_rejects_garbage() {
        assert!("2026-13-01".parse::<DayKey>().is_err());
        assert!("yesterday".parse::<DayKey>().is_err());
    }

    #[test]
    fn test_millis_roundtrip() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap();
        let back = from_millis(to_millis(at)).unwrap();
        assert_eq!(back, at);
        assert_eq!(back.minute(), 2);
    }

    #[test]
    fn test_balance_record_json_uses_string_amount() {
        let record = BalanceRecord {
            address: Address::DEAD,
            raw_balance: BigUint::from(10u32).pow(30),
            numeric_balance: 1e12,
            is_contract: false,
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            checked_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["raw_balance"], "1000000000000000000000000000000");
        let back: BalanceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}

//! Raw token amounts
//!
//! Raw balances are arbitrary-precision unsigned integers in the token's
//! smallest unit. The float projection produced by [`format_units`] is for
//! display and ranking only.

use crate::error::{GcabError, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// `10^decimals` as a big integer
pub fn unit_scale(decimals: u8) -> BigUint {
    BigUint::from(10u32).pow(u32::from(decimals))
}

/// Whole-token amount, rounded down
pub fn whole_units(raw: &BigUint, decimals: u8) -> BigUint {
    raw / unit_scale(decimals)
}

/// Raw amount for a whole-token quantity
pub fn to_raw(whole: u64, decimals: u8) -> BigUint {
    BigUint::from(whole) * unit_scale(decimals)
}

/// Decimal-adjusted float projection
pub fn format_units(raw: &BigUint, decimals: u8) -> f64 {
    let scale = unit_scale(decimals);
    let whole = (raw / &scale).to_f64().unwrap_or(f64::MAX);
    let frac = (raw % &scale).to_f64().unwrap_or(0.0);
    let denom = scale.to_f64().unwrap_or(f64::MAX);
    whole + frac / denom
}

/// Parse a decimal string or a `0x` hex quantity (`0x` alone is zero)
pub fn parse_amount(s: &str) -> Result<BigUint> {
    let s = s.trim();
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if digits.is_empty() {
            return Ok(BigUint::zero());
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GcabError::InvalidAmount(s.into()));
        }
        return BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| GcabError::InvalidAmount(s.into()));
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GcabError::InvalidAmount(s.into()));
    }
    BigUint::parse_bytes(s.as_bytes(), 10).ok_or_else(|| GcabError::InvalidAmount(s.into()))
}

/// Serde adapter encoding a `BigUint` as a decimal string
pub mod decimal_string {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_amount(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0x").unwrap(), BigUint::zero());
        assert_eq!(parse_amount("0x0a").unwrap(), BigUint::from(10u32));
        assert_eq!(parse_amount("12345").unwrap(), BigUint::from(12345u32));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("0xgg").is_err());
    }

    #[test]
    fn test_parse_amount_rejects_signs_and_separators() {
        assert!(parse_amount("+1000").is_err());
        assert!(parse_amount("1_000").is_err());
        assert!(parse_amount("+1_000").is_err());
        assert!(parse_amount("0x+ff").is_err());
        assert!(parse_amount("0xff_ff").is_err());
        assert_eq!(parse_amount("0xffff").unwrap(), BigUint::from(0xffffu32));
    }

    #[test]
    fn test_uint256_max_parses() {
        let max = format!("0x{}", "f".repeat(64));
        let value = parse_amount(&max).unwrap();
        assert_eq!(value.bits(), 256);
    }

    #[test]
    fn test_whole_units_floor() {
        let raw = parse_amount("1999999999999999999").unwrap();
        assert_eq!(whole_units(&raw, 18), BigUint::from(1u32));
        assert_eq!(to_raw(10_000, 18), parse_amount("10000000000000000000000").unwrap());
    }

    #[test]
    fn test_format_units() {
        let raw = parse_amount("1500000000000000000").unwrap();
        assert!((format_units(&raw, 18) - 1.5).abs() < 1e-12);
        assert_eq!(format_units(&BigUint::zero(), 18), 0.0);
    }
}

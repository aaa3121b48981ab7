//! Account addresses
//!
//! Addresses are 20-byte EVM account identifiers. Input may be all-lowercase,
//! all-uppercase, or EIP-55 checksummed; mixed-case input must carry a valid
//! checksum. The canonical form used as a storage key is lowercase hex.

use crate::error::{GcabError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// 20-byte account address
///
/// Ordering is byte-wise, which matches lexicographic ordering of the
/// lowercase hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Mint/burn address
    pub const ZERO: Self = Self([0u8; 20]);

    /// Conventional burn sink `0x000000000000000000000000000000000000dEaD`
    pub const DEAD: Self = Self([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xde, 0xad,
    ]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Zero or dead address; never counted as a holder
    pub fn is_burn_sink(&self) -> bool {
        *self == Self::ZERO || *self == Self::DEAD
    }

    /// Canonical lowercase form, `0x`-prefixed
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case checksum form
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Extract the address from an indexed 32-byte log topic
    pub fn from_topic(topic: &str) -> Result<Self> {
        let digits = strip_hex_prefix(topic).ok_or_else(|| GcabError::InvalidTopic(topic.into()))?;
        if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GcabError::InvalidTopic(topic.into()));
        }
        let bytes = hex::decode(&digits[24..]).map_err(|_| GcabError::InvalidTopic(topic.into()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

fn strip_hex_prefix(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

impl FromStr for Address {
    type Err = GcabError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = strip_hex_prefix(s).ok_or_else(|| GcabError::InvalidAddress(s.into()))?;
        if digits.len() != 40 {
            return Err(GcabError::InvalidAddress(s.into()));
        }

        let bytes = hex::decode(digits).map_err(|_| GcabError::InvalidAddress(s.into()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        let address = Self(out);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *digits {
            return Err(GcabError::InvalidChecksum(s.into()));
        }

        Ok(address)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors from EIP-55
    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn test_checksum_roundtrip() {
        for s in CHECKSUMMED {
            let addr: Address = s.parse().unwrap();
            assert_eq!(addr.to_checksum(), s);
            assert_eq!(addr.to_hex(), s.to_lowercase());
        }
    }

    #[test]
    fn test_single_case_accepted() {
        let lower: Address = CHECKSUMMED[0].to_lowercase().parse().unwrap();
        let upper: Address = format!("0x{}", CHECKSUMMED[0][2..].to_uppercase())
            .parse()
            .unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // flip the case of one letter
        let bad = "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        assert!(matches!(
            bad.parse::<Address>(),
            Err(GcabError::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse::<Address>().is_err());
        assert!("0x5aaeb6053f".parse::<Address>().is_err());
        assert!("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_from_topic() {
        let topic = "0x0000000000000000000000005aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let addr = Address::from_topic(topic).unwrap();
        assert_eq!(addr.to_hex(), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert!(Address::from_topic("0x1234").is_err());
        let non_ascii = format!("0x{}é{}", "0".repeat(23), "0".repeat(39));
        assert!(Address::from_topic(&non_ascii).is_err());
    }

    #[test]
    fn test_burn_sinks() {
        assert!(Address::ZERO.is_zero());
        assert!(Address::DEAD.is_burn_sink());
        assert_eq!(
            Address::DEAD.to_hex(),
            "0x000000000000000000000000000000000000dead"
        );
        let holder: Address = CHECKSUMMED[1].parse().unwrap();
        assert!(!holder.is_burn_sink());
    }

    #[test]
    fn test_ordering_matches_hex() {
        let mut addrs: Vec<Address> = CHECKSUMMED.iter().map(|s| s.parse().unwrap()).collect();
        addrs.sort();
        let hexes: Vec<String> = addrs.iter().map(|a| a.to_hex()).collect();
        let mut sorted = hexes.clone();
        sorted.sort();
        assert_eq!(hexes, sorted);
    }

    #[test]
    fn test_serde_lowercase() {
        let addr: Address = CHECKSUMMED[2].parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED[2].to_lowercase()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}

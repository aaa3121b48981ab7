//! Error types for GCAb core operations

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, GcabError>;

/// Errors raised while parsing or validating core values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcabError {
    // === Address ===
    /// Not `0x` followed by 40 hex digits
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Mixed-case address whose EIP-55 checksum does not match
    #[error("Address checksum mismatch: {0}")]
    InvalidChecksum(String),

    /// Log topic is not a 32-byte word
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    // === Values ===
    /// Day key is not a `YYYY-MM-DD` date
    #[error("Invalid day key: {0}")]
    InvalidDayKey(String),

    /// Amount is not a non-negative decimal or hex integer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Timestamp outside the representable range
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl GcabError {
    /// Error code used in API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidAddress(_) => 1001,
            Self::InvalidChecksum(_) => 1002,
            Self::InvalidTopic(_) => 1003,
            Self::InvalidDayKey(_) => 1004,
            Self::InvalidAmount(_) => 1005,
            Self::InvalidTimestamp(_) => 1006,
        }
    }

    /// Whether the caller supplied the bad value (as opposed to corrupt data)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_) | Self::InvalidChecksum(_) | Self::InvalidDayKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GcabError::InvalidAddress("x".into()).code(), 1001);
        assert_eq!(GcabError::InvalidTimestamp(-1).code(), 1006);
    }

    #[test]
    fn test_error_display() {
        let err = GcabError::InvalidChecksum("0xAbC".into());
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_input_errors() {
        assert!(GcabError::InvalidAddress("zz".into()).is_input_error());
        assert!(!GcabError::InvalidAmount("zz".into()).is_input_error());
    }
}

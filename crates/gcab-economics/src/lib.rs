//! # GCAb Economics - Daily Energy Emission & Allocation
//!
//! Turns a day's energy emission into integer per-holder credits.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ raw balances │──►│ WeightModel  │──►│ largest-remainder│──►│ SoftCapPolicy│
//! │ (BigUint)    │   │ sqrt · (1+kln)│   │ base pass        │   │ clip + spread│
//! └──────────────┘   └──────────────┘   └──────────────────┘   └──────────────┘
//! ```
//!
//! | Parameter | Default |
//! |-----------|---------|
//! | Daily emission | 1,000,000 energy |
//! | Vault cut | 20% |
//! | Holder pool | 800,000 energy |
//! | Eligibility floor | 10,000 whole tokens |
//! | Soft cap | 5% of holder pool (40,000) |
//!
//! All pool arithmetic is integer. Floats appear only inside the weight
//! function and are quantized before apportionment.

pub mod allocation;
pub mod emission;
pub mod soft_cap;
pub mod weight;

pub use allocation::{allocate_exact, Allocation, AllocationEngine, AllocationError, AllocationItem, AllocationOutcome};
pub use emission::{DailyEmission, EconomicsParams};
pub use soft_cap::{CappedAllocation, SoftCapPolicy};
pub use weight::WeightModel;

/// Energy economy constants
pub mod constants {
    /// Energy emitted per UTC day
    pub const DAILY_EMISSION: u64 = 1_000_000;

    /// Share of the emission kept by the vault, in basis points
    pub const VAULT_CUT_BPS: u32 = 2_000;

    /// Energy distributed to holders per day
    pub const HOLDER_POOL: u64 = DAILY_EMISSION * (10_000 - VAULT_CUT_BPS as u64) / 10_000;

    /// Per-address soft cap, in basis points of the holder pool
    pub const SOFT_CAP_BPS: u32 = 500;

    /// Per-address soft cap: 40,000 energy
    pub const SOFT_CAP: u64 = HOLDER_POOL * SOFT_CAP_BPS as u64 / 10_000;

    /// Minimum holding, in whole tokens, to take part in a mint
    pub const MIN_BALANCE_TOKENS: u64 = 10_000;

    /// Logarithmic kicker coefficient of the weight model
    pub const WEIGHT_K: f64 = 0.15;

    /// Fixed-point scale applied to float weights before allocation
    pub const WEIGHT_SCALE: f64 = 1_000_000.0;

    /// Players seen within this many days are active
    pub const ACTIVE_WINDOW_DAYS: i64 = 7;

    /// Basis point denominator
    pub const BPS_DENOMINATOR: u64 = 10_000;
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_pool() {
        assert_eq!(HOLDER_POOL, 800_000);
    }

    #[test]
    fn test_soft_cap() {
        assert_eq!(SOFT_CAP, 40_000);
    }
}

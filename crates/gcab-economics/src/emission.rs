//! # Daily Emission
//!
//! Splits the day's energy emission between the vault and the holder pool,
//! and bundles the tunable economy parameters.
//!
//! ```text
//! 1,000,000 energy/day
//!   ├── vault (20%)        200,000
//!   └── holder pool (80%)  800,000  ── soft cap 5% → 40,000 per address
//! ```

use crate::constants::*;
use crate::soft_cap::SoftCapPolicy;
use crate::weight::WeightModel;
use crate::AllocationEngine;
use serde::{Deserialize, Serialize};

/// One day's emission split
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEmission {
    /// Total emitted for the day
    pub total: u64,
    /// Vault share
    pub vault_share: u64,
    /// Distributed to holders
    pub holder_pool: u64,
}

impl DailyEmission {
    /// Split `total` with the vault taking `vault_cut_bps`; the holder pool
    /// is rounded down and the vault absorbs the remainder
    pub fn from_total(total: u64, vault_cut_bps: u32) -> Self {
        let cut = u64::from(vault_cut_bps).min(BPS_DENOMINATOR);
        let holder_pool =
            (u128::from(total) * u128::from(BPS_DENOMINATOR - cut) / u128::from(BPS_DENOMINATOR)) as u64;
        Self {
            total,
            vault_share: total - holder_pool,
            holder_pool,
        }
    }

    /// Shares add up to the total exactly
    pub fn verify(&self) -> bool {
        self.vault_share.checked_add(self.holder_pool) == Some(self.total)
    }
}

/// Tunable economy parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicsParams {
    /// Energy emitted per day
    #[serde(default = "default_daily_emission")]
    pub daily_emission: u64,

    /// Vault cut in basis points
    #[serde(default = "default_vault_cut_bps")]
    pub vault_cut_bps: u32,

    /// Soft cap in basis points of the holder pool
    #[serde(default = "default_soft_cap_bps")]
    pub soft_cap_bps: u32,

    /// Eligibility floor in whole tokens
    #[serde(default = "default_min_balance_tokens")]
    pub min_balance_tokens: u64,

    /// Weight model kicker
    #[serde(default = "default_weight_k")]
    pub weight_k: f64,

    /// Activity window in days
    #[serde(default = "default_active_window_days")]
    pub active_window_days: i64,
}

fn default_daily_emission() -> u64 {
    DAILY_EMISSION
}

fn default_vault_cut_bps() -> u32 {
    VAULT_CUT_BPS
}

fn default_soft_cap_bps() -> u32 {
    SOFT_CAP_BPS
}

fn default_min_balance_tokens() -> u64 {
    MIN_BALANCE_TOKENS
}

fn default_weight_k() -> f64 {
    WEIGHT_K
}

fn default_active_window_days() -> i64 {
    ACTIVE_WINDOW_DAYS
}

impl Default for EconomicsParams {
    fn default() -> Self {
        Self {
            daily_emission: default_daily_emission(),
            vault_cut_bps: default_vault_cut_bps(),
            soft_cap_bps: default_soft_cap_bps(),
            min_balance_tokens: default_min_balance_tokens(),
            weight_k: default_weight_k(),
            active_window_days: default_active_window_days(),
        }
    }
}

impl EconomicsParams {
    pub fn emission(&self) -> DailyEmission {
        DailyEmission::from_total(self.daily_emission, self.vault_cut_bps)
    }

    pub fn soft_cap(&self) -> u64 {
        let pool = self.emission().holder_pool;
        (u128::from(pool) * u128::from(self.soft_cap_bps) / u128::from(BPS_DENOMINATOR)) as u64
    }

    pub fn weight_model(&self) -> WeightModel {
        WeightModel::new(self.weight_k)
    }

    pub fn engine(&self) -> AllocationEngine {
        AllocationEngine::new(self.emission().holder_pool, SoftCapPolicy::new(self.soft_cap()))
    }
}

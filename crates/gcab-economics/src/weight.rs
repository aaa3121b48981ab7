//! # Holder Weight Model
//!
//! `weight(b) = sqrt(b) * (1 + k * ln(1 + b))`
//!
//! Square root damps whale dominance; the log kicker still rewards large,
//! sustained holdings more than the square root alone would. Non-positive
//! balances weigh nothing and are excluded from allocation.

use crate::constants::{WEIGHT_K, WEIGHT_SCALE};
use serde::{Deserialize, Serialize};

/// Balance → weight mapping
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightModel {
    /// Logarithmic kicker coefficient
    pub k: f64,
}

impl Default for WeightModel {
    fn default() -> Self {
        Self { k: WEIGHT_K }
    }
}

impl WeightModel {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    /// Float weight for a whole-token balance
    pub fn weight(&self, balance: f64) -> f64 {
        if balance.is_nan() || balance <= 0.0 {
            return 0.0;
        }
        balance.sqrt() * (1.0 + self.k * balance.ln_1p())
    }

    /// Weight quantized to integer units for allocation
    pub fn weight_units(&self, balance: f64) -> u128 {
        let scaled = (self.weight(balance) * WEIGHT_SCALE).round();
        if scaled.is_finite() && scaled > 0.0 {
            scaled as u128
        } else {
            0
        }
    }
}

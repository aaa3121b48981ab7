//! # Exact Pool Allocation
//!
//! Largest-remainder apportionment of an integer pool across weighted
//! addresses. Shares are computed as exact integer quotient/remainder pairs
//! (`P·w = base·W + rem`), so the result is exact and reproducible:
//!
//! 1. `base_i = ⌊P·w_i / W⌋`, `rem_i = P·w_i mod W`
//! 2. `U = P − Σ base_i` (always `< n`)
//! 3. one extra unit to each of the first `U` items ordered by
//!    `rem` descending, then address ascending

use crate::soft_cap::SoftCapPolicy;
use gcab_core::Address;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Allocation failures. None of these occur for well-formed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Duplicate participant: {0}")]
    DuplicateAddress(Address),

    #[error("Arithmetic overflow computing shares")]
    Overflow,

    #[error("Allocation sum mismatch: allocated {allocated} + unallocated {unallocated} != pool {pool}")]
    SumMismatch {
        pool: u64,
        allocated: u64,
        unallocated: u64,
    },
}

/// Participant in one allocation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationItem {
    pub address: Address,
    /// Integer weight units; zero-weight items are excluded
    pub weight: u128,
}

impl AllocationItem {
    pub fn new(address: Address, weight: u128) -> Self {
        Self { address, weight }
    }
}

/// Integer credit for one address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub address: Address,
    pub amount: u64,
}

/// Largest-remainder allocation of `pool` across `items`.
///
/// Returns allocations ordered by address. Zero-weight items are dropped;
/// with no positive weight the result is empty.
pub fn allocate_exact(pool: u64, items: &[AllocationItem]) -> Result<Vec<Allocation>, AllocationError> {
    let mut live: Vec<&AllocationItem> = items.iter().filter(|i| i.weight > 0).collect();
    if live.is_empty() {
        return Ok(Vec::new());
    }
    live.sort_by(|a, b| a.address.cmp(&b.address));
    if let Some(dup) = live.windows(2).find(|w| w[0].address == w[1].address) {
        return Err(AllocationError::DuplicateAddress(dup[0].address));
    }

    let total_weight = live
        .iter()
        .try_fold(0u128, |acc, i| acc.checked_add(i.weight))
        .ok_or(AllocationError::Overflow)?;

    struct Share {
        address: Address,
        base: u64,
        rem: u128,
    }

    let mut shares = Vec::with_capacity(live.len());
    let mut distributed: u64 = 0;
    for item in &live {
        let numerator = u128::from(pool)
            .checked_mul(item.weight)
            .ok_or(AllocationError::Overflow)?;
        // base <= pool because weight <= total_weight
        let base = (numerator / total_weight) as u64;
        distributed += base;
        shares.push(Share {
            address: item.address,
            base,
            rem: numerator % total_weight,
        });
    }

    let leftover = (pool - distributed) as usize;
    debug!(
        "largest remainder: pool={} items={} leftover={}",
        pool,
        shares.len(),
        leftover
    );

    shares.sort_by(|a, b| match b.rem.cmp(&a.rem) {
        Ordering::Equal => a.address.cmp(&b.address),
        other => other,
    });
    for share in shares.iter_mut().take(leftover) {
        share.base += 1;
    }

    let mut out: Vec<Allocation> = shares
        .into_iter()
        .map(|s| Allocation {
            address: s.address,
            amount: s.base,
        })
        .collect();
    out.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(out)
}

/// Result of a full allocation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub pool: u64,
    /// Per-address credits, ordered by address, zero amounts omitted
    pub allocations: Vec<Allocation>,
    /// Overflow with no under-cap destination
    pub unallocated: u64,
    /// Soft-cap redistribution rounds performed
    pub cap_rounds: u32,
}

impl AllocationOutcome {
    pub fn allocated(&self) -> u64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

/// Base pass followed by the soft-cap policy, with the exact-sum check
#[derive(Clone, Debug)]
pub struct AllocationEngine {
    pool: u64,
    policy: SoftCapPolicy,
}

impl AllocationEngine {
    pub fn new(pool: u64, policy: SoftCapPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> u64 {
        self.pool
    }

    pub fn policy(&self) -> &SoftCapPolicy {
        &self.policy
    }

    pub fn run(&self, items: &[AllocationItem]) -> Result<AllocationOutcome, AllocationError> {
        let base = allocate_exact(self.pool, items)?;
        let unallocated_base = if base.is_empty() { self.pool } else { 0 };

        let capped = self.policy.apply(base)?;
        let outcome = AllocationOutcome {
            pool: self.pool,
            allocations: capped
                .allocations
                .into_iter()
                .filter(|a| a.amount > 0)
                .collect(),
            unallocated: capped.unallocated + unallocated_base,
            cap_rounds: capped.rounds,
        };

        let allocated = outcome.allocated();
        if allocated.checked_add(outcome.unallocated) != Some(self.pool) {
            error!(
                "allocation invariant violated: allocated={} unallocated={} pool={}",
                allocated, outcome.unallocated, self.pool
            );
            return Err(AllocationError::SumMismatch {
                pool: self.pool,
                allocated,
                unallocated: outcome.unallocated,
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    fn amounts(allocs: &[Allocation]) -> Vec<(u8, u64)> {
        allocs.iter().map(|a| (a.address.as_bytes()[19], a.amount)).collect()
    }

    #[test]
    fn test_equal_weights_tie_break_by_address() {
        // C, A, B supplied out of order; the single leftover unit goes to A
        let items = vec![
            AllocationItem::new(addr(0xc), 1),
            AllocationItem::new(addr(0xa), 1),
            AllocationItem::new(addr(0xb), 1),
        ];
        let out = allocate_exact(100, &items).unwrap();
        assert_eq!(amounts(&out), vec![(0xa, 34), (0xb, 33), (0xc, 33)]);
    }

    #[test]
    fn test_largest_remainder_wins() {
        // exact shares: 10 * 1/6 = 1.67, 10 * 2/6 = 3.33, 10 * 3/6 = 5
        let items = vec![
            AllocationItem::new(addr(1), 1),
            AllocationItem::new(addr(2), 2),
            AllocationItem::new(addr(3), 3),
        ];
        let out = allocate_exact(10, &items).unwrap();
        assert_eq!(amounts(&out), vec![(1, 2), (2, 3), (3, 5)]);
    }

    #[test]
    fn test_zero_weight_excluded() {
        let items = vec![
            AllocationItem::new(addr(1), 0),
            AllocationItem::new(addr(2), 5),
        ];
        let out = allocate_exact(7, &items).unwrap();
        assert_eq!(amounts(&out), vec![(2, 7)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(allocate_exact(100, &[]).unwrap().is_empty());
        let zeros = vec![AllocationItem::new(addr(1), 0)];
        assert!(allocate_exact(100, &zeros).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let items = vec![AllocationItem::new(addr(1), 1), AllocationItem::new(addr(1), 2)];
        assert_eq!(
            allocate_exact(10, &items),
            Err(AllocationError::DuplicateAddress(addr(1)))
        );
    }

    #[test]
    fn test_overflow_reported() {
        let items = vec![
            AllocationItem::new(addr(1), u128::MAX),
            AllocationItem::new(addr(2), 1),
        ];
        assert_eq!(allocate_exact(10, &items), Err(AllocationError::Overflow));
    }

    #[test]
    fn test_engine_reports_unallocated_without_participants() {
        let engine = AllocationEngine::new(800_000, SoftCapPolicy::new(40_000));
        let outcome = engine.run(&[]).unwrap();
        assert!(outcome.allocations.is_empty());
        assert_eq!(outcome.unallocated, 800_000);
    }

    #[test]
    fn test_engine_with_cap() {
        // one whale and many small holders; whale is clipped, excess spread evenly
        let mut items = vec![AllocationItem::new(addr(0), 1_000_000)];
        for n in 1..=40 {
            items.push(AllocationItem::new(addr(n), 1_000));
        }
        let engine = AllocationEngine::new(800_000, SoftCapPolicy::new(40_000));
        let outcome = engine.run(&items).unwrap();
        assert_eq!(outcome.allocated() + outcome.unallocated, 800_000);
        assert_eq!(outcome.unallocated, 0);
        assert!(outcome.allocations.iter().all(|a| a.amount <= 40_000));
        assert_eq!(outcome.allocations[0].amount, 40_000);
    }

    #[test]
    fn test_engine_whale_at_greatest_address() {
        // whale sorts last; base leftovers and spread leftovers both go to
        // the lowest addresses
        let mut items: Vec<AllocationItem> = (1..=40).map(|n| AllocationItem::new(addr(n), 1_000)).collect();
        items.push(AllocationItem::new(addr(0xff), 1_000_000));
        let engine = AllocationEngine::new(800_000, SoftCapPolicy::new(40_000));
        let outcome = engine.run(&items).unwrap();

        assert_eq!(outcome.unallocated, 0);
        assert_eq!(outcome.cap_rounds, 1);
        assert_eq!(outcome.allocated(), 800_000);
        let out = amounts(&outcome.allocations);
        assert_eq!(out.len(), 41);
        assert_eq!(out[40], (0xff, 40_000));
        assert!(out[..9].iter().all(|(_, a)| *a == 19_001));
        assert!(out[9..31].iter().all(|(_, a)| *a == 19_000));
        assert!(out[31..40].iter().all(|(_, a)| *a == 18_999));
    }

    proptest! {
        #[test]
        fn prop_engine_conserves_pool_under_cap(
            pool in 1u64..2_000_000,
            cap_divisor in 1u64..50,
            weights in proptest::collection::vec(1u128..1_000_000_000u128, 1..60),
        ) {
            let cap = (pool / cap_divisor).max(1);
            let items: Vec<AllocationItem> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| AllocationItem::new(addr(i as u8), *w))
                .collect();
            let outcome = AllocationEngine::new(pool, SoftCapPolicy::new(cap)).run(&items).unwrap();

            prop_assert_eq!(outcome.allocated() + outcome.unallocated, pool);
            prop_assert!(outcome.allocations.iter().all(|a| a.amount <= cap));
            if outcome.unallocated > 0 {
                prop_assert_eq!(outcome.allocations.len(), items.len());
                prop_assert!(outcome.allocations.iter().all(|a| a.amount == cap));
            }
        }

        #[test]
        fn prop_sum_equals_pool(
            pool in 1u64..10_000_000,
            weights in proptest::collection::vec(1u128..1_000_000_000_000u128, 1..60),
        ) {
            let items: Vec<AllocationItem> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| AllocationItem::new(addr(i as u8), *w))
                .collect();
            let out = allocate_exact(pool, &items).unwrap();
            prop_assert_eq!(out.iter().map(|a| a.amount).sum::<u64>(), pool);
            prop_assert_eq!(out.len(), items.len());
        }

        #[test]
        fn prop_deterministic_and_order_independent(
            pool in 1u64..1_000_000,
            weights in proptest::collection::vec(1u128..10_000u128, 1..40),
        ) {
            let items: Vec<AllocationItem> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| AllocationItem::new(addr(i as u8), *w))
                .collect();
            let mut reversed = items.clone();
            reversed.reverse();
            let a = allocate_exact(pool, &items).unwrap();
            let b = allocate_exact(pool, &items).unwrap();
            let c = allocate_exact(pool, &reversed).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &c);
        }

        #[test]
        fn prop_within_one_of_exact_share(
            pool in 1u64..1_000_000,
            weights in proptest::collection::vec(1u128..10_000u128, 1..40),
        ) {
            let items: Vec<AllocationItem> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| AllocationItem::new(addr(i as u8), *w))
                .collect();
            let total: u128 = weights.iter().sum();
            let out = allocate_exact(pool, &items).unwrap();
            for (alloc, item) in out.iter().zip(items.iter()) {
                let floor = (u128::from(pool) * item.weight / total) as u64;
                prop_assert!(alloc.amount == floor || alloc.amount == floor + 1);
            }
        }
    }
}

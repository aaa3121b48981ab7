//! # Soft Cap Redistribution
//!
//! Clips any allocation above the per-address cap and spreads the clipped
//! excess across the addresses still strictly under the cap with uniform
//! weight 1 (not re-weighted by balance). Spreading can push a small holder
//! over the cap, so clip/spread repeats; each extra round caps at least one
//! more address, so at most `n` rounds run.
//!
//! When every address sits at the cap the remaining overflow has no
//! destination. It is dropped and reported as `unallocated`.

use crate::allocation::{allocate_exact, Allocation, AllocationError, AllocationItem};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Per-address cap policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftCapPolicy {
    pub cap: u64,
}

/// Allocations after cap enforcement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CappedAllocation {
    pub allocations: Vec<Allocation>,
    pub unallocated: u64,
    pub rounds: u32,
}

impl SoftCapPolicy {
    pub fn new(cap: u64) -> Self {
        Self { cap }
    }

    pub fn apply(&self, mut allocations: Vec<Allocation>) -> Result<CappedAllocation, AllocationError> {
        let mut rounds = 0u32;
        allocations.sort_by(|a, b| a.address.cmp(&b.address));

        loop {
            let mut overflow: u64 = 0;
            for alloc in allocations.iter_mut() {
                if alloc.amount > self.cap {
                    overflow += alloc.amount - self.cap;
                    alloc.amount = self.cap;
                }
            }
            if overflow == 0 {
                return Ok(CappedAllocation {
                    allocations,
                    unallocated: 0,
                    rounds,
                });
            }

            let under_cap: Vec<AllocationItem> = allocations
                .iter()
                .filter(|a| a.amount < self.cap)
                .map(|a| AllocationItem::new(a.address, 1))
                .collect();

            if under_cap.is_empty() {
                warn!(
                    "soft cap saturated: {} addresses at cap {}, dropping overflow {}",
                    allocations.len(),
                    self.cap,
                    overflow
                );
                return Ok(CappedAllocation {
                    allocations,
                    unallocated: overflow,
                    rounds,
                });
            }

            rounds += 1;
            debug!(
                "soft cap round {}: spreading {} across {} addresses",
                rounds,
                overflow,
                under_cap.len()
            );

            let extra = allocate_exact(overflow, &under_cap)?;
            // both lists are address-ordered
            let mut extra_iter = extra.into_iter().peekable();
            for alloc in allocations.iter_mut() {
                if let Some(e) = extra_iter.peek() {
                    if e.address == alloc.address {
                        alloc.amount += e.amount;
                        extra_iter.next();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcab_core::Address;
    use proptest::prelude::*;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    fn alloc(n: u8, amount: u64) -> Allocation {
        Allocation {
            address: addr(n),
            amount,
        }
    }

    #[test]
    fn test_no_overflow_untouched() {
        let input = vec![alloc(1, 10), alloc(2, 20)];
        let out = SoftCapPolicy::new(20).apply(input.clone()).unwrap();
        assert_eq!(out.allocations, input);
        assert_eq!(out.rounds, 0);
        assert_eq!(out.unallocated, 0);
    }

    #[test]
    fn test_overflow_spread_uniformly() {
        // 50 over the cap goes to the two under-cap addresses, 25 each
        let input = vec![alloc(1, 150), alloc(2, 10), alloc(3, 40)];
        let out = SoftCapPolicy::new(100).apply(input).unwrap();
        assert_eq!(out.allocations, vec![alloc(1, 100), alloc(2, 35), alloc(3, 65)]);
        assert_eq!(out.rounds, 1);
    }

    #[test]
    fn test_spread_that_overshoots_is_recapped() {
        // the 30 spread pushes address 2 to 114; its 14 excess then goes to 3
        let input = vec![alloc(1, 130), alloc(2, 99), alloc(3, 0)];
        let out = SoftCapPolicy::new(100).apply(input).unwrap();
        assert_eq!(out.allocations, vec![alloc(1, 100), alloc(2, 100), alloc(3, 29)]);
        assert_eq!(out.rounds, 2);
        assert_eq!(out.unallocated, 0);
    }

    #[test]
    fn test_saturated_overflow_dropped() {
        let input = vec![alloc(1, 300), alloc(2, 100)];
        let out = SoftCapPolicy::new(100).apply(input).unwrap();
        assert_eq!(out.allocations, vec![alloc(1, 100), alloc(2, 100)]);
        assert_eq!(out.unallocated, 200);
    }

    proptest! {
        #[test]
        fn prop_cap_respected_and_sum_preserved(
            cap in 1u64..5_000,
            amounts in proptest::collection::vec(0u64..20_000, 1..50),
        ) {
            let input: Vec<Allocation> = amounts
                .iter()
                .enumerate()
                .map(|(i, a)| alloc(i as u8, *a))
                .collect();
            let before: u64 = amounts.iter().sum();
            let out = SoftCapPolicy::new(cap).apply(input).unwrap();
            let after: u64 = out.allocations.iter().map(|a| a.amount).sum();
            prop_assert_eq!(after + out.unallocated, before);
            prop_assert!(out.allocations.iter().all(|a| a.amount <= cap));
            if out.unallocated > 0 {
                prop_assert!(out.allocations.iter().all(|a| a.amount == cap));
            }
        }
    }
}

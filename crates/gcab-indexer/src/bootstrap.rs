//! Explorer bootstrap
//!
//! Seeds the holder cache with absolute balances from a paginated holder
//! list. Used once on a fresh database, or to repair drift; the scan cursor is
//! not touched.

use crate::error::{IndexerError, Result};
use crate::HolderIndexer;
use gcab_core::units::parse_amount;
use gcab_core::{Address, Clock};
use gcab_storage::HolderSnapshot;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStats {
    /// Rows returned by the explorer
    pub fetched: u64,
    /// Distinct valid addresses
    pub unique: u64,
    pub stored: u64,
    /// Stored rows not known to be contracts
    pub eoas: u64,
    pub elapsed_ms: u64,
}

impl HolderIndexer {
    pub async fn bootstrap_from_explorer(&self) -> Result<BootstrapStats> {
        let started = Instant::now();
        let source = self
            .holder_list
            .clone()
            .ok_or(IndexerError::HolderListUnavailable)?;
        let decimals = self.token_decimals().await?;
        let page_size = self.config.page_size.max(1);

        let mut stats = BootstrapStats::default();
        let mut balances: BTreeMap<Address, BigUint> = BTreeMap::new();

        for page in 1..=self.config.max_pages {
            let rows = source.holder_page(&self.config.token, page, page_size).await?;
            stats.fetched += rows.len() as u64;
            if rows.is_empty() {
                break;
            }

            let last_page = rows.len() < page_size as usize;
            for row in rows {
                let address: Address = match row.address.to_ascii_lowercase().parse() {
                    Ok(address) => address,
                    Err(_) => {
                        tracing::debug!("Skipping invalid holder address {:?}", row.address);
                        continue;
                    }
                };
                match parse_amount(&row.quantity) {
                    Ok(raw) => {
                        balances.insert(address, raw);
                    }
                    Err(_) => {
                        tracing::debug!("Skipping {} with quantity {:?}", address, row.quantity);
                    }
                }
            }

            if last_page {
                break;
            }
            if !self.config.page_pause.is_zero() {
                tokio::time::sleep(self.config.page_pause).await;
            }
        }
        stats.unique = balances.len() as u64;

        let addresses: Vec<Address> = balances.keys().copied().collect();
        let mut flags = BTreeMap::new();
        for (address, result) in self.check_codes(addresses).await {
            match result {
                Ok(is_contract) => {
                    flags.insert(address, is_contract);
                }
                Err(e) => {
                    tracing::warn!("Code lookup for {} failed, retry on next pass: {}", address, e);
                }
            }
        }

        let snapshots: Vec<HolderSnapshot> = balances
            .into_iter()
            .map(|(address, raw_balance)| HolderSnapshot {
                address,
                raw_balance,
                is_contract: flags.get(&address).copied(),
            })
            .collect();
        stats.eoas = snapshots
            .iter()
            .filter(|s| s.is_contract != Some(true))
            .count() as u64;
        stats.stored = self
            .store
            .upsert_snapshots(&snapshots, decimals, self.clock.now())
            .await? as u64;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Bootstrap: {} rows, {} unique, {} stored, {} EOAs",
            stats.fetched,
            stats.unique,
            stats.stored,
            stats.eoas
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{addr, FakeChain, FakeHolderList};
    use crate::IndexerConfig;
    use chrono::{TimeZone, Utc};
    use gcab_bridge::HolderEntry;
    use gcab_core::ManualClock;
    use gcab_storage::Store;
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(address: &str, quantity: &str) -> HolderEntry {
        HolderEntry {
            address: address.to_string(),
            quantity: quantity.to_string(),
        }
    }

    fn config() -> IndexerConfig {
        IndexerConfig {
            page_size: 2,
            max_pages: 5,
            page_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn indexer(chain: FakeChain, list: Arc<FakeHolderList>) -> HolderIndexer {
        let store = Store::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        ));
        HolderIndexer::new(store, Arc::new(chain), clock, config()).with_holder_list(list)
    }

    #[tokio::test]
    async fn test_bootstrap_pages_and_dedupes() {
        let one = addr(1).to_hex();
        let two = addr(2).to_hex();
        let mut list = FakeHolderList::default();
        list.pages.insert(1, vec![entry(&one, "100"), entry("not-an-address", "5")]);
        list.pages.insert(2, vec![entry(&two, "250"), entry(&one, "120")]);
        list.pages.insert(3, vec![entry(&addr(3).to_hex(), "7")]);
        let list = Arc::new(list);

        let mut chain = FakeChain::new(0);
        chain.contracts.insert(addr(2));
        let indexer = indexer(chain, list.clone()).await;

        let stats = indexer.bootstrap_from_explorer().await.unwrap();
        assert_eq!(stats.fetched, 5);
        assert_eq!(stats.unique, 3);
        assert_eq!(stats.stored, 3);
        assert_eq!(stats.eoas, 2);
        // page 3 was short, so paging stopped there
        assert_eq!(*list.requested.lock(), vec![1, 2, 3]);

        let one = indexer.store().holder(&addr(1)).await.unwrap().unwrap();
        assert_eq!(one.raw_balance, BigUint::from(120u32));
        assert!(indexer.store().holder(&addr(2)).await.unwrap().unwrap().is_contract);
        assert_eq!(indexer.store().scan_cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bootstrap_stops_on_empty_page() {
        let mut list = FakeHolderList::default();
        list.pages.insert(1, vec![entry(&addr(1).to_hex(), "1"), entry(&addr(2).to_hex(), "2")]);
        let list = Arc::new(list);
        let indexer = indexer(FakeChain::new(0), list.clone()).await;

        let stats = indexer.bootstrap_from_explorer().await.unwrap();
        assert_eq!(stats.stored, 2);
        assert_eq!(*list.requested.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_bootstrap_without_source() {
        let store = Store::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let indexer =
            HolderIndexer::new(store, Arc::new(FakeChain::new(0)), clock, IndexerConfig::default());
        let err = indexer.bootstrap_from_explorer().await.unwrap_err();
        assert!(matches!(err, IndexerError::HolderListUnavailable));
    }
}

//! Contract classification

use crate::error::Result;
use crate::HolderIndexer;
use futures::stream::{FuturesUnordered, StreamExt};
use gcab_bridge::ChainError;
use gcab_core::{Address, Clock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyStats {
    /// Addresses sampled
    pub checked: u64,
    pub marked_contracts: u64,
    /// Lookups that failed; those rows are left as they were
    pub failed: u64,
}

impl HolderIndexer {
    /// `eth_getCode` for each address, at most `fan_out` in flight.
    /// Results arrive in completion order.
    pub(crate) async fn check_codes(
        &self,
        addresses: Vec<Address>,
    ) -> Vec<(Address, std::result::Result<bool, ChainError>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.fan_out.max(1)));
        let mut tasks = FuturesUnordered::new();

        for address in addresses {
            let chain = self.chain.clone();
            let semaphore = semaphore.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = chain.has_code(&address).await;
                (address, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.next().await {
            results.push(result);
        }
        results
    }

    /// Re-check up to `limit` of the stalest non-contract holders
    pub async fn classify_contracts(&self, limit: u32) -> Result<ClassifyStats> {
        let candidates = self.store.classification_candidates(limit).await?;
        let mut stats = ClassifyStats {
            checked: candidates.len() as u64,
            ..Default::default()
        };

        for (address, result) in self.check_codes(candidates).await {
            match result {
                Ok(is_contract) => {
                    self.store
                        .record_classification(&address, is_contract, self.clock.now())
                        .await?;
                    if is_contract {
                        stats.marked_contracts += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Code lookup for {} failed: {}", address, e);
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            "Classified {} holders: {} contracts, {} failed",
            stats.checked,
            stats.marked_contracts,
            stats.failed
        );
        Ok(stats)
    }
}

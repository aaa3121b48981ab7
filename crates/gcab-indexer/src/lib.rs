//! # GCAb Holder Indexer
//!
//! Keeps the holder cache in step with the chain.
//!
//! ```text
//!   cursor ──► [window 1] ──► [window 2] ──► ... ──► latest
//!                 │              │
//!                 ▼              ▼
//!           deltas + cursor  deltas + cursor     (one transaction each)
//! ```
//!
//! - [`HolderIndexer::run_incremental_scan`] folds `Transfer` logs into signed
//!   per-address deltas window by window.
//! - [`HolderIndexer::classify_contracts`] re-checks the stalest holders for
//!   deployed code with bounded fan-out.
//! - [`HolderIndexer::bootstrap_from_explorer`] seeds absolute balances from a
//!   paginated holder list.

pub mod bootstrap;
pub mod classify;
pub mod error;
pub mod scan;

pub use bootstrap::BootstrapStats;
pub use classify::ClassifyStats;
pub use error::{IndexerError, Result};
pub use scan::{accumulate_deltas, ScanStats};

use gcab_bridge::{ChainSource, HolderListSource};
use gcab_core::{Address, Clock};
use gcab_storage::Store;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Indexer tuning
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Token contract
    pub token: Address,
    /// First block scanned when no cursor exists
    pub deploy_block: u64,
    /// Blocks per `eth_getLogs` window
    pub chunk: u64,
    /// Upper bound on blocks scanned in one run
    pub max_blocks_per_run: u64,
    /// Concurrent code lookups
    pub fan_out: usize,
    pub page_size: u32,
    pub max_pages: u32,
    pub page_pause: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            token: Address::ZERO,
            deploy_block: 0,
            chunk: 5_000,
            max_blocks_per_run: 200_000,
            fan_out: 8,
            page_size: 200,
            max_pages: 5,
            page_pause: Duration::from_millis(250),
        }
    }
}

pub struct HolderIndexer {
    store: Store,
    chain: Arc<dyn ChainSource>,
    holder_list: Option<Arc<dyn HolderListSource>>,
    clock: Arc<dyn Clock>,
    config: IndexerConfig,
    decimals: RwLock<Option<u8>>,
}

impl HolderIndexer {
    pub fn new(
        store: Store,
        chain: Arc<dyn ChainSource>,
        clock: Arc<dyn Clock>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            store,
            chain,
            holder_list: None,
            clock,
            config,
            decimals: RwLock::new(None),
        }
    }

    pub fn with_holder_list(mut self, source: Arc<dyn HolderListSource>) -> Self {
        self.holder_list = Some(source);
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Token decimals, looked up on chain once and then served from memory
    pub async fn token_decimals(&self) -> Result<u8> {
        if let Some(decimals) = *self.decimals.read() {
            return Ok(decimals);
        }
        let decimals = self.chain.decimals(&self.config.token).await?;
        self.store.set_token_decimals(decimals).await?;
        *self.decimals.write() = Some(decimals);
        tracing::info!("Token {} uses {} decimals", self.config.token, decimals);
        Ok(decimals)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use gcab_bridge::{ChainError, ChainSource, HolderEntry, HolderListSource};
    use gcab_core::{Address, TransferEvent};
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    #[derive(Default)]
    pub struct FakeChain {
        pub latest: Mutex<u64>,
        pub events: Mutex<Vec<TransferEvent>>,
        /// `transfer_logs` fails for windows starting here
        pub fail_window_at: Mutex<Option<u64>>,
        pub decimals: Mutex<Option<u8>>,
        pub decimals_calls: AtomicUsize,
        pub contracts: HashSet<Address>,
        pub code_errors: HashSet<Address>,
        pub windows: Mutex<Vec<(u64, u64)>>,
    }

    impl FakeChain {
        pub fn new(latest: u64) -> Self {
            Self {
                latest: Mutex::new(latest),
                decimals: Mutex::new(Some(0)),
                ..Default::default()
            }
        }

        pub fn transfer(&self, block_number: u64, from: Address, to: Address, value: u64) {
            self.events.lock().push(TransferEvent {
                block_number,
                from,
                to,
                value: value.into(),
            });
        }
    }

    fn unavailable() -> ChainError {
        ChainError::Rpc {
            code: -32603,
            message: "upstream unavailable".into(),
        }
    }

    #[async_trait]
    impl ChainSource for FakeChain {
        async fn block_number(&self) -> Result<u64, ChainError> {
            Ok(*self.latest.lock())
        }

        async fn transfer_logs(
            &self,
            _token: &Address,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<TransferEvent>, ChainError> {
            if *self.fail_window_at.lock() == Some(from_block) {
                return Err(unavailable());
            }
            self.windows.lock().push((from_block, to_block));
            Ok(self
                .events
                .lock()
                .iter()
                .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
                .cloned()
                .collect())
        }

        async fn has_code(&self, address: &Address) -> Result<bool, ChainError> {
            if self.code_errors.contains(address) {
                return Err(unavailable());
            }
            Ok(self.contracts.contains(address))
        }

        async fn decimals(&self, _token: &Address) -> Result<u8, ChainError> {
            self.decimals_calls.fetch_add(1, Ordering::SeqCst);
            (*self.decimals.lock()).ok_or_else(unavailable)
        }
    }

    #[derive(Default)]
    pub struct FakeHolderList {
        pub pages: HashMap<u32, Vec<HolderEntry>>,
        pub requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl HolderListSource for FakeHolderList {
        async fn holder_page(
            &self,
            _token: &Address,
            page: u32,
            _size: u32,
        ) -> Result<Vec<HolderEntry>, ChainError> {
            self.requested.lock().push(page);
            Ok(self.pages.get(&page).cloned().unwrap_or_default())
        }
    }
}

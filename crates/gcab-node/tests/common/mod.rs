#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gcab_bridge::{ChainError, ChainSource};
use gcab_core::units::to_raw;
use gcab_core::{Address, ManualClock, TransferEvent};
use gcab_node::{NodeConfig, NodeMetrics, Services};
use gcab_storage::Store;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub const DECIMALS: u8 = 18;

pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xab;
    bytes[19] = n;
    Address::new(bytes)
}

pub fn token() -> Address {
    addr(0xee)
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 9, 30, 0).unwrap()
}

/// In-memory chain with a fixed head and a list of transfers
#[derive(Default)]
pub struct FakeChain {
    pub latest: Mutex<u64>,
    pub events: Mutex<Vec<TransferEvent>>,
    pub contracts: Mutex<HashSet<Address>>,
}

impl FakeChain {
    pub fn new(latest: u64) -> Self {
        Self {
            latest: Mutex::new(latest),
            ..Default::default()
        }
    }

    /// Transfer of `whole` tokens
    pub fn transfer(&self, block_number: u64, from: Address, to: Address, whole: u64) {
        self.events.lock().push(TransferEvent {
            block_number,
            from,
            to,
            value: to_raw(whole, DECIMALS),
        });
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
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn has_code(&self, address: &Address) -> Result<bool, ChainError> {
        Ok(self.contracts.lock().contains(address))
    }

    async fn decimals(&self, _token: &Address) -> Result<u8, ChainError> {
        Ok(DECIMALS)
    }
}

pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.token.address = token().to_hex();
    config.token.deploy_block = 100;
    config.indexer.chunk = 50;
    config.storage.path = ":memory:".into();
    config
}

pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub clock: Arc<ManualClock>,
    pub services: Services,
    pub metrics: NodeMetrics,
}

pub async fn harness(config: &NodeConfig, chain: FakeChain) -> Harness {
    let chain = Arc::new(chain);
    let clock = Arc::new(ManualClock::new(start_time()));
    let metrics = NodeMetrics::new().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let services = Services::assemble(
        config,
        store,
        chain.clone(),
        None,
        clock.clone(),
        Some(metrics.clone()),
    )
    .unwrap();
    Harness {
        chain,
        clock,
        services,
        metrics,
    }
}

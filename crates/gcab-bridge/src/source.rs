//! Data source traits consumed by the indexer

use crate::error::ChainError;
use async_trait::async_trait;
use gcab_core::{Address, TransferEvent};

/// Read access to an EVM chain
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Latest block height
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `Transfer` events emitted by `token` in `[from_block, to_block]`
    async fn transfer_logs(
        &self,
        token: &Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, ChainError>;

    /// Whether the account has deployed code
    async fn has_code(&self, address: &Address) -> Result<bool, ChainError>;

    /// ERC-20 `decimals()`
    async fn decimals(&self, token: &Address) -> Result<u8, ChainError>;
}

/// One row of an explorer holder list, unvalidated
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderEntry {
    pub address: String,
    /// Raw balance as reported (decimal string)
    pub quantity: String,
}

/// Paginated token holder list (1-based pages)
#[async_trait]
pub trait HolderListSource: Send + Sync {
    async fn holder_page(
        &self,
        token: &Address,
        page: u32,
        size: u32,
    ) -> Result<Vec<HolderEntry>, ChainError>;
}

//! # GCAb Bridge
//!
//! External data access for the holder index:
//!
//! - [`ChainSource`] - block height, token `Transfer` logs, code presence and
//!   `decimals()` from an EVM chain. [`JsonRpcClient`] implements it over HTTP.
//! - [`HolderListSource`] - a paginated token holder list.
//!   [`ExplorerClient`] implements it against an Etherscan-style API.
//!
//! Every outbound request carries the client's timeout. Nothing retries here;
//! callers decide what a failure aborts.

pub mod error;
pub mod explorer;
pub mod rpc;
pub mod source;

pub use error::ChainError;
pub use explorer::ExplorerClient;
pub use rpc::{JsonRpcClient, TRANSFER_TOPIC};
pub use source::{ChainSource, HolderEntry, HolderListSource};

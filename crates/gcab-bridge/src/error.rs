//! Chain access errors

use gcab_core::GcabError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Explorer API key not configured")]
    MissingApiKey,

    #[error(transparent)]
    Core(#[from] GcabError),
}

impl ChainError {
    /// Network-level failures that may clear up on a later pass
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Rpc { code, .. } => *code == -32005 || *code == -32603,
            _ => false,
        }
    }
}

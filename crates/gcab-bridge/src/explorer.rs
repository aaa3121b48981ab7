//! Etherscan-style `tokenholderlist` client

use crate::error::ChainError;
use crate::source::{HolderEntry, HolderListSource};
use async_trait::async_trait;
use gcab_core::Address;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct HolderRow {
    #[serde(rename = "TokenHolderAddress", default)]
    address: String,
    #[serde(rename = "TokenHolderQuantity", default)]
    quantity: Value,
}

fn quantity_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => "0".to_string(),
    }
}

fn decode_page(body: Value) -> Result<Vec<HolderEntry>, ChainError> {
    let response: ExplorerResponse =
        serde_json::from_value(body).map_err(|e| ChainError::Decode(e.to_string()))?;
    if response.status != "1" {
        let detail: String = response.result.to_string().chars().take(200).collect();
        return Err(ChainError::Explorer(format!(
            "{} :: {}",
            if response.message.is_empty() { "unknown" } else { response.message.as_str() },
            detail
        )));
    }
    let rows: Vec<HolderRow> = match response.result {
        Value::Null => Vec::new(),
        other => serde_json::from_value(other).map_err(|e| ChainError::Decode(e.to_string()))?,
    };
    Ok(rows
        .into_iter()
        .map(|row| HolderEntry {
            address: row.address,
            quantity: quantity_string(row.quantity),
        })
        .collect())
}

pub struct ExplorerClient {
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ExplorerClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl HolderListSource for ExplorerClient {
    async fn holder_page(
        &self,
        token: &Address,
        page: u32,
        size: u32,
    ) -> Result<Vec<HolderEntry>, ChainError> {
        let api_key = self.api_key.as_deref().ok_or(ChainError::MissingApiKey)?;
        let token = token.to_hex();
        let page = page.to_string();
        let size = size.to_string();

        let body: Value = self
            .client
            .get(&self.api_url)
            .query(&[
                ("module", "token"),
                ("action", "tokenholderlist"),
                ("contractaddress", token.as_str()),
                ("page", page.as_str()),
                ("offset", size.as_str()),
                ("apikey", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_page(body)
    }
}

//! EIP-1193 wallet access.
//!
//! The wallet is always an explicit [`WalletProvider`] handed in by the caller.
//! [`HttpWalletProvider`] forwards requests to a wallet bridge that speaks plain
//! JSON-RPC 2.0 over HTTP.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ProviderRpcError, TxError};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// EIP-1193 `request({ method, params })`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TxError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProviderRpcError>,
}

/// Wallet reached through an HTTP JSON-RPC bridge.
#[derive(Debug)]
pub struct HttpWalletProvider {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpWalletProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, TxError> {
        Self::with_timeout(url, Duration::from_secs(120))
    }

    /// Wallet prompts wait on a human, so the timeout should be generous.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, TxError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TxError::Rpc(format!("failed to build wallet bridge client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TxError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, url = %self.url, "Wallet request");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TxError::Rpc(format!("wallet bridge request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TxError::Rpc(format!("failed to read wallet bridge response: {e}")))?;

        if !status.is_success() {
            warn!(method, status = status.as_u16(), "Wallet bridge returned an error status");
            return Err(TxError::Http {
                status: status.as_u16(),
                data: body,
            });
        }

        let response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| TxError::Rpc(format!("invalid wallet bridge response: {e}")))?;
        if let Some(error) = response.error {
            return Err(TxError::Provider(error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

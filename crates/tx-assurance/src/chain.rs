//! # Chain Switch Negotiation
//!
//! Brings the wallet onto the chain an action needs:
//!
//! ```text
//! NotRequested -> SwitchRequested -> Switched
//!                       |
//!                       +-- 4902 (unknown chain), add allowed --> AddRequested -> SwitchRequested
//!                       |                                                  (add no longer allowed)
//!                       +-- any other error ----------------------------> Failed
//! ```
//!
//! Registration happens at most once per negotiation, so a wallet that keeps
//! answering 4902 ends in `Failed` after the single retried switch.

use chain_registry::{ChainDescriptor, TokenMeta};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::TxError;
use crate::wallet::WalletProvider;

pub const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";
pub const ADD_CHAIN_METHOD: &str = "wallet_addEthereumChain";
pub const WATCH_ASSET_METHOD: &str = "wallet_watchAsset";

/// Native currency block of `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddChainCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Params object of `wallet_addEthereumChain` (EIP-3085).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: AddChainCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icon_urls: Vec<String>,
}

impl From<&ChainDescriptor> for AddChainParams {
    fn from(chain: &ChainDescriptor) -> Self {
        Self {
            chain_id: chain.hex_chain_id(),
            chain_name: chain.name.clone(),
            native_currency: AddChainCurrency {
                name: chain.native_currency.name.clone(),
                symbol: chain.native_currency.symbol.clone(),
                decimals: chain.native_currency.decimals,
            },
            rpc_urls: vec![chain.rpc_url.clone()],
            block_explorer_urls: vec![chain.block_explorer_url.clone()],
            icon_urls: chain.icon_url.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchOptions {
    /// Never register an unknown chain; fail instead.
    pub prevent_add_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    NotRequested,
    SwitchRequested,
    AddRequested,
    Switched,
    Failed,
}

/// One negotiation against one wallet for one target chain.
pub struct ChainSwitcher<'a> {
    chain: &'a ChainDescriptor,
    state: SwitchState,
    add_allowed: bool,
    history: Vec<SwitchState>,
}

impl<'a> ChainSwitcher<'a> {
    pub fn new(chain: &'a ChainDescriptor, options: SwitchOptions) -> Self {
        Self {
            chain,
            state: SwitchState::NotRequested,
            add_allowed: !options.prevent_add_network,
            history: vec![SwitchState::NotRequested],
        }
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    /// Every state visited so far, starting with `NotRequested`.
    pub fn history(&self) -> &[SwitchState] {
        &self.history
    }

    fn transition(&mut self, next: SwitchState) {
        debug!(chain_id = self.chain.chain_id, from = ?self.state, to = ?next, "Chain switch transition");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: TxError) -> Result<bool, TxError> {
        self.transition(SwitchState::Failed);
        warn!(chain_id = self.chain.chain_id, error = %err, "Chain switch failed");
        Err(err)
    }

    /// Drive the negotiation to `Switched` or `Failed`.
    pub async fn run(&mut self, wallet: &dyn WalletProvider) -> Result<bool, TxError> {
        loop {
            match self.state {
                SwitchState::NotRequested => self.transition(SwitchState::SwitchRequested),
                SwitchState::SwitchRequested => {
                    let params = json!([{ "chainId": self.chain.hex_chain_id() }]);
                    match wallet.request(SWITCH_CHAIN_METHOD, params).await {
                        Ok(_) => self.transition(SwitchState::Switched),
                        Err(e) if e.is_unrecognized_chain() && self.add_allowed => {
                            info!(
                                chain_id = self.chain.chain_id,
                                chain = %self.chain.name,
                                "Wallet does not know the chain, registering it"
                            );
                            self.add_allowed = false;
                            self.transition(SwitchState::AddRequested);
                        }
                        Err(e) => return self.fail(e),
                    }
                }
                SwitchState::AddRequested => {
                    let params = json!([AddChainParams::from(self.chain)]);
                    match wallet.request(ADD_CHAIN_METHOD, params).await {
                        Ok(_) => self.transition(SwitchState::SwitchRequested),
                        Err(e) => return self.fail(e),
                    }
                }
                SwitchState::Switched => {
                    info!(chain_id = self.chain.chain_id, "Wallet switched chain");
                    return Ok(true);
                }
                SwitchState::Failed => {
                    return Err(TxError::Generic(format!(
                        "chain switch to {} already failed",
                        self.chain.chain_id
                    )));
                }
            }
        }
    }
}

/// Ask the wallet to move to `chain`, registering it first if the wallet has
/// never seen it (unless `prevent_add_network`).
///
/// Returns `false` without any request when no wallet is available.
pub async fn switch_chain(
    wallet: Option<&dyn WalletProvider>,
    chain: &ChainDescriptor,
    options: SwitchOptions,
) -> Result<bool, TxError> {
    let Some(wallet) = wallet else {
        warn!(chain_id = chain.chain_id, "No wallet provider, cannot switch chain");
        return Ok(false);
    };
    ChainSwitcher::new(chain, options).run(wallet).await
}

/// Chain the wallet is currently on (`eth_chainId`).
pub async fn current_chain_id(wallet: &dyn WalletProvider) -> Result<u64, TxError> {
    let value = wallet.request("eth_chainId", json!([])).await?;
    parse_chain_id(&value)
}

fn parse_chain_id(value: &Value) -> Result<u64, TxError> {
    match value {
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|e| TxError::Generic(format!("invalid chain id '{s}': {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| TxError::Generic(format!("invalid chain id {n}"))),
        other => Err(TxError::Generic(format!("invalid chain id {other}"))),
    }
}

/// Switch only when the wallet is on a different chain than `chain`.
pub async fn ensure_chain(
    wallet: Option<&dyn WalletProvider>,
    chain: &ChainDescriptor,
    options: SwitchOptions,
) -> Result<bool, TxError> {
    let Some(provider) = wallet else {
        return Ok(false);
    };
    let current = current_chain_id(provider).await?;
    if current == chain.chain_id {
        debug!(chain_id = current, "Wallet already on required chain");
        return Ok(true);
    }
    info!(current, required = chain.chain_id, "Wallet on wrong chain");
    switch_chain(wallet, chain, options).await
}

/// Suggest an ERC-20 token to the wallet (`wallet_watchAsset`).
pub async fn watch_asset(
    wallet: &dyn WalletProvider,
    token: &TokenMeta,
    image: Option<&str>,
) -> Result<bool, TxError> {
    if token.is_native {
        return Err(TxError::Generic(format!(
            "{} is a native asset and cannot be watched",
            token.symbol
        )));
    }

    let mut options = json!({
        "address": token.address,
        "symbol": token.symbol,
        "decimals": token.decimals,
    });
    if let Some(image) = image {
        options["image"] = json!(image);
    }

    let result = wallet
        .request(WATCH_ASSET_METHOD, json!({ "type": "ERC20", "options": options }))
        .await?;
    Ok(result.as_bool().unwrap_or(false))
}

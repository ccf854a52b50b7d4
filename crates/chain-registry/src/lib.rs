use alloy::primitives::Address;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::{fs, path::Path};
use tracing::debug;

/// Largest decimal precision whose power of ten still fits in a uint256.
pub const MAX_TOKEN_DECIMALS: u8 = 77;

// ============================================================================
// Chain Descriptors
// ============================================================================

/// Native currency metadata as wallets expect it in `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to register an EVM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_url: String,
    pub block_explorer_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl ChainDescriptor {
    /// Chain id in the `0x`-prefixed lowercase hex form wallet requests use.
    pub fn hex_chain_id(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

// ============================================================================
// Token Metadata
// ============================================================================

/// A fungible asset on a single chain.
///
/// Native assets carry the zero address as a sentinel and `is_native = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub is_native: bool,
    pub chain_id: u64,
}

impl TokenMeta {
    /// Build the native-asset descriptor of a chain.
    pub fn native(chain: &ChainDescriptor) -> Self {
        Self {
            symbol: chain.native_currency.symbol.clone(),
            decimals: chain.native_currency.decimals,
            address: Address::ZERO,
            is_native: true,
            chain_id: chain.chain_id,
        }
    }

    /// Build an ERC-20 descriptor.
    pub fn erc20(symbol: impl Into<String>, decimals: u8, address: Address, chain_id: u64) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            address,
            is_native: false,
            chain_id,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Static chain/token registry keyed by short names (e.g. `"bsc"`, `"ape"`).
///
/// ```toml
/// [chains.bsc]
/// chain_id = 56
/// name = "BNB Smart Chain"
/// rpc_url = "https://bsc-dataseed.binance.org"
/// block_explorer_url = "https://bscscan.com"
///
/// [chains.bsc.native_currency]
/// name = "BNB"
/// symbol = "BNB"
/// decimals = 18
///
/// [tokens.usdt]
/// symbol = "USDT"
/// decimals = 18
/// address = "0x55d398326f99059fF775485246999027B3197955"
/// chain_id = 56
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub chains: BTreeMap<String, ChainDescriptor>,
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenMeta>,
}

impl Registry {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let registry: Registry = toml::from_str(s).context("Failed to parse registry TOML")?;
        registry.validate()?;
        debug!(
            chains = registry.chains.len(),
            tokens = registry.tokens.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    pub fn chain(&self, key: &str) -> Option<&ChainDescriptor> {
        self.chains.get(key)
    }

    pub fn chain_by_id(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    pub fn token(&self, key: &str) -> Option<&TokenMeta> {
        self.tokens.get(key)
    }

    /// Native asset of a configured chain. Explicit token entries win over the
    /// chain's `native_currency` block.
    pub fn native_token(&self, chain_id: u64) -> Option<TokenMeta> {
        self.tokens
            .values()
            .find(|t| t.is_native && t.chain_id == chain_id)
            .cloned()
            .or_else(|| self.chain_by_id(chain_id).map(TokenMeta::native))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (key, chain) in &self.chains {
            if !seen.insert(chain.chain_id) {
                bail!("chain '{key}' reuses chain id {}", chain.chain_id);
            }
            if chain.native_currency.decimals > MAX_TOKEN_DECIMALS {
                bail!(
                    "chain '{key}' native currency has {} decimals (max {MAX_TOKEN_DECIMALS})",
                    chain.native_currency.decimals
                );
            }
        }

        for (key, token) in &self.tokens {
            if token.decimals > MAX_TOKEN_DECIMALS {
                bail!(
                    "token '{key}' has {} decimals (max {MAX_TOKEN_DECIMALS})",
                    token.decimals
                );
            }
            if token.is_native && token.address != Address::ZERO {
                bail!("native token '{key}' must use the zero address");
            }
            if !token.is_native && token.address == Address::ZERO {
                bail!("token '{key}' is missing its contract address");
            }
            if !seen.contains(&token.chain_id) {
                bail!(
                    "token '{key}' references unknown chain id {}",
                    token.chain_id
                );
            }
        }
        Ok(())
    }
}

pub fn load_registry_from_path<P: AsRef<Path>>(path: P) -> Result<Registry> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry file {}", path.display()))?;
    Registry::from_toml_str(&s)
}

// ============================================================================
// Tests
// ============================================================================

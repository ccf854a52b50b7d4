use alloy::primitives::Address;
use anyhow::{Context, Result};
use chain_registry::{ChainDescriptor, Registry, TokenMeta, load_registry_from_path};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for txguard
#[derive(Parser, Debug)]
#[command(name = "txguard")]
#[command(
    about = "Transaction preflight checks, approvals and wallet chain switching",
    long_about = None
)]
pub struct CliArgs {
    /// Chain and token registry (TOML)
    #[arg(long, env = "REGISTRY_PATH", default_value = "registry.toml")]
    pub registry: PathBuf,

    /// RPC endpoint; defaults to the registry's URL for the token's chain
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that an account holds at least `amount` of a token
    Balance {
        /// Token key in the registry
        #[arg(long, env = "TOKEN_KEY")]
        token: String,

        #[arg(long, env = "ACCOUNT_ADDRESS")]
        account: Address,

        /// Human-readable amount, e.g. "1.5"
        #[arg(long, env = "AMOUNT")]
        amount: String,
    },

    /// Make sure `spender` may pull `amount` of a token, approving if needed
    Approve {
        #[arg(long, env = "TOKEN_KEY")]
        token: String,

        #[arg(long, env = "SPENDER_ADDRESS")]
        spender: Address,

        #[arg(long, env = "AMOUNT")]
        amount: String,

        /// Approve exactly `amount` instead of an unlimited allowance
        #[arg(long, env = "APPROVE_EXACT")]
        exact: bool,

        /// Private key of the paying account
        #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
    },

    /// Ask the bridged wallet to switch to a chain, registering it if unknown
    SwitchChain {
        /// Chain key in the registry
        #[arg(long, env = "CHAIN_KEY")]
        chain: String,

        /// Fail instead of registering a chain the wallet does not know
        #[arg(long, env = "DISABLE_ADD_CHAIN")]
        no_add: bool,

        /// JSON-RPC endpoint of the wallet bridge
        #[arg(long, env = "WALLET_BRIDGE_URL")]
        wallet_url: String,
    },

    /// Suggest an ERC-20 token to the bridged wallet
    WatchAsset {
        #[arg(long, env = "TOKEN_KEY")]
        token: String,

        /// Token icon URL shown by the wallet
        #[arg(long, env = "TOKEN_IMAGE_URL")]
        image: Option<String>,

        #[arg(long, env = "WALLET_BRIDGE_URL")]
        wallet_url: String,
    },

    /// Print the `wallet_addEthereumChain` params for a chain
    AddChainPayload {
        #[arg(long, env = "CHAIN_KEY")]
        chain: String,
    },
}

/// Registry plus the resolved RPC override
#[derive(Debug)]
pub struct TxGuardConfig {
    pub registry: Registry,
    pub rpc_url: Option<String>,
}

impl TxGuardConfig {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let registry = load_registry_from_path(&args.registry)?;
        Ok(Self {
            registry,
            rpc_url: args.rpc_url.clone(),
        })
    }

    pub fn token(&self, key: &str) -> Result<&TokenMeta> {
        self.registry
            .token(key)
            .with_context(|| format!("Unknown token '{key}' in registry"))
    }

    pub fn chain(&self, key: &str) -> Result<&ChainDescriptor> {
        self.registry
            .chain(key)
            .with_context(|| format!("Unknown chain '{key}' in registry"))
    }

    /// RPC URL for the chain a token lives on.
    pub fn rpc_url_for(&self, token: &TokenMeta) -> Result<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        self.registry
            .chain_by_id(token.chain_id)
            .map(|chain| chain.rpc_url.clone())
            .with_context(|| format!("No chain {} for token {}", token.chain_id, token.symbol))
    }
}

//! Token bindings used by the preflight checks.
//!
//! The preflight logic only sees the [`BalanceReader`] and [`Erc20`] traits, so
//! pages can hand in the alloy-backed [`Erc20Contract`] / [`NativeBalance`] and
//! tests can hand in doubles.

use alloy::{
    network::Ethereum,
    primitives::{Address, B256, U256},
    providers::{PendingTransactionBuilder, Provider},
    sol,
};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;

use crate::error::TxError;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

pub type IERC20Instance<P> = IERC20::IERC20Instance<P>;

// ============================================================================
// Submitted transactions
// ============================================================================

/// What a mined transaction looked like, trimmed to what callers report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptSummary {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
}

/// A submitted, not yet confirmed transaction.
pub struct PendingTx {
    hash: B256,
    confirmation: BoxFuture<'static, Result<TxReceiptSummary, TxError>>,
}

impl PendingTx {
    pub fn new(
        hash: B256,
        confirmation: BoxFuture<'static, Result<TxReceiptSummary, TxError>>,
    ) -> Self {
        Self { hash, confirmation }
    }

    /// Wrap an alloy pending transaction. The receipt is only fetched when
    /// [`PendingTx::wait`] is awaited.
    pub fn from_alloy(pending: PendingTransactionBuilder<Ethereum>) -> Self {
        let hash = *pending.tx_hash();
        let confirmation = Box::pin(async move {
            let receipt = pending.get_receipt().await?;
            Ok(TxReceiptSummary {
                tx_hash: receipt.transaction_hash,
                success: receipt.status(),
                gas_used: receipt.gas_used,
                block_number: receipt.block_number,
            })
        });
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Wait for the transaction to be mined. A reverted receipt is an error.
    pub async fn wait(self) -> Result<TxReceiptSummary, TxError> {
        let receipt = self.confirmation.await?;
        if !receipt.success {
            return Err(TxError::Rpc(format!(
                "transaction reverted on-chain. Tx hash: {:?}",
                receipt.tx_hash
            )));
        }
        Ok(receipt)
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn balance_of(&self, owner: Address) -> Result<U256, TxError>;
}

#[async_trait]
pub trait Erc20: BalanceReader {
    fn address(&self) -> Address;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, TxError>;

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx, TxError>;
}

// ============================================================================
// Alloy implementations
// ============================================================================

/// ERC-20 contract bound to an alloy provider.
#[derive(Clone)]
pub struct Erc20Contract<P: Provider + Clone> {
    contract: IERC20Instance<P>,
}

impl<P: Provider + Clone> Erc20Contract<P> {
    pub fn new(address: Address, provider: P) -> Self {
        Self {
            contract: IERC20Instance::new(address, provider),
        }
    }

    pub async fn decimals(&self) -> Result<u8, TxError> {
        Ok(self.contract.decimals().call().await?)
    }

    pub async fn symbol(&self) -> Result<String, TxError> {
        Ok(self.contract.symbol().call().await?)
    }
}

#[async_trait]
impl<P> BalanceReader for Erc20Contract<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn balance_of(&self, owner: Address) -> Result<U256, TxError> {
        Ok(self.contract.balanceOf(owner).call().await?)
    }
}

#[async_trait]
impl<P> Erc20 for Erc20Contract<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, TxError> {
        Ok(self.contract.allowance(owner, spender).call().await?)
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx, TxError> {
        let pending = self.contract.approve(spender, amount).send().await?;
        Ok(PendingTx::from_alloy(pending))
    }
}

/// Native-asset balance via `eth_getBalance`.
#[derive(Clone)]
pub struct NativeBalance<P: Provider + Clone> {
    provider: P,
}

impl<P: Provider + Clone> NativeBalance<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> BalanceReader for NativeBalance<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn balance_of(&self, owner: Address) -> Result<U256, TxError> {
        Ok(self.provider.get_balance(owner).await?)
    }
}

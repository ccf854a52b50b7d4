//! # Preflight Checks
//!
//! Guards run before a value-moving transaction is built:
//! - [`check_balance`] fails when the account holds less than the required amount
//! - [`ensure_allowance`] additionally raises the spender's ERC-20 allowance,
//!   waiting for the approval to be mined
//!
//! Nothing is cached; every call re-reads the chain.
//!
//! Two concurrent [`ensure_allowance`] calls for the same (owner, spender) can both
//! see a short allowance and both approve. [`ApprovalLocks`] serializes them so the
//! second caller sees the raised allowance instead.

use alloy::primitives::{Address, B256, U256};
use chain_registry::TokenMeta;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TxError;
use crate::token::{BalanceReader, Erc20};
use crate::units::{Amount, format_amount};

/// How much allowance to request when the current one is short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalMode {
    /// `U256::MAX`, so later actions against the same spender skip approval.
    #[default]
    Unlimited,
    /// Exactly the amount this action needs.
    Exact,
}

impl ApprovalMode {
    pub fn minimal(minimal: bool) -> Self {
        if minimal {
            ApprovalMode::Exact
        } else {
            ApprovalMode::Unlimited
        }
    }

    fn approval_amount(self, required: U256) -> U256 {
        match self {
            ApprovalMode::Unlimited => U256::MAX,
            ApprovalMode::Exact => required,
        }
    }
}

/// Fail with [`TxError::InsufficientBalance`] when `balance < required`.
pub fn require_sufficient(balance: U256, required: U256, token: &TokenMeta) -> Result<(), TxError> {
    if balance < required {
        return Err(TxError::InsufficientBalance {
            symbol: token.symbol.clone(),
            required,
            available: balance,
        });
    }
    Ok(())
}

/// Check that `account` holds at least `amount` of `token`.
///
/// Returns the required amount in smallest units.
pub async fn check_balance<R: BalanceReader + ?Sized>(
    reader: &R,
    account: Address,
    amount: &Amount,
    token: &TokenMeta,
) -> Result<U256, TxError> {
    let required = amount.to_base_units(token.decimals)?;
    let balance = reader.balance_of(account).await?;

    debug!(
        %account,
        token = %token.symbol,
        balance = %format_amount(balance, token.decimals),
        required = %format_amount(required, token.decimals),
        "Balance preflight"
    );

    require_sufficient(balance, required, token)?;
    Ok(required)
}

/// Make sure `spender` may move `amount` of `owner`'s tokens.
///
/// Returns the approval transaction hash when one was submitted (and mined), or
/// `None` when the existing allowance already covered the amount. Native assets
/// have no allowance and are rejected; check them with [`check_balance`] over a
/// [`NativeBalance`](crate::token::NativeBalance) reader.
pub async fn ensure_allowance(
    erc20: Option<&dyn Erc20>,
    owner: Address,
    spender: Address,
    amount: &Amount,
    token: &TokenMeta,
    mode: ApprovalMode,
) -> Result<Option<B256>, TxError> {
    if token.is_native {
        return Err(TxError::Generic(format!(
            "{} is a native asset and has no allowance",
            token.symbol
        )));
    }
    let erc20 = erc20.ok_or_else(|| TxError::ContractUnavailable(token.symbol.clone()))?;

    let required = check_balance(erc20, owner, amount, token).await?;

    let allowance = erc20.allowance(owner, spender).await?;
    if allowance >= required {
        debug!(%owner, %spender, token = %token.symbol, "Allowance sufficient");
        return Ok(None);
    }

    let approve_amount = mode.approval_amount(required);
    info!(
        %owner,
        %spender,
        token = %token.symbol,
        allowance = %allowance,
        approve_amount = %approve_amount,
        "Submitting approval"
    );

    let pending = erc20.approve(spender, approve_amount).await?;
    let tx_hash = pending.hash();
    let receipt = pending.wait().await?;

    info!(
        tx_hash = ?tx_hash,
        gas_used = receipt.gas_used,
        block = ?receipt.block_number,
        "Approval confirmed"
    );
    Ok(Some(tx_hash))
}

// ============================================================================
// Per-pair serialization
// ============================================================================

type PairKey = (Address, Address, Address);

/// Async locks keyed by (token, owner, spender).
#[derive(Clone, Default)]
pub struct ApprovalLocks {
    locks: Arc<Mutex<HashMap<PairKey, Arc<Mutex<()>>>>>,
}

impl ApprovalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: PairKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    /// [`ensure_allowance`], holding the pair's lock until the approval is mined.
    pub async fn ensure_allowance(
        &self,
        erc20: Option<&dyn Erc20>,
        owner: Address,
        spender: Address,
        amount: &Amount,
        token: &TokenMeta,
        mode: ApprovalMode,
    ) -> Result<Option<B256>, TxError> {
        let key = (erc20.map(|c| c.address()).unwrap_or(token.address), owner, spender);
        let lock = self.lock_for(key).await;
        let result = {
            let _guard = lock.lock().await;
            ensure_allowance(erc20, owner, spender, amount, token, mode).await
        };
        self.release(key, &lock).await;
        result
    }

    /// Drop the pair's entry once no other caller holds or waits on it.
    async fn release(&self, key: PairKey, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one held by the caller.
        let ours = locks.get(&key).is_some_and(|l| Arc::ptr_eq(l, lock));
        if ours && Arc::strong_count(lock) <= 2 {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    async fn tracked_pairs(&self) -> usize {
        self.locks.lock().await.len()
    }
}

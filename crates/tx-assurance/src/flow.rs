//! A user action end to end: right chain, enough funds, enough allowance, then
//! the margined call. Each step runs only after the previous one succeeded.

use alloy::primitives::{Address, B256};
use chain_registry::{ChainDescriptor, TokenMeta};
use tracing::info;

use crate::chain::{SwitchOptions, ensure_chain};
use crate::error::TxError;
use crate::gas::{ContractCall, call_with_gas_margin};
use crate::preflight::{ApprovalLocks, ApprovalMode, check_balance};
use crate::token::{BalanceReader, Erc20, PendingTx};
use crate::units::Amount;
use crate::wallet::WalletProvider;

/// What the action costs the account.
pub enum Payment<'a> {
    /// Nothing beyond gas.
    Free,
    /// Value paid in the chain's native asset.
    Native {
        reader: &'a dyn BalanceReader,
        token: &'a TokenMeta,
        amount: Amount,
    },
    /// ERC-20 pulled by `spender` during the call.
    Erc20 {
        contract: Option<&'a dyn Erc20>,
        token: &'a TokenMeta,
        spender: Address,
        amount: Amount,
        mode: ApprovalMode,
    },
}

pub struct Action<'a, C: ?Sized> {
    pub account: Address,
    /// Chain the wallet must be on, if any.
    pub chain: Option<&'a ChainDescriptor>,
    pub payment: Payment<'a>,
    pub call: &'a C,
}

#[derive(Debug)]
pub struct ActionOutcome {
    /// Approval mined before the call, for user notification only.
    pub approval: Option<B256>,
    pub pending: PendingTx,
}

/// Runs actions against one wallet, sharing approval locks between them.
#[derive(Clone, Default)]
pub struct ActionRunner<'w> {
    wallet: Option<&'w dyn WalletProvider>,
    locks: ApprovalLocks,
    switch_options: SwitchOptions,
}

impl<'w> ActionRunner<'w> {
    pub fn new(wallet: Option<&'w dyn WalletProvider>) -> Self {
        Self {
            wallet,
            locks: ApprovalLocks::new(),
            switch_options: SwitchOptions::default(),
        }
    }

    pub fn with_switch_options(mut self, options: SwitchOptions) -> Self {
        self.switch_options = options;
        self
    }

    pub async fn run<C: ContractCall + ?Sized>(
        &self,
        action: Action<'_, C>,
    ) -> Result<ActionOutcome, TxError> {
        let method = action.call.method();

        if let Some(chain) = action.chain {
            if !ensure_chain(self.wallet, chain, self.switch_options).await? {
                return Err(TxError::ContractUnavailable(format!(
                    "{method} (no wallet to reach chain {})",
                    chain.chain_id
                )));
            }
        }

        let approval = match &action.payment {
            Payment::Free => None,
            Payment::Native {
                reader,
                token,
                amount,
            } => {
                check_balance(*reader, action.account, amount, token).await?;
                None
            }
            Payment::Erc20 {
                contract,
                token,
                spender,
                amount,
                mode,
            } => {
                self.locks
                    .ensure_allowance(*contract, action.account, *spender, amount, token, *mode)
                    .await?
            }
        };

        let chain_id = action.chain.map(|c| c.chain_id).unwrap_or_default();
        let pending = call_with_gas_margin(action.call, chain_id).await?;
        info!(method, approval = ?approval, tx_hash = ?pending.hash(), "Action submitted");

        Ok(ActionOutcome { approval, pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SWITCH_CHAIN_METHOD;
    use crate::chain::tests::{ScriptedWallet, bsc};
    use crate::gas::tests::RecordingCall;
    use crate::preflight::tests::MockErc20;
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const BUYER: Address = Address::new([0xb0; 20]);
    const MARKET: Address = Address::new([0x3a; 20]);

    fn units(whole: u64) -> U256 {
        U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
    }

    /// Fails the estimate if the approval has not landed yet.
    struct BuyItem {
        erc20: Arc<MockErc20>,
        inner: RecordingCall,
    }

    #[async_trait]
    impl ContractCall for BuyItem {
        fn method(&self) -> &str {
            self.inner.method()
        }

        async fn estimate_gas(&self) -> Result<u64, TxError> {
            let allowance = self.erc20.allowance(BUYER, MARKET).await?;
            if allowance < units(100) {
                return Err(TxError::Generic("buyItem estimated before approval".into()));
            }
            self.inner.estimate_gas().await
        }

        async fn send_with_gas_limit(&self, gas_limit: u64) -> Result<PendingTx, TxError> {
            self.inner.send_with_gas_limit(gas_limit).await
        }
    }

    #[tokio::test]
    async fn test_erc20_purchase_approves_then_buys_with_margin() {
        let erc20 = Arc::new(MockErc20::new(units(250), U256::ZERO));
        let token = TokenMeta::erc20("APE", 18, erc20.address, 1);
        let call = BuyItem {
            erc20: erc20.clone(),
            inner: RecordingCall::new("buyItem", 210_000),
        };

        let runner = ActionRunner::new(None);
        let outcome = runner
            .run(Action {
                account: BUYER,
                chain: None,
                payment: Payment::Erc20 {
                    contract: Some(&*erc20),
                    token: &token,
                    spender: MARKET,
                    amount: Amount::from(100u64),
                    mode: ApprovalMode::Unlimited,
                },
                call: &call,
            })
            .await
            .unwrap();

        assert!(outcome.approval.is_some());
        assert_eq!(erc20.approvals(), vec![(MARKET, U256::MAX)]);
        assert_eq!(call.inner.sent_limits(), vec![252_000]);
        outcome.pending.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_funds_stop_before_call() {
        let erc20 = Arc::new(MockErc20::new(units(99), U256::ZERO));
        let token = TokenMeta::erc20("APE", 18, erc20.address, 1);
        let call = RecordingCall::new("buyItem", 210_000);

        let err = ActionRunner::new(None)
            .run(Action {
                account: BUYER,
                chain: None,
                payment: Payment::Erc20 {
                    contract: Some(&*erc20),
                    token: &token,
                    spender: MARKET,
                    amount: Amount::from(100u64),
                    mode: ApprovalMode::Unlimited,
                },
                call: &call,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::InsufficientBalance { .. }));
        assert!(erc20.approvals().is_empty());
        assert!(call.sent_limits().is_empty());
    }

    #[tokio::test]
    async fn test_chain_enforced_before_payment() {
        let wallet = ScriptedWallet::default()
            .respond("eth_chainId", Ok(json!("0x1")))
            .respond(SWITCH_CHAIN_METHOD, Ok(Value::Null));
        let chain = bsc();
        let reader = MockErc20::new(units(1), U256::ZERO);
        let bnb = TokenMeta::native(&chain);
        let call = RecordingCall::new("placeBid", 80_000);

        let outcome = ActionRunner::new(Some(&wallet))
            .run(Action {
                account: BUYER,
                chain: Some(&chain),
                payment: Payment::Native {
                    reader: &reader,
                    token: &bnb,
                    amount: Amount::from("0.5"),
                },
                call: &call,
            })
            .await
            .unwrap();

        assert!(outcome.approval.is_none());
        assert_eq!(wallet.methods(), vec!["eth_chainId", SWITCH_CHAIN_METHOD]);
        assert_eq!(call.sent_limits(), vec![96_000]);
    }

    #[tokio::test]
    async fn test_required_chain_without_wallet_is_unavailable() {
        let chain = bsc();
        let call = RecordingCall::new("listItem", 50_000);

        let err = ActionRunner::new(None)
            .run(Action {
                account: BUYER,
                chain: Some(&chain),
                payment: Payment::Free,
                call: &call,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TxError::ContractUnavailable(_)));
        assert!(call.sent_limits().is_empty());
    }
}

use alloy::{
    contract::{CallBuilder, CallDecoder},
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, Bytes, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::TxError;
use crate::token::PendingTx;

/// Gas limit = estimate * 12000 / 10000, i.e. a 20% buffer.
pub const GAS_MARGIN_NUMERATOR: u64 = 12_000;
pub const GAS_MARGIN_DENOMINATOR: u64 = 10_000;

/// Inflate a gas estimate by the fixed margin. Integer math, rounds down.
pub fn apply_gas_margin(estimate: u64) -> u64 {
    let limit = u128::from(estimate) * u128::from(GAS_MARGIN_NUMERATOR)
        / u128::from(GAS_MARGIN_DENOMINATOR);
    u64::try_from(limit).unwrap_or(u64::MAX)
}

/// A contract call that can be estimated and then sent with an explicit limit.
#[async_trait]
pub trait ContractCall: Send + Sync {
    fn method(&self) -> &str;

    async fn estimate_gas(&self) -> Result<u64, TxError>;

    async fn send_with_gas_limit(&self, gas_limit: u64) -> Result<PendingTx, TxError>;
}

/// Estimate `call`, then send it with the margined gas limit.
///
/// `chain_id` is only logged; the margin is the same on every chain.
pub async fn call_with_gas_margin<C: ContractCall + ?Sized>(
    call: &C,
    chain_id: u64,
) -> Result<PendingTx, TxError> {
    let method = call.method();
    let estimated = call.estimate_gas().await?;
    let gas_limit = apply_gas_margin(estimated);
    debug!(method, chain_id, estimated, gas_limit, "Gas estimated");

    let pending = call.send_with_gas_limit(gas_limit).await?;
    info!(method, chain_id, gas_limit, tx_hash = ?pending.hash(), "Transaction submitted");
    Ok(pending)
}

// ============================================================================
// Alloy call builders
// ============================================================================

/// An alloy `CallBuilder` with the method name kept for logs.
///
/// Value, gas price and other overrides are set on the builder before wrapping:
///
/// ```ignore
/// let call = NamedCall::new("buyItem", market.buyItem(item_id).value(price));
/// let pending = call_with_gas_margin(&call, chain_id).await?;
/// ```
pub struct NamedCall<P, D> {
    method: String,
    call: CallBuilder<P, D>,
}

impl<P, D> NamedCall<P, D> {
    pub fn new(method: impl Into<String>, call: CallBuilder<P, D>) -> Self {
        Self {
            method: method.into(),
            call,
        }
    }
}

#[async_trait]
impl<P, D> ContractCall for NamedCall<P, D>
where
    P: Provider + Clone + Send + Sync + 'static,
    D: CallDecoder + Clone + Send + Sync + 'static,
{
    fn method(&self) -> &str {
        &self.method
    }

    async fn estimate_gas(&self) -> Result<u64, TxError> {
        Ok(self.call.estimate_gas().await?)
    }

    async fn send_with_gas_limit(&self, gas_limit: u64) -> Result<PendingTx, TxError> {
        let pending = self.call.clone().gas(gas_limit).send().await?;
        Ok(PendingTx::from_alloy(pending))
    }
}

// ============================================================================
// Raw intents
// ============================================================================

/// One user action: call `method` on `to` with `calldata`, sending `value`, on
/// `chain_id`. Built fresh per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub to: Address,
    pub method: String,
    pub calldata: Bytes,
    pub value: U256,
    pub chain_id: u64,
}

impl TransactionIntent {
    pub fn request(&self) -> TransactionRequest {
        TransactionRequest::default()
            .with_to(self.to)
            .with_input(self.calldata.clone())
            .with_value(self.value)
            .with_chain_id(self.chain_id)
    }
}

/// A [`TransactionIntent`] bound to the provider that will send it.
pub struct IntentCall<P> {
    intent: TransactionIntent,
    from: Option<Address>,
    provider: P,
}

impl<P: Provider + Clone> IntentCall<P> {
    pub fn new(intent: TransactionIntent, provider: P) -> Self {
        Self {
            intent,
            from: None,
            provider,
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    fn request(&self) -> TransactionRequest {
        let request = self.intent.request();
        match self.from {
            Some(from) => request.with_from(from),
            None => request,
        }
    }
}

#[async_trait]
impl<P> ContractCall for IntentCall<P>
where
    P: Provider<Ethereum> + Clone + Send + Sync + 'static,
{
    fn method(&self) -> &str {
        &self.intent.method
    }

    async fn estimate_gas(&self) -> Result<u64, TxError> {
        Ok(self.provider.estimate_gas(self.request()).await?)
    }

    async fn send_with_gas_limit(&self, gas_limit: u64) -> Result<PendingTx, TxError> {
        let request = self.request().with_gas_limit(gas_limit);
        let pending = self.provider.send_transaction(request).await?;
        Ok(PendingTx::from_alloy(pending))
    }
}

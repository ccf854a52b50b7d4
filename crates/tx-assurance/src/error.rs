//! # Error Taxonomy
//!
//! Every failure the assurance layer can surface is a [`TxError`]. Errors coming
//! out of alloy or a wallet bridge are classified once, at the boundary, into
//! the tagged variants below; call sites match on variants instead of probing
//! error shapes.

use alloy::primitives::U256;
use alloy::providers::PendingTransactionError;
use alloy::transports::TransportError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// EIP-1193 / JSON-RPC error codes
// ============================================================================

/// The user rejected the request in their wallet.
pub const USER_REJECTED: i64 = 4001;
/// The requested account or method has not been authorized.
pub const UNAUTHORIZED: i64 = 4100;
/// The wallet does not support the requested method.
pub const UNSUPPORTED_METHOD: i64 = 4200;
/// The wallet is disconnected from all chains.
pub const DISCONNECTED: i64 = 4900;
/// The wallet is not connected to the requested chain.
pub const CHAIN_DISCONNECTED: i64 = 4901;
/// `wallet_switchEthereumChain` target is unknown to the wallet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
/// A request of the same type is already pending in the wallet.
pub const RESOURCE_UNAVAILABLE: i64 = -32002;
/// Generic node-side failure (e.g. "header not found").
pub const SERVER_ERROR: i64 = -32000;

// ============================================================================
// Provider errors
// ============================================================================

/// Nested `data` object some wallets attach to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorData {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error object returned by an EIP-1193 wallet or a JSON-RPC node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: Option<ProviderErrorData>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, code: Option<i64>, message: Option<String>) -> Self {
        self.data = Some(ProviderErrorData { code, message });
        self
    }

    /// Build from a raw JSON-RPC `data` member, keeping it only when it has the
    /// `{ code, message }` shape. Revert payloads (hex strings) are dropped here.
    pub fn from_parts(code: i64, message: impl Into<String>, data: Option<&Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data: data.and_then(data_from_value),
        }
    }

    pub fn data_message(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.message.as_deref())
    }
}

impl fmt::Display for ProviderRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error {}: {}", self.code, self.message)?;
        if let Some(msg) = self.data_message() {
            write!(f, " ({msg})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderRpcError {}

fn data_from_value(value: &Value) -> Option<ProviderErrorData> {
    match value {
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn lenient_data<'de, D>(deserializer: D) -> Result<Option<ProviderErrorData>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(data_from_value))
}

// ============================================================================
// TxError
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("Insufficient {symbol} balance: required {required}, available {available}")]
    InsufficientBalance {
        symbol: String,
        required: U256,
        available: U256,
    },

    #[error("{0} contract is not available")]
    ContractUnavailable(String),

    #[error(transparent)]
    Provider(#[from] ProviderRpcError),

    #[error("request failed with status {status}: {data}")]
    Http { status: u16, data: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction confirmation failed: {0}")]
    Confirmation(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Generic(String),
}

impl TxError {
    pub fn provider(&self) -> Option<&ProviderRpcError> {
        match self {
            TxError::Provider(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.provider().is_some_and(|e| e.code == USER_REJECTED)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.provider().is_some_and(|e| {
            e.code == UNRECOGNIZED_CHAIN
                || e.data.as_ref().and_then(|d| d.code) == Some(UNRECOGNIZED_CHAIN)
        })
    }

    pub fn is_header_not_found(&self) -> bool {
        self.provider().is_some_and(crate::rpc::is_header_not_found)
    }
}

impl From<TransportError> for TxError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => {
                let data = payload
                    .data
                    .as_ref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok());
                TxError::Provider(ProviderRpcError::from_parts(
                    payload.code,
                    payload.message.to_string(),
                    data.as_ref(),
                ))
            }
            None => TxError::Rpc(err.to_string()),
        }
    }
}

impl From<alloy::contract::Error> for TxError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => e.into(),
            other => TxError::Rpc(other.to_string()),
        }
    }
}

impl From<PendingTransactionError> for TxError {
    fn from(err: PendingTransactionError) -> Self {
        match err {
            PendingTransactionError::TransportError(e) => e.into(),
            other => TxError::Confirmation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;
    use serde_json::json;

    fn error_resp(payload: Value) -> TransportError {
        let payload: ErrorPayload = serde_json::from_value(payload).unwrap();
        TransportError::ErrorResp(payload)
    }

    #[test]
    fn test_transport_error_payload_becomes_provider() {
        let err = TxError::from(error_resp(json!({
            "code": 4902,
            "message": "Unrecognized chain ID \"0x38\".",
            "data": { "code": 4902, "message": "Try adding the chain" }
        })));

        let provider = err.provider().unwrap();
        assert_eq!(provider.code, UNRECOGNIZED_CHAIN);
        assert_eq!(provider.data_message(), Some("Try adding the chain"));
        assert!(err.is_unrecognized_chain());
    }

    #[test]
    fn test_nested_unrecognized_chain_code() {
        let err = TxError::from(error_resp(json!({
            "code": -32603,
            "message": "Internal JSON-RPC error.",
            "data": { "code": 4902 }
        })));
        assert!(matches!(&err, TxError::Provider(e) if e.code == -32603));
        assert!(err.is_unrecognized_chain());
    }

    #[test]
    fn test_transport_failure_without_payload_is_rpc() {
        let err = TxError::from(TransportErrorKind::custom_str("connection refused"));
        assert!(matches!(err, TxError::Rpc(msg) if msg.contains("connection refused")));
    }

    #[test]
    fn test_contract_error_classification() {
        let err = TxError::from(alloy::contract::Error::TransportError(error_resp(json!({
            "code": -32000,
            "message": "header not found"
        }))));
        assert!(err.is_header_not_found());

        let err = TxError::from(alloy::contract::Error::ContractNotDeployed);
        assert!(matches!(err, TxError::Rpc(_)));
    }

    #[test]
    fn test_pending_transaction_error_classification() {
        let err = TxError::from(PendingTransactionError::TransportError(error_resp(json!({
            "code": USER_REJECTED,
            "message": "User denied transaction signature."
        }))));
        assert!(err.is_user_rejected());

        let err = TxError::from(PendingTransactionError::FailedToRegister);
        assert!(matches!(err, TxError::Confirmation(_)));
    }

    #[test]
    fn test_deserialize_wallet_error_with_nested_data() {
        let err: ProviderRpcError = serde_json::from_value(json!({
            "code": -32603,
            "message": "Internal JSON-RPC error.",
            "data": { "code": 4902, "message": "Unrecognized chain ID \"0x38\"." }
        }))
        .unwrap();

        assert_eq!(err.code, -32603);
        assert_eq!(err.data_message(), Some("Unrecognized chain ID \"0x38\"."));
        assert!(TxError::Provider(err).is_unrecognized_chain());
    }

    #[test]
    fn test_deserialize_ignores_revert_data() {
        let err: ProviderRpcError = serde_json::from_value(json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x08c379a0"
        }))
        .unwrap();
        assert!(err.data.is_none());
    }

    #[test]
    fn test_user_rejected() {
        let err = TxError::from(ProviderRpcError::new(
            USER_REJECTED,
            "User rejected the request.",
        ));
        assert!(err.is_user_rejected());
        assert!(!err.is_unrecognized_chain());
        assert_eq!(
            err.to_string(),
            "provider error 4001: User rejected the request."
        );
    }

    #[test]
    fn test_insufficient_balance_message_names_symbol() {
        let err = TxError::InsufficientBalance {
            symbol: "APE".into(),
            required: U256::from(100u64),
            available: U256::from(1u64),
        };
        assert!(err.to_string().starts_with("Insufficient APE balance"));
    }
}

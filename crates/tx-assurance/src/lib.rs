//! Transaction assurance for wallet-driven marketplace actions.
//!
//! - [`preflight`]: balance and ERC-20 allowance guards, with auto-approval
//! - [`gas`]: gas estimation with a fixed 20% margin
//! - [`chain`]: wallet chain switch negotiation (switch, register, retry once)
//! - [`notify`]: error classification into user notifications
//! - [`rpc`]: "header not found" detection and opt-in read retries
//! - [`flow`]: the above chained in order for one user action

pub mod chain;
pub mod error;
pub mod flow;
pub mod gas;
pub mod notify;
pub mod preflight;
pub mod rpc;
pub mod token;
pub mod units;
pub mod wallet;

// ============================================================================
// Re-exports
// ============================================================================

pub use chain::{
    AddChainParams, ChainSwitcher, SwitchOptions, SwitchState, current_chain_id, ensure_chain,
    switch_chain, watch_asset,
};
pub use error::{ProviderErrorData, ProviderRpcError, TxError};
pub use flow::{Action, ActionOutcome, ActionRunner, Payment};
pub use gas::{
    ContractCall, IntentCall, NamedCall, TransactionIntent, apply_gas_margin,
    call_with_gas_margin,
};
pub use notify::{
    ErrorClass, Notification, NotificationSink, ToastStatus, TracingSink, classify, handle_error,
};
pub use preflight::{ApprovalLocks, ApprovalMode, check_balance, ensure_allowance};
pub use rpc::{RetryConfig, is_header_not_found, retry_reads};
pub use token::{
    BalanceReader, Erc20, Erc20Contract, NativeBalance, PendingTx, TxReceiptSummary,
};
pub use units::{Amount, format_amount};
pub use wallet::{HttpWalletProvider, WalletProvider};

pub use chain_registry::{ChainDescriptor, NativeCurrency, Registry, TokenMeta};

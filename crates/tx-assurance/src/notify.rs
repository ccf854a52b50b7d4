//! # User Feedback
//!
//! [`handle_error`] is the last stop for a failed action: it logs the error,
//! classifies it with [`classify`] and hands at most one [`Notification`] to the
//! caller's [`NotificationSink`].
//!
//! Classification is first-match-wins, so an error never produces more than one
//! notification.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{RESOURCE_UNAVAILABLE, TxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastStatus {
    Error,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub status: ToastStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Notification {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            status: ToastStatus::Error,
            title: None,
            description: Some(description.into()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Writes notifications to the log instead of a UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        let title = n.title.as_deref().unwrap_or("");
        let description = n.description.as_deref().unwrap_or("");
        match n.status {
            ToastStatus::Error => error!(title, description, "❌ notification"),
            ToastStatus::Warning => warn!(title, description, "⚠️ notification"),
            ToastStatus::Info | ToastStatus::Success => info!(title, description, "notification"),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// The wallet already has a chain switch prompt open.
    PendingRequest,
    /// Any other wallet or node error carrying a code.
    Provider {
        code: i64,
        message: String,
        data_message: Option<String>,
    },
    /// An HTTP-level failure from a backend or bridge.
    Http { status: u16, data: String },
    /// Everything else, surfaced by its message.
    Generic(String),
}

fn mentions_pending_switch(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("wallet_switchethereumchain") || message.contains("already pending")
}

pub fn classify(err: &TxError) -> ErrorClass {
    match err {
        TxError::Provider(e)
            if e.code == RESOURCE_UNAVAILABLE && mentions_pending_switch(&e.message) =>
        {
            ErrorClass::PendingRequest
        }
        TxError::Provider(e) => ErrorClass::Provider {
            code: e.code,
            message: e.message.clone(),
            data_message: e.data_message().map(str::to_string),
        },
        TxError::Http { status, data } => ErrorClass::Http {
            status: *status,
            data: data.clone(),
        },
        other => ErrorClass::Generic(other.to_string()),
    }
}

impl ErrorClass {
    pub fn to_notification(&self) -> Notification {
        match self {
            ErrorClass::PendingRequest => Notification {
                status: ToastStatus::Error,
                title: Some("Pending request".to_string()),
                description: Some(
                    "A network switch request is already pending. Please check your wallet extension."
                        .to_string(),
                ),
            },
            ErrorClass::Provider {
                code,
                message,
                data_message,
            } => {
                let description = match data_message {
                    Some(data) => format!("{message} {data}"),
                    None => message.clone(),
                };
                Notification::error(description).with_title(format!("Wallet error {code}"))
            }
            ErrorClass::Http { status, data } => {
                Notification::error(data.clone()).with_title(format!("Request failed ({status})"))
            }
            ErrorClass::Generic(message) => Notification::error(message.clone()),
        }
    }
}

/// Log `err` and, unless `suppress`, show one notification for it.
///
/// `suppress` is for errors from background work whose UI is no longer shown.
pub fn handle_error(err: &TxError, sink: Option<&dyn NotificationSink>, suppress: bool) {
    error!(error = %err, suppress, "Transaction action failed");
    if suppress {
        return;
    }
    if let Some(sink) = sink {
        sink.notify(classify(err).to_notification());
    }
}

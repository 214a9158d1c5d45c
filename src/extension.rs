//! Duck-typed surface of an injected wallet extension.
//!
//! Browser wallets expose un-versioned, provider-specific globals. This
//! module models that surface as a generic request/reply channel carrying
//! JSON values, plus an optional event stream for account and network
//! change notifications. Adapters own all interpretation of the payloads;
//! the handle itself is dumb transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::ConnectorError;
use crate::provider::ProviderType;

/// Failure at the extension boundary, before adapter interpretation.
#[derive(Error, Debug, Clone)]
pub enum ExtensionError {
    /// The user dismissed or declined the extension prompt.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The extension does not expose the requested method (older
    /// extension versions, or a capability the wallet never had).
    #[error("method not available: {0}")]
    MissingMethod(String),

    /// The extension answered with something the adapter cannot read.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Transport-level failure; timeouts land here too.
    #[error("{0}")]
    Transport(String),
}

/// Notification pushed by an extension outside any request/reply cycle.
#[derive(Debug, Clone)]
pub enum ExtensionEvent {
    /// The wallet's exposed account list changed.
    AccountsChanged { accounts: Vec<String> },
    /// The wallet switched chains; carries the provider-native identifier.
    NetworkChanged { network: String },
    /// The wallet dropped the session on its side.
    Disconnected,
}

/// Request/reply channel to one installed extension.
///
/// `method` names follow the provider's own API surface; adapters know
/// which methods their wallet answers and how to shape `params`.
#[async_trait]
pub trait ExtensionHandle: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ExtensionError>;

    /// Event stream, when the extension exposes change notifications.
    fn subscribe_events(&self) -> Option<broadcast::Receiver<ExtensionEvent>> {
        None
    }
}

/// Access to the host environment's injected globals.
///
/// Probing answers "is this provider's binding present right now"; it is
/// re-run on a provider-announced signal so wallets installed mid-session
/// become discoverable without a reload.
pub trait ExtensionHost: Send + Sync {
    fn probe(&self, provider: ProviderType) -> bool;

    fn handle(&self, provider: ProviderType) -> Option<Arc<dyn ExtensionHandle>>;
}

/// Map an extension-boundary failure into the connector taxonomy.
pub fn map_extension_error(
    provider: ProviderType,
    operation: &'static str,
    err: ExtensionError,
) -> ConnectorError {
    match err {
        ExtensionError::Rejected(msg) => ConnectorError::UserRejected(msg),
        ExtensionError::MissingMethod(_) => ConnectorError::Unsupported {
            provider,
            operation,
        },
        ExtensionError::MalformedReply(msg) | ExtensionError::Transport(msg) => {
            ConnectorError::Extension(msg)
        }
    }
}

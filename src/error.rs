use thiserror::Error;

use crate::network::NetworkType;
use crate::provider::ProviderType;

/// Failure taxonomy for connector operations.
///
/// Every adapter operation either resolves with a well-formed result or
/// fails with one of these kinds; nothing is swallowed and nothing is
/// retried automatically.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The human declined an extension prompt. Surfaced verbatim.
    #[error("user rejected the request: {0}")]
    UserRejected(String),

    /// The requested provider has no detected extension.
    #[error("wallet extension not installed: {0}")]
    NotInstalled(ProviderType),

    /// The provider lacks a requested capability.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderType,
        operation: &'static str,
    },

    /// Detected locally before any extension call.
    #[error("insufficient funds: {available} sats available, {required} sats required")]
    InsufficientFunds { available: u64, required: u64 },

    /// A switch/sign call conflicts with the provider's current network.
    #[error("network mismatch: requested {requested}, wallet is on {actual}")]
    NetworkMismatch {
        requested: NetworkType,
        actual: NetworkType,
    },

    /// Validation failure before any extension round-trip.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Any other failure from the extension or transport, with the
    /// underlying message preserved.
    #[error("extension error: {0}")]
    Extension(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shorthand for the unsupported-capability failure adapters return for
/// operations their extension does not expose.
pub fn unsupported(provider: ProviderType, operation: &'static str) -> ConnectorError {
    ConnectorError::Unsupported {
        provider,
        operation,
    }
}

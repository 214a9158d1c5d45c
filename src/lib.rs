//! satlink: a unified connector layer for browser-injected Bitcoin wallet
//! providers.
//!
//! Every supported wallet exposes its own ad-hoc API, network naming, and
//! capability surface; this crate normalizes them behind one contract:
//!
//! - [`provider::WalletProvider`] — the per-provider capability contract,
//!   with one adapter per [`provider::ProviderType`]
//! - [`network`] — the canonical network model and its bidirectional
//!   mapping to each provider's native identifiers
//! - [`store::ConnectorStore`] — the reactive connection/account state
//!   container shared by all adapters
//! - [`psbt`] — the PSBT lifecycle: build, sign, finalize, broadcast
//! - [`persist`] — session rehydration across reloads
//! - [`client::WalletConnector`] — the connection state machine tying it
//!   all together

pub mod client;
pub mod config;
pub mod error;
pub mod extension;
pub mod network;
pub mod persist;
pub mod provider;
pub mod psbt;
pub mod relay;
pub mod store;

pub use client::WalletConnector;
pub use config::ConnectorConfig;
pub use error::{ConnectorError, PersistError};
pub use extension::{ExtensionError, ExtensionEvent, ExtensionHandle, ExtensionHost};
pub use network::NetworkType;
pub use provider::{ProviderType, SignPsbtReply, WalletProvider};
pub use psbt::{PsbtStage, PsbtTransaction, Utxo};
pub use store::{ConnectionState, ConnectorStore, StateKey, StateUpdate};

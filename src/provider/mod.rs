//! Wallet provider capability contract and adapters.
//!
//! One adapter per supported browser wallet. Every adapter implements the
//! same capability set; operations a wallet does not expose fail with a
//! typed unsupported error so callers can branch on capability rather
//! than on provider identity.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{unsupported, ConnectorError};
use crate::extension::{map_extension_error, ExtensionHandle, ExtensionHost};
use crate::network::NetworkType;
use crate::persist::SessionPersistence;
use crate::psbt::builder::DUST_LIMIT_SATS;
use crate::store::{ConnectorStore, StateUpdate};

mod leather;
mod magic_eden;
mod okx;
mod op_net;
mod orange;
mod oyl;
mod phantom;
mod registry;
mod unisat;
mod wizz;
mod xverse;

pub use leather::LeatherAdapter;
pub use magic_eden::MagicEdenAdapter;
pub use okx::OkxAdapter;
pub use op_net::OpNetAdapter;
pub use orange::OrangeAdapter;
pub use oyl::OylAdapter;
pub use phantom::PhantomAdapter;
pub use registry::ProviderRegistry;
pub use unisat::UnisatAdapter;
pub use wizz::WizzAdapter;
pub use xverse::XverseAdapter;

/// Closed set of supported wallet identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    Unisat,
    Xverse,
    Leather,
    Okx,
    Oyl,
    MagicEden,
    Phantom,
    Wizz,
    Orange,
    OpNet,
}

impl ProviderType {
    pub const ALL: [ProviderType; 10] = [
        ProviderType::Unisat,
        ProviderType::Xverse,
        ProviderType::Leather,
        ProviderType::Okx,
        ProviderType::Oyl,
        ProviderType::MagicEden,
        ProviderType::Phantom,
        ProviderType::Wizz,
        ProviderType::Orange,
        ProviderType::OpNet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Unisat => "unisat",
            ProviderType::Xverse => "xverse",
            ProviderType::Leather => "leather",
            ProviderType::Okx => "okx",
            ProviderType::Oyl => "oyl",
            ProviderType::MagicEden => "magic-eden",
            ProviderType::Phantom => "phantom",
            ProviderType::Wizz => "wizz",
            ProviderType::Orange => "orange",
            ProviderType::OpNet => "op-net",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderType::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown provider: {}", s))
    }
}

/// Normalized reply of a PSBT signing call.
///
/// Extensions answer in several shapes; adapters funnel everything
/// through [`SignPsbtReply::from_value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignPsbtReply {
    pub signed_psbt_hex: Option<String>,
    pub signed_psbt_base64: Option<String>,
    /// Present when the provider signed and broadcast atomically.
    pub txid: Option<String>,
}

impl SignPsbtReply {
    /// Interpret an extension signing reply.
    ///
    /// A plain string is a legacy hex-only reply; objects carry the
    /// signed payload under a handful of historical key names. A reply
    /// bearing a transaction id means the provider already broadcast.
    pub fn from_value(value: &Value) -> Self {
        if let Some(text) = value.as_str() {
            return Self {
                signed_psbt_hex: Some(text.to_string()),
                ..Default::default()
            };
        }
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| value.get(k).and_then(Value::as_str))
                .map(str::to_string)
        };
        Self {
            signed_psbt_hex: pick(&["signedPsbtHex", "psbtHex", "hex", "psbt"]),
            signed_psbt_base64: pick(&["signedPsbtBase64", "psbtBase64", "base64"]),
            txid: pick(&["txId", "txid"]),
        }
    }
}

/// Identity fields an adapter learns from a successful account request.
#[derive(Debug, Clone, Default)]
pub struct WalletIdentity {
    pub address: String,
    pub payment_address: String,
    pub public_key: String,
    pub payment_public_key: String,
    pub accounts: Vec<String>,
}

/// Capability contract every wallet adapter implements.
///
/// All operations suspend until the underlying extension responds; side
/// effects are confined to the shared store and the extension itself.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Idempotent startup hook: restores persisted identity for this
    /// provider (provisional, never `connected`) and prepares the
    /// extension handle.
    async fn initialize(&self) -> Result<(), ConnectorError>;

    /// Drop the cached extension handle; safe to call repeatedly.
    async fn dispose(&self);

    /// Request account access and write the resulting identity fields to
    /// the shared store. The `connected` flag itself is owned by the
    /// connection state machine.
    async fn connect(&self) -> Result<WalletIdentity, ConnectorError>;

    /// Clear this provider's fields in the shared store. Always succeeds
    /// locally even when the extension has no disconnect call.
    async fn disconnect(&self);

    async fn get_network(&self) -> Result<NetworkType, ConnectorError>;

    /// Ask the extension to change networks; returns the canonical
    /// network actually reached (possibly a documented degradation).
    async fn switch_network(&self, network: NetworkType) -> Result<NetworkType, ConnectorError> {
        let _ = network;
        Err(unsupported(self.provider_type(), "switch_network"))
    }

    /// Balance in satoshis for the payment address.
    async fn get_balance(&self) -> Result<u64, ConnectorError> {
        Err(unsupported(self.provider_type(), "get_balance"))
    }

    async fn get_public_key(&self) -> Result<String, ConnectorError> {
        Err(unsupported(self.provider_type(), "get_public_key"))
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        Err(unsupported(self.provider_type(), "request_accounts"))
    }

    /// Provider-defined signature encoding, passed through unmodified.
    async fn sign_message(&self, message: &str, address: &str) -> Result<String, ConnectorError> {
        let _ = (message, address);
        Err(unsupported(self.provider_type(), "sign_message"))
    }

    async fn sign_psbt(
        &self,
        psbt_hex: &str,
        finalize: bool,
        broadcast: bool,
    ) -> Result<SignPsbtReply, ConnectorError> {
        let _ = (psbt_hex, finalize, broadcast);
        Err(unsupported(self.provider_type(), "sign_psbt"))
    }

    async fn push_psbt(&self, signed_hex: &str) -> Result<String, ConnectorError> {
        let _ = signed_hex;
        Err(unsupported(self.provider_type(), "push_psbt"))
    }

    async fn send_btc(&self, to: &str, amount_sats: u64) -> Result<String, ConnectorError> {
        let _ = (to, amount_sats);
        Err(unsupported(self.provider_type(), "send_btc"))
    }

    async fn inscribe(
        &self,
        content_base64: &str,
        mime_type: &str,
    ) -> Result<String, ConnectorError> {
        let _ = (content_base64, mime_type);
        Err(unsupported(self.provider_type(), "inscribe"))
    }

    /// Dust/fee floor used by the local insufficient-funds check before a
    /// send reaches the extension.
    fn minimum_send_floor(&self) -> u64 {
        DUST_LIMIT_SATS
    }
}

/// Plumbing shared by every adapter: extension handle caching, persisted
/// identity restore, and store writes.
pub(crate) struct AdapterCore {
    provider: ProviderType,
    store: Arc<ConnectorStore>,
    persistence: Arc<SessionPersistence>,
    host: Arc<dyn ExtensionHost>,
    handle: Mutex<Option<Arc<dyn ExtensionHandle>>>,
    initialized: AtomicBool,
}

impl AdapterCore {
    pub fn new(
        provider: ProviderType,
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            provider,
            store,
            persistence,
            host,
            handle: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ConnectorStore> {
        &self.store
    }

    /// Cached extension handle, or NotInstalled when the binding is gone.
    pub fn handle(&self) -> Result<Arc<dyn ExtensionHandle>, ConnectorError> {
        let mut cached = self.handle.lock().expect("handle lock poisoned");
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }
        match self.host.handle(self.provider) {
            Some(handle) => {
                *cached = Some(handle.clone());
                Ok(handle)
            }
            None => Err(ConnectorError::NotInstalled(self.provider)),
        }
    }

    /// Call into the extension, mapping boundary failures into the
    /// connector taxonomy under the given operation name.
    pub async fn call(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError> {
        let handle = self.handle()?;
        log::debug!("{}: calling {}", self.provider, method);
        handle
            .call(method, params)
            .await
            .map_err(|e| map_extension_error(self.provider, operation, e))
    }

    /// Idempotent restore of persisted identity. Only the provider that
    /// was connected last gets rehydrated, and only provisionally: the
    /// `connected` flag is never restored.
    pub fn initialize(&self) -> Result<(), ConnectorError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.persistence.last_provider()? != Some(self.provider) {
            return Ok(());
        }
        let snapshot = self.persistence.restore(self.provider)?;
        if snapshot.is_empty() {
            return Ok(());
        }
        log::info!("{}: restoring persisted session identity", self.provider);
        self.store.apply(StateUpdate {
            address: Some(snapshot.address),
            payment_address: Some(snapshot.payment_address),
            public_key: Some(snapshot.public_key),
            payment_public_key: Some(snapshot.payment_public_key),
            balance: Some(snapshot.balance),
            ..Default::default()
        });
        Ok(())
    }

    pub fn dispose(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.handle.lock().expect("handle lock poisoned").take();
    }

    /// Write a freshly fetched identity as one atomic batch, overwriting
    /// (not merging with) any provisional restored values.
    pub fn write_identity(&self, identity: &WalletIdentity) {
        self.store.apply(StateUpdate {
            address: Some(identity.address.clone()),
            payment_address: Some(identity.payment_address.clone()),
            public_key: Some(identity.public_key.clone()),
            payment_public_key: Some(identity.payment_public_key.clone()),
            accounts: Some(identity.accounts.clone()),
            ..Default::default()
        });
    }

    /// Clear the per-connection fields this adapter owns.
    pub fn clear_fields(&self) {
        self.store.apply(StateUpdate::cleared());
    }
}

/// Convert a BTC-denominated decimal string to integer satoshis without
/// rounding loss.
pub fn btc_to_sats(text: &str) -> Result<u64, ConnectorError> {
    let text = text.trim();
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    if frac.len() > 8 {
        return Err(ConnectorError::InvalidInput(format!(
            "sub-satoshi precision in balance: {}",
            text
        )));
    }
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| ConnectorError::InvalidInput(format!("invalid balance: {}", text)))?
    };
    let frac_sats: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<8}", frac)
            .parse()
            .map_err(|_| ConnectorError::InvalidInput(format!("invalid balance: {}", text)))?
    };
    Ok(whole * 100_000_000 + frac_sats)
}

/// Interpret the various balance reply shapes extensions use: a bare
/// satoshi number, an object carrying `total`/`confirmed`, a satoshi
/// string, or a BTC decimal string.
pub(crate) fn balance_to_sats(value: &Value) -> Result<u64, ConnectorError> {
    if let Some(sats) = value.as_u64() {
        return Ok(sats);
    }
    if let Some(text) = value.as_str() {
        if text.contains('.') {
            return btc_to_sats(text);
        }
        return text
            .parse::<u64>()
            .map_err(|_| ConnectorError::InvalidInput(format!("invalid balance: {}", text)));
    }
    for key in ["total", "confirmed"] {
        if let Some(inner) = value.get(key) {
            return balance_to_sats(inner);
        }
    }
    Err(ConnectorError::InvalidInput(format!(
        "unrecognized balance reply: {}",
        value
    )))
}

/// Pull a string field out of a JSON reply.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A reply that is either a bare string or an object with the text under
/// one of the given keys.
pub(crate) fn text_reply(value: &Value, keys: &[&str]) -> Option<String> {
    value
        .as_str()
        .map(str::to_string)
        .or_else(|| keys.iter().find_map(|k| str_field(value, k)))
}

//! Magic Eden wallet adapter.
//!
//! Sats-connect address layout like Xverse, but no network switching, no
//! balance query, and no broadcast-on-sign.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{unsupported, ConnectorError};
use crate::extension::ExtensionHost;
use crate::network::NetworkType;
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::xverse::{base64_psbt_to_hex, hex_psbt_to_base64, parse_purpose_addresses};
use super::{
    text_reply, AdapterCore, ProviderType, SignPsbtReply, WalletIdentity, WalletProvider,
};

pub struct MagicEdenAdapter {
    core: AdapterCore,
}

impl MagicEdenAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::MagicEden, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for MagicEdenAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::MagicEden
    }

    async fn initialize(&self) -> Result<(), ConnectorError> {
        self.core.initialize()
    }

    async fn dispose(&self) {
        self.core.dispose();
    }

    async fn connect(&self) -> Result<WalletIdentity, ConnectorError> {
        let reply = self
            .core
            .call(
                "connect",
                "connect",
                json!({ "purposes": ["ordinals", "payment"] }),
            )
            .await?;
        let identity = parse_purpose_addresses(&reply)?;
        self.core.write_identity(&identity);
        Ok(identity)
    }

    async fn disconnect(&self) {
        self.core.clear_fields();
    }

    async fn get_network(&self) -> Result<NetworkType, ConnectorError> {
        Err(unsupported(ProviderType::MagicEden, "get_network"))
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.connect().await?.accounts)
    }

    async fn sign_message(&self, message: &str, address: &str) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call(
                "sign_message",
                "signMessage",
                json!({ "address": address, "message": message }),
            )
            .await?;
        text_reply(&reply, &["signature"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected signature reply: {}", reply))
        })
    }

    async fn sign_psbt(
        &self,
        psbt_hex: &str,
        finalize: bool,
        broadcast: bool,
    ) -> Result<SignPsbtReply, ConnectorError> {
        if broadcast {
            return Err(unsupported(ProviderType::MagicEden, "broadcast-on-sign"));
        }
        let psbt_base64 = hex_psbt_to_base64(psbt_hex)?;
        let reply = self
            .core
            .call(
                "sign_psbt",
                "signPsbt",
                json!({ "psbt": psbt_base64, "finalize": finalize }),
            )
            .await?;
        let mut normalized = SignPsbtReply::from_value(&reply);
        if normalized.signed_psbt_hex.is_none() {
            if let Some(b64) = normalized.signed_psbt_base64.as_deref() {
                normalized.signed_psbt_hex = Some(base64_psbt_to_hex(b64)?);
            }
        }
        Ok(normalized)
    }
}

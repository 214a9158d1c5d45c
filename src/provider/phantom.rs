//! Phantom wallet adapter.
//!
//! Bitcoin accounts carry a purpose tag; no network operations and no
//! balance query on the Bitcoin surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{unsupported, ConnectorError};
use crate::extension::ExtensionHost;
use crate::network::NetworkType;
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::{
    str_field, text_reply, AdapterCore, ProviderType, SignPsbtReply, WalletIdentity,
    WalletProvider,
};

pub struct PhantomAdapter {
    core: AdapterCore,
}

impl PhantomAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Phantom, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for PhantomAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Phantom
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
            .call("connect", "requestAccounts", Value::Null)
            .await?;
        let items = reply.as_array().ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected accounts reply: {}", reply))
        })?;

        let mut identity = WalletIdentity::default();
        for item in items {
            let address = str_field(item, "address").unwrap_or_default();
            let public_key = str_field(item, "publicKey").unwrap_or_default();
            match item.get("purpose").and_then(Value::as_str) {
                Some("ordinals") => {
                    identity.address = address.clone();
                    identity.public_key = public_key;
                }
                Some("payment") => {
                    identity.payment_address = address.clone();
                    identity.payment_public_key = public_key;
                }
                _ => {}
            }
            if !address.is_empty() {
                identity.accounts.push(address);
            }
        }
        if identity.accounts.is_empty() {
            return Err(ConnectorError::Extension(
                "wallet returned no accounts".to_string(),
            ));
        }
        self.core.write_identity(&identity);
        Ok(identity)
    }

    async fn disconnect(&self) {
        self.core.clear_fields();
    }

    async fn get_network(&self) -> Result<NetworkType, ConnectorError> {
        Err(unsupported(ProviderType::Phantom, "get_network"))
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
        _finalize: bool,
        broadcast: bool,
    ) -> Result<SignPsbtReply, ConnectorError> {
        if broadcast {
            return Err(unsupported(ProviderType::Phantom, "broadcast-on-sign"));
        }
        let reply = self
            .core
            .call("sign_psbt", "signPSBT", json!({ "psbtHex": psbt_hex }))
            .await?;
        Ok(SignPsbtReply::from_value(&reply))
    }
}

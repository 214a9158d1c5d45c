//! Orange wallet adapter.
//!
//! Sats-connect clone with only Mainnet/Testnet natively; everything else
//! degrades through the network tables.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{unsupported, ConnectorError};
use crate::extension::ExtensionHost;
use crate::network::{self, NetworkType};
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::xverse::{base64_psbt_to_hex, hex_psbt_to_base64, parse_purpose_addresses};
use super::{
    balance_to_sats, text_reply, AdapterCore, ProviderType, SignPsbtReply, WalletIdentity,
    WalletProvider,
};

pub struct OrangeAdapter {
    core: AdapterCore,
}

impl OrangeAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Orange, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for OrangeAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Orange
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
                "getAccounts",
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
        let reply = self
            .core
            .call("get_network", "getNetwork", Value::Null)
            .await?;
        let native = text_reply(&reply, &["name"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unrecognized network reply: {}", reply))
        })?;
        Ok(network::from_provider_network(&native, ProviderType::Orange))
    }

    async fn switch_network(&self, network_type: NetworkType) -> Result<NetworkType, ConnectorError> {
        let native = network::to_provider_network(network_type, ProviderType::Orange);
        self.core
            .call("switch_network", "changeNetwork", json!({ "name": native }))
            .await?;
        Ok(network::from_provider_network(native, ProviderType::Orange))
    }

    async fn get_balance(&self) -> Result<u64, ConnectorError> {
        let reply = self
            .core
            .call("get_balance", "getBalance", Value::Null)
            .await?;
        balance_to_sats(&reply)
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
        if broadcast && !finalize {
            // The extension silently finalizes before broadcasting; refuse
            // the ambiguous combination instead of guessing.
            return Err(unsupported(ProviderType::Orange, "broadcast-without-finalize"));
        }
        let psbt_base64 = hex_psbt_to_base64(psbt_hex)?;
        let reply = self
            .core
            .call(
                "sign_psbt",
                "signPsbt",
                json!({ "psbt": psbt_base64, "finalize": finalize, "broadcast": broadcast }),
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

    async fn send_btc(&self, to: &str, amount_sats: u64) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call(
                "send_btc",
                "sendTransfer",
                json!({ "recipients": [{ "address": to, "amount": amount_sats }] }),
            )
            .await?;
        text_reply(&reply, &["txid", "txId"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected send reply: {}", reply))
        })
    }
}

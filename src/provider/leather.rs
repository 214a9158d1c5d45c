//! Leather wallet adapter.
//!
//! RPC-shaped replies under a `result` envelope; balance arrives as a
//! BTC-denominated decimal string; no programmatic network switching and
//! no broadcast-on-sign, so callers push signed transactions explicitly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{unsupported, ConnectorError};
use crate::extension::ExtensionHost;
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::{
    balance_to_sats, str_field, text_reply, AdapterCore, ProviderType, SignPsbtReply,
    WalletIdentity, WalletProvider,
};
use crate::network::NetworkType;

pub struct LeatherAdapter {
    core: AdapterCore,
}

impl LeatherAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Leather, store, persistence, host),
        }
    }
}

/// Unwrap Leather's `{ result: ... }` envelope when present.
fn unwrap_result(reply: &Value) -> &Value {
    reply.get("result").unwrap_or(reply)
}

#[async_trait]
impl WalletProvider for LeatherAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Leather
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
            .call("connect", "getAddresses", Value::Null)
            .await?;
        let items = unwrap_result(&reply)
            .get("addresses")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ConnectorError::Extension(format!("unexpected addresses reply: {}", reply))
            })?;

        // Taproot entry is the ordinals address, segwit the payment one
        let mut identity = WalletIdentity::default();
        for item in items {
            let address = str_field(item, "address").unwrap_or_default();
            let public_key = str_field(item, "publicKey").unwrap_or_default();
            match item.get("type").and_then(Value::as_str) {
                Some("p2tr") => {
                    identity.address = address.clone();
                    identity.public_key = public_key;
                }
                Some("p2wpkh") => {
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
                "wallet returned no addresses".to_string(),
            ));
        }
        self.core.write_identity(&identity);
        Ok(identity)
    }

    async fn disconnect(&self) {
        self.core.clear_fields();
    }

    async fn get_network(&self) -> Result<NetworkType, ConnectorError> {
        Err(unsupported(ProviderType::Leather, "get_network"))
    }

    async fn get_balance(&self) -> Result<u64, ConnectorError> {
        let reply = self
            .core
            .call("get_balance", "getBalance", Value::Null)
            .await?;
        // Leather reports a BTC decimal string
        balance_to_sats(unwrap_result(&reply))
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.connect().await?.accounts)
    }

    async fn sign_message(&self, message: &str, _address: &str) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call(
                "sign_message",
                "signMessage",
                json!({ "message": message, "paymentType": "p2tr" }),
            )
            .await?;
        text_reply(unwrap_result(&reply), &["signature"]).ok_or_else(|| {
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
            return Err(unsupported(ProviderType::Leather, "broadcast-on-sign"));
        }
        let reply = self
            .core
            .call(
                "sign_psbt",
                "signPsbt",
                json!({ "hex": psbt_hex, "broadcast": false }),
            )
            .await?;
        Ok(SignPsbtReply::from_value(unwrap_result(&reply)))
    }

    async fn send_btc(&self, to: &str, amount_sats: u64) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call(
                "send_btc",
                "sendTransfer",
                json!({ "recipients": [{ "address": to, "amount": amount_sats.to_string() }] }),
            )
            .await?;
        text_reply(unwrap_result(&reply), &["txid", "txId"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected send reply: {}", reply))
        })
    }
}

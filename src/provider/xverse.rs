//! Xverse wallet adapter.
//!
//! Sats-connect style API: separate ordinals and payment addresses, PSBTs
//! exchanged in base64, native broadcast-on-sign support.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::psbt::Psbt;
use serde_json::{json, Value};

use crate::error::ConnectorError;
use crate::extension::ExtensionHost;
use crate::network::{self, NetworkType};
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::{
    balance_to_sats, str_field, text_reply, AdapterCore, ProviderType, SignPsbtReply,
    WalletIdentity, WalletProvider,
};

pub struct XverseAdapter {
    core: AdapterCore,
}

impl XverseAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Xverse, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for XverseAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Xverse
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
        let native = text_reply(&reply, &["name"])
            .or_else(|| reply.get("bitcoin").and_then(|b| str_field(b, "name")))
            .ok_or_else(|| {
                ConnectorError::Extension(format!("unrecognized network reply: {}", reply))
            })?;
        Ok(network::from_provider_network(&native, ProviderType::Xverse))
    }

    async fn switch_network(&self, network_type: NetworkType) -> Result<NetworkType, ConnectorError> {
        let native = network::to_provider_network(network_type, ProviderType::Xverse);
        self.core
            .call("switch_network", "changeNetwork", json!({ "name": native }))
            .await?;
        Ok(network::from_provider_network(native, ProviderType::Xverse))
    }

    async fn get_balance(&self) -> Result<u64, ConnectorError> {
        let reply = self
            .core
            .call("get_balance", "getBalance", Value::Null)
            .await?;
        balance_to_sats(&reply)
    }

    async fn get_public_key(&self) -> Result<String, ConnectorError> {
        Ok(self.core.store().snapshot().public_key)
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
        // Xverse answers in base64; callers work in hex
        if normalized.signed_psbt_hex.is_none() {
            if let Some(b64) = normalized.signed_psbt_base64.as_deref() {
                normalized.signed_psbt_hex = Some(base64_psbt_to_hex(b64)?);
            }
        } else if let Some(payload) = normalized.signed_psbt_hex.clone() {
            // The `psbt` key may itself carry base64
            if hex::decode(&payload).is_err() {
                normalized.signed_psbt_hex = Some(base64_psbt_to_hex(&payload)?);
                normalized.signed_psbt_base64 = Some(payload);
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

/// Parse a sats-connect address list into identity fields: the ordinals
/// entry carries the primary address, the payment entry the funding one.
pub(super) fn parse_purpose_addresses(reply: &Value) -> Result<WalletIdentity, ConnectorError> {
    let items = reply
        .get("addresses")
        .and_then(Value::as_array)
        .or_else(|| reply.as_array())
        .ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected addresses reply: {}", reply))
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
    if identity.address.is_empty() && identity.payment_address.is_empty() {
        return Err(ConnectorError::Extension(
            "wallet returned no usable addresses".to_string(),
        ));
    }
    Ok(identity)
}

pub(super) fn hex_psbt_to_base64(psbt_hex: &str) -> Result<String, ConnectorError> {
    let bytes = hex::decode(psbt_hex)
        .map_err(|e| ConnectorError::InvalidInput(format!("psbt not hex: {}", e)))?;
    let psbt = Psbt::deserialize(&bytes)
        .map_err(|e| ConnectorError::InvalidInput(format!("invalid psbt: {}", e)))?;
    Ok(psbt.to_string())
}

pub(super) fn base64_psbt_to_hex(psbt_base64: &str) -> Result<String, ConnectorError> {
    let psbt = Psbt::from_str(psbt_base64)
        .map_err(|e| ConnectorError::Extension(format!("invalid signed psbt: {}", e)))?;
    Ok(psbt.serialize_hex())
}

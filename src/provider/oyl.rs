//! Oyl wallet adapter.
//!
//! Addresses arrive keyed by script kind (taproot + native segwit); PSBTs
//! are exchanged in hex with explicit finalize/broadcast flags.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ConnectorError;
use crate::extension::ExtensionHost;
use crate::network::NetworkType;
use crate::persist::SessionPersistence;
use crate::store::ConnectorStore;

use super::{
    balance_to_sats, str_field, text_reply, AdapterCore, ProviderType, SignPsbtReply,
    WalletIdentity, WalletProvider,
};
use crate::error::unsupported;

pub struct OylAdapter {
    core: AdapterCore,
}

impl OylAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Oyl, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for OylAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Oyl
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
        let taproot = reply.get("taproot").cloned().unwrap_or(Value::Null);
        let segwit = reply.get("nativeSegwit").cloned().unwrap_or(Value::Null);
        let address = str_field(&taproot, "address").ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected addresses reply: {}", reply))
        })?;
        let payment_address = str_field(&segwit, "address").unwrap_or_else(|| address.clone());
        let identity = WalletIdentity {
            accounts: vec![address.clone(), payment_address.clone()],
            address,
            payment_address,
            public_key: str_field(&taproot, "pubkey").unwrap_or_default(),
            payment_public_key: str_field(&segwit, "pubkey").unwrap_or_default(),
        };
        self.core.write_identity(&identity);
        Ok(identity)
    }

    async fn disconnect(&self) {
        self.core.clear_fields();
    }

    async fn get_network(&self) -> Result<NetworkType, ConnectorError> {
        Err(unsupported(ProviderType::Oyl, "get_network"))
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
        let reply = self
            .core
            .call(
                "sign_psbt",
                "signPsbt",
                json!({ "psbt": psbt_hex, "finalize": finalize, "broadcast": broadcast }),
            )
            .await?;
        Ok(SignPsbtReply::from_value(&reply))
    }

    async fn push_psbt(&self, signed_hex: &str) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call("push_psbt", "pushPsbt", json!({ "psbt": signed_hex }))
            .await?;
        text_reply(&reply, &["txid", "txId"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected push reply: {}", reply))
        })
    }

    async fn send_btc(&self, to: &str, amount_sats: u64) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call(
                "send_btc",
                "sendBitcoin",
                json!({ "to": to, "amount": amount_sats }),
            )
            .await?;
        text_reply(&reply, &["txid", "txId"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected send reply: {}", reply))
        })
    }
}

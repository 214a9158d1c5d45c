//! OKX wallet adapter.
//!
//! Two native networks (livenet/testnet); connect answers with the
//! address and key in one call.

use std::sync::Arc;

use async_trait::async_trait;
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

pub struct OkxAdapter {
    core: AdapterCore,
}

impl OkxAdapter {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            core: AdapterCore::new(ProviderType::Okx, store, persistence, host),
        }
    }
}

#[async_trait]
impl WalletProvider for OkxAdapter {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Okx
    }

    async fn initialize(&self) -> Result<(), ConnectorError> {
        self.core.initialize()
    }

    async fn dispose(&self) {
        self.core.dispose();
    }

    async fn connect(&self) -> Result<WalletIdentity, ConnectorError> {
        let reply = self.core.call("connect", "connect", Value::Null).await?;
        let address = str_field(&reply, "address").ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected connect reply: {}", reply))
        })?;
        let public_key = str_field(&reply, "publicKey").unwrap_or_default();
        let identity = WalletIdentity {
            address: address.clone(),
            payment_address: address.clone(),
            public_key: public_key.clone(),
            payment_public_key: public_key,
            accounts: vec![address],
        };
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
        let native = text_reply(&reply, &["network"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unrecognized network reply: {}", reply))
        })?;
        Ok(network::from_provider_network(&native, ProviderType::Okx))
    }

    async fn switch_network(&self, network_type: NetworkType) -> Result<NetworkType, ConnectorError> {
        let native = network::to_provider_network(network_type, ProviderType::Okx);
        self.core
            .call("switch_network", "switchNetwork", json!([native]))
            .await?;
        Ok(network::from_provider_network(native, ProviderType::Okx))
    }

    async fn get_balance(&self) -> Result<u64, ConnectorError> {
        let reply = self
            .core
            .call("get_balance", "getBalance", Value::Null)
            .await?;
        balance_to_sats(&reply)
    }

    async fn get_public_key(&self) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call("get_public_key", "getPublicKey", Value::Null)
            .await?;
        reply.as_str().map(str::to_string).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected public key reply: {}", reply))
        })
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        let reply = self
            .core
            .call("request_accounts", "requestAccounts", Value::Null)
            .await?;
        super::unisat::parse_account_list(&reply)
    }

    async fn sign_message(&self, message: &str, _address: &str) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call("sign_message", "signMessage", json!({ "message": message }))
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
                json!({ "psbtHex": psbt_hex, "options": { "autoFinalized": finalize } }),
            )
            .await?;
        let mut reply = SignPsbtReply::from_value(&reply);
        if broadcast && reply.txid.is_none() {
            let signed = reply.signed_psbt_hex.clone().ok_or_else(|| {
                ConnectorError::Extension("signing reply carried no payload".to_string())
            })?;
            reply.txid = Some(self.push_psbt(&signed).await?);
        }
        Ok(reply)
    }

    async fn push_psbt(&self, signed_hex: &str) -> Result<String, ConnectorError> {
        let reply = self
            .core
            .call("push_psbt", "pushPsbt", json!({ "psbtHex": signed_hex }))
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
                json!({ "toAddress": to, "satoshis": amount_sats }),
            )
            .await?;
        text_reply(&reply, &["txid", "txId"]).ok_or_else(|| {
            ConnectorError::Extension(format!("unexpected send reply: {}", reply))
        })
    }
}

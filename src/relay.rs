//! Optional transaction-relay endpoint client.
//!
//! Used as the broadcast path for providers that cannot push a signed
//! transaction themselves, and as the consumer of `sign_message` output
//! for session authorization.

use serde_json::json;

use crate::error::ConnectorError;

pub struct TransactionRelay {
    base_url: String,
    client: reqwest::Client,
}

impl TransactionRelay {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Broadcast a signed transaction, returning the transaction id.
    pub async fn broadcast(&self, tx_hex: &str) -> Result<String, ConnectorError> {
        log::debug!("broadcasting transaction via {}/tx", self.base_url);

        let response = self
            .client
            .post(format!("{}/tx", self.base_url))
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| ConnectorError::Extension(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ConnectorError::Extension(format!(
                "broadcast failed: {}",
                error_text
            )));
        }

        let txid = response
            .text()
            .await
            .map_err(|e| ConnectorError::Extension(e.to_string()))?;

        Ok(txid.trim().to_string())
    }

    /// Exchange a signed message for an authorization token, when the
    /// endpoint issues one.
    pub async fn authorize(
        &self,
        message: &str,
        signature: &str,
        address: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let response = self
            .client
            .post(format!("{}/authorize", self.base_url))
            .json(&json!({
                "message": message,
                "signature": signature,
                "address": address,
            }))
            .send()
            .await
            .map_err(|e| ConnectorError::Extension(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ConnectorError::Extension(format!(
                "authorization failed: {}",
                error_text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::Extension(e.to_string()))?;
        Ok(body
            .get("token")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}

//! PSBT lifecycle: build, sign, finalize, broadcast.
//!
//! One transaction is in flight at a time. Its stage only moves forward
//! (`Unsigned → Signed → Finalized → Broadcast`, with signed→broadcast
//! allowed when the provider signs and broadcasts atomically), and any
//! stage can drop to discarded: a network change, a provider disconnect,
//! or an explicit reset throws the transaction away. Responses that
//! arrive after a discard are dropped on a generation check instead of
//! being applied to stale state.

pub mod builder;

use std::fmt;
use std::sync::Mutex;

use bitcoin::psbt::Psbt;

pub use builder::{PsbtBuilder, Utxo, DUST_LIMIT_SATS};

use crate::error::ConnectorError;
use crate::provider::SignPsbtReply;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PsbtStage {
    Unsigned,
    Signed,
    Finalized,
    Broadcast,
}

impl fmt::Display for PsbtStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PsbtStage::Unsigned => "unsigned",
            PsbtStage::Signed => "signed",
            PsbtStage::Finalized => "finalized",
            PsbtStage::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

/// One in-flight transaction. Never persisted across a reload.
#[derive(Debug, Clone, PartialEq)]
pub struct PsbtTransaction {
    pub unsigned_payload: Vec<u8>,
    pub stage: PsbtStage,
    pub signed_payload: Option<Vec<u8>>,
    pub signed_base64: Option<String>,
    pub transaction_id: Option<String>,
}

impl PsbtTransaction {
    fn new(unsigned_payload: Vec<u8>) -> Self {
        Self {
            unsigned_payload,
            stage: PsbtStage::Unsigned,
            signed_payload: None,
            signed_base64: None,
            transaction_id: None,
        }
    }

    pub fn unsigned_hex(&self) -> String {
        hex::encode(&self.unsigned_payload)
    }

    pub fn signed_hex(&self) -> Option<String> {
        self.signed_payload.as_deref().map(hex::encode)
    }
}

/// Result of installing a freshly built PSBT.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// False when the payload was identical to the in-flight transaction
    /// and nothing changed.
    pub created: bool,
    pub unsigned_psbt_hex: String,
}

struct LifecycleInner {
    current: Option<PsbtTransaction>,
    generation: u64,
}

/// The transaction lifecycle state machine.
///
/// The generation counter is the effective cancellation mechanism: every
/// discard or rebuild bumps it, and completions carrying a stale
/// generation are rejected instead of applied.
pub struct TxLifecycle {
    inner: Mutex<LifecycleInner>,
}

impl TxLifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LifecycleInner {
                current: None,
                generation: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> Option<PsbtTransaction> {
        self.inner.lock().expect("lifecycle poisoned").current.clone()
    }

    /// Install a freshly built unsigned PSBT.
    ///
    /// An identical unsigned payload leaves the in-flight transaction
    /// untouched, so UTXO polls do not reset signing progress.
    pub fn install(&self, psbt: &Psbt) -> BuildOutcome {
        let payload = psbt.serialize();
        let mut inner = self.inner.lock().expect("lifecycle poisoned");
        if let Some(current) = inner.current.as_ref() {
            if current.unsigned_payload == payload {
                return BuildOutcome {
                    created: false,
                    unsigned_psbt_hex: current.unsigned_hex(),
                };
            }
        }
        inner.generation += 1;
        let tx = PsbtTransaction::new(payload);
        let unsigned_psbt_hex = tx.unsigned_hex();
        inner.current = Some(tx);
        BuildOutcome {
            created: true,
            unsigned_psbt_hex,
        }
    }

    /// Capture what a signing call needs: the generation to validate the
    /// completion against and the unsigned payload hex.
    pub fn begin_sign(&self) -> Result<(u64, String), ConnectorError> {
        let inner = self.inner.lock().expect("lifecycle poisoned");
        let current = inner.current.as_ref().ok_or_else(|| {
            ConnectorError::InvalidInput("no transaction built to sign".to_string())
        })?;
        if current.stage != PsbtStage::Unsigned {
            return Err(ConnectorError::InvalidInput(format!(
                "transaction already {}",
                current.stage
            )));
        }
        Ok((inner.generation, current.unsigned_hex()))
    }

    /// Apply a signing reply, unless the transaction was discarded while
    /// the call was in flight.
    pub fn complete_sign(
        &self,
        generation: u64,
        reply: &SignPsbtReply,
        finalize: bool,
    ) -> Result<PsbtTransaction, ConnectorError> {
        let mut inner = self.inner.lock().expect("lifecycle poisoned");
        if inner.generation != generation {
            return Err(ConnectorError::InvalidInput(
                "transaction was discarded while signing".to_string(),
            ));
        }
        let mut current = inner.current.take().ok_or_else(|| {
            ConnectorError::InvalidInput("transaction was discarded while signing".to_string())
        })?;

        if let Some(hex_payload) = reply.signed_psbt_hex.as_deref() {
            match hex::decode(hex_payload) {
                Ok(bytes) => current.signed_payload = Some(bytes),
                Err(e) => {
                    // Malformed reply: discard rather than keep half-applied state
                    inner.generation += 1;
                    return Err(ConnectorError::Extension(format!(
                        "signed payload not hex: {}",
                        e
                    )));
                }
            }
        }
        current.signed_base64 = reply.signed_psbt_base64.clone();

        if let Some(txid) = reply.txid.as_deref() {
            // The provider signed and broadcast atomically.
            current.stage = PsbtStage::Broadcast;
            current.transaction_id = Some(txid.to_string());
        } else if current.signed_payload.is_none() {
            inner.generation += 1;
            return Err(ConnectorError::Extension(
                "signing reply carried no payload".to_string(),
            ));
        } else {
            current.stage = if finalize {
                PsbtStage::Finalized
            } else {
                PsbtStage::Signed
            };
        }
        inner.current = Some(current.clone());
        Ok(current)
    }

    /// Capture what a push needs: generation plus the signed payload hex.
    pub fn begin_push(&self) -> Result<(u64, String), ConnectorError> {
        let inner = self.inner.lock().expect("lifecycle poisoned");
        let current = inner.current.as_ref().ok_or_else(|| {
            ConnectorError::InvalidInput("no in-flight transaction to push".to_string())
        })?;
        match current.stage {
            PsbtStage::Unsigned => Err(ConnectorError::InvalidInput(
                "transaction is not signed yet".to_string(),
            )),
            PsbtStage::Broadcast => Err(ConnectorError::InvalidInput(
                "transaction already broadcast".to_string(),
            )),
            PsbtStage::Signed | PsbtStage::Finalized => {
                let signed_hex = current.signed_hex().ok_or_else(|| {
                    ConnectorError::InvalidInput("no signed payload to push".to_string())
                })?;
                Ok((inner.generation, signed_hex))
            }
        }
    }

    /// Record a successful broadcast.
    pub fn complete_push(&self, generation: u64, txid: &str) -> Result<(), ConnectorError> {
        let mut inner = self.inner.lock().expect("lifecycle poisoned");
        if inner.generation != generation {
            return Err(ConnectorError::InvalidInput(
                "transaction was discarded while broadcasting".to_string(),
            ));
        }
        let current = inner.current.as_mut().ok_or_else(|| {
            ConnectorError::InvalidInput("transaction was discarded while broadcasting".to_string())
        })?;
        current.stage = PsbtStage::Broadcast;
        current.transaction_id = Some(txid.to_string());
        Ok(())
    }

    /// A failed push leaves nothing dangling in a stale signed state: the
    /// transaction is discarded and the caller must rebuild.
    pub fn fail_push(&self) {
        self.discard("push failed");
    }

    pub fn discard(&self, reason: &str) {
        let mut inner = self.inner.lock().expect("lifecycle poisoned");
        if inner.current.take().is_some() {
            log::debug!("discarding in-flight transaction: {}", reason);
        }
        inner.generation += 1;
    }
}

impl Default for TxLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkType;

    const RECIPIENT: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";

    fn build_psbt(amount: u64) -> Psbt {
        let builder = PsbtBuilder::new(NetworkType::Regtest);
        let utxos = vec![Utxo {
            txid: "1111111111111111111111111111111111111111111111111111111111111111".into(),
            vout: 0,
            value_sats: 60_000,
            script_pubkey: "0014751e76e8199196d454941c45d1b3a323f1433bd6".into(),
        }];
        builder
            .build_send(&utxos, RECIPIENT, amount, RECIPIENT, 2)
            .unwrap()
    }

    fn signed_reply() -> SignPsbtReply {
        SignPsbtReply {
            signed_psbt_hex: Some("deadbeef".into()),
            ..Default::default()
        }
    }

    #[test]
    fn rebuild_with_identical_payload_creates_nothing() {
        let lifecycle = TxLifecycle::new();
        let psbt = build_psbt(1_500);
        assert!(lifecycle.install(&psbt).created);
        assert!(!lifecycle.install(&psbt).created);
        let other = build_psbt(2_000);
        assert!(lifecycle.install(&other).created);
    }

    #[test]
    fn sign_without_finalize_reaches_signed() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        let tx = lifecycle
            .complete_sign(generation, &signed_reply(), false)
            .unwrap();
        assert_eq!(tx.stage, PsbtStage::Signed);
        assert!(tx.transaction_id.is_none());
    }

    #[test]
    fn finalize_without_broadcast_reaches_finalized() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        let tx = lifecycle
            .complete_sign(generation, &signed_reply(), true)
            .unwrap();
        assert_eq!(tx.stage, PsbtStage::Finalized);
        assert!(tx.signed_payload.is_some());
        assert!(tx.transaction_id.is_none());
    }

    #[test]
    fn reply_with_txid_short_circuits_to_broadcast() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        let reply = SignPsbtReply {
            txid: Some("deadbeef00".into()),
            ..Default::default()
        };
        let tx = lifecycle.complete_sign(generation, &reply, true).unwrap();
        assert_eq!(tx.stage, PsbtStage::Broadcast);
        assert_eq!(tx.transaction_id.as_deref(), Some("deadbeef00"));
    }

    #[test]
    fn push_completes_the_lifecycle() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        lifecycle
            .complete_sign(generation, &signed_reply(), true)
            .unwrap();
        let (generation, signed_hex) = lifecycle.begin_push().unwrap();
        assert_eq!(signed_hex, "deadbeef");
        lifecycle.complete_push(generation, "cafebabe").unwrap();
        let tx = lifecycle.snapshot().unwrap();
        assert_eq!(tx.stage, PsbtStage::Broadcast);
        assert_eq!(tx.transaction_id.as_deref(), Some("cafebabe"));
    }

    #[test]
    fn discard_while_signing_drops_the_late_reply() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        lifecycle.discard("network change");
        let err = lifecycle
            .complete_sign(generation, &signed_reply(), false)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidInput(_)));
        assert!(lifecycle.snapshot().is_none());
    }

    #[test]
    fn push_after_discard_is_state_invalid() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        lifecycle
            .complete_sign(generation, &signed_reply(), false)
            .unwrap();
        lifecycle.discard("network change");
        let err = lifecycle.begin_push().unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidInput(_)));
    }

    #[test]
    fn failed_push_discards_instead_of_leaving_stale_signed_state() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        let (generation, _) = lifecycle.begin_sign().unwrap();
        lifecycle
            .complete_sign(generation, &signed_reply(), true)
            .unwrap();
        lifecycle.fail_push();
        assert!(lifecycle.snapshot().is_none());
        assert!(lifecycle.begin_push().is_err());
    }

    #[test]
    fn push_before_sign_is_rejected() {
        let lifecycle = TxLifecycle::new();
        lifecycle.install(&build_psbt(1_500));
        assert!(lifecycle.begin_push().is_err());
    }
}

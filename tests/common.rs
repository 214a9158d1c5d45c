/// Common test utilities for connector integration tests
///
/// Provides a scriptable stub extension host so tests can exercise the
/// full connect/sign/push flows without a browser:
/// - canned replies and scripted failures per extension method
/// - call counting for "no extension round-trip" assertions
/// - an event channel mimicking wallet-originated notifications

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use satlink::error::PersistError;
use satlink::persist::{MemoryStore, SessionStore};
use satlink::provider::ProviderType;
use satlink::{
    ConnectorConfig, ExtensionError, ExtensionEvent, ExtensionHandle, ExtensionHost, NetworkType,
    Utxo, WalletConnector,
};

// Known-good mainnet addresses (BIP-341/BIP-173 test vectors)
pub const TAPROOT_ADDRESS: &str =
    "bc1p5d7rjq7g6rdk2yhzks9smlaqtedr4dekq08ge8ztwac72sfr9rusxg3297";
pub const SEGWIT_ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
pub const RECIPIENT_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

pub const ORDINALS_PUBKEY: &str =
    "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc";
pub const PAYMENT_PUBKEY: &str =
    "03b31347e5b8bd1e2ff1a7ea9a1b1f09e5de46a29b2d4c64ab8f35ef8c2e971f0a";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn utxo_snapshot() -> Vec<Utxo> {
    vec![Utxo {
        txid: "1111111111111111111111111111111111111111111111111111111111111111".to_string(),
        vout: 0,
        value_sats: 60_000,
        script_pubkey: "5120a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c"
            .to_string(),
    }]
}

/// One scriptable fake wallet extension.
pub struct StubExtension {
    replies: Mutex<HashMap<String, Result<Value, ExtensionError>>>,
    calls: Mutex<Vec<String>>,
    delay_ms: AtomicU64,
    events: broadcast::Sender<ExtensionEvent>,
}

impl StubExtension {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay_ms: AtomicU64::new(0),
            events,
        })
    }

    pub fn reply(&self, method: &str, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(method.to_string(), Ok(value));
    }

    pub fn fail(&self, method: &str, error: ExtensionError) {
        self.replies
            .lock()
            .unwrap()
            .insert(method.to_string(), Err(error));
    }

    /// Delay every call, to hold a request pending across awaits.
    pub fn set_delay_ms(&self, delay: u64) {
        self.delay_ms.store(delay, Ordering::Relaxed);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn emit(&self, event: ExtensionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ExtensionHandle for StubExtension {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, ExtensionError> {
        self.calls.lock().unwrap().push(method.to_string());
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
        }
        match self.replies.lock().unwrap().get(method) {
            Some(reply) => reply.clone(),
            None => Err(ExtensionError::MissingMethod(method.to_string())),
        }
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ExtensionEvent>> {
        Some(self.events.subscribe())
    }
}

/// Host with a mutable set of installed stub extensions.
pub struct StubHost {
    extensions: Mutex<HashMap<ProviderType, Arc<StubExtension>>>,
}

impl StubHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            extensions: Mutex::new(HashMap::new()),
        })
    }

    pub fn install(&self, provider: ProviderType) -> Arc<StubExtension> {
        let extension = StubExtension::new();
        self.extensions
            .lock()
            .unwrap()
            .insert(provider, extension.clone());
        extension
    }

    pub fn uninstall(&self, provider: ProviderType) {
        self.extensions.lock().unwrap().remove(&provider);
    }
}

impl ExtensionHost for StubHost {
    fn probe(&self, provider: ProviderType) -> bool {
        self.extensions.lock().unwrap().contains_key(&provider)
    }

    fn handle(&self, provider: ProviderType) -> Option<Arc<dyn ExtensionHandle>> {
        self.extensions
            .lock()
            .unwrap()
            .get(&provider)
            .map(|e| e.clone() as Arc<dyn ExtensionHandle>)
    }
}

/// Session store shareable between connector instances, to exercise
/// reload-style rehydration.
#[derive(Clone)]
pub struct SharedStore(pub Arc<MemoryStore>);

impl SharedStore {
    pub fn new() -> Self {
        Self(Arc::new(MemoryStore::new()))
    }
}

impl SessionStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.0.remove(key)
    }
}

/// Test environment: stub host + connector over an in-memory session store.
pub struct TestEnvironment {
    pub host: Arc<StubHost>,
    pub connector: WalletConnector,
    pub session: SharedStore,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_network(NetworkType::Mainnet)
    }

    pub fn with_network(network: NetworkType) -> Self {
        init_logging();
        let host = StubHost::new();
        let session = SharedStore::new();
        let connector = WalletConnector::with_config(
            ConnectorConfig::with_network(network),
            host.clone(),
            Box::new(session.clone()),
        );
        Self {
            host,
            connector,
            session,
        }
    }

    /// A second connector over the same session store, as after a reload.
    pub fn reopen(&self) -> WalletConnector {
        WalletConnector::with_config(
            ConnectorConfig::default(),
            self.host.clone(),
            Box::new(self.session.clone()),
        )
    }

    /// Install a unisat stub with the standard reply set.
    pub fn install_unisat(&self, balance_sats: u64) -> Arc<StubExtension> {
        let stub = self.host.install(ProviderType::Unisat);
        stub.reply("requestAccounts", json!([TAPROOT_ADDRESS]));
        stub.reply("getPublicKey", json!(ORDINALS_PUBKEY));
        stub.reply("getChain", json!({ "enum": "BITCOIN_MAINNET" }));
        stub.reply(
            "getBalance",
            json!({ "confirmed": balance_sats, "total": balance_sats }),
        );
        stub.reply("signMessage", json!("unisat-signature"));
        stub.reply("signPsbt", json!("deadbeef"));
        stub.reply("pushPsbt", json!("deadbeef8badf00d"));
        stub.reply("sendBitcoin", json!("f00dfeed"));
        stub
    }

    pub fn install_xverse(&self, balance_sats: u64) -> Arc<StubExtension> {
        let stub = self.host.install(ProviderType::Xverse);
        stub.reply(
            "getAccounts",
            json!({ "addresses": [
                { "address": TAPROOT_ADDRESS, "publicKey": ORDINALS_PUBKEY, "purpose": "ordinals" },
                { "address": SEGWIT_ADDRESS, "publicKey": PAYMENT_PUBKEY, "purpose": "payment" },
            ]}),
        );
        stub.reply("getNetwork", json!({ "name": "Mainnet" }));
        stub.reply("changeNetwork", Value::Null);
        stub.reply(
            "getBalance",
            json!({ "confirmed": balance_sats.to_string() }),
        );
        stub.reply("signMessage", json!({ "signature": "xverse-signature" }));
        stub.reply("signPsbt", json!({ "txid": "cafef00d" }));
        stub.reply("sendTransfer", json!({ "txid": "feedface" }));
        stub
    }

    pub fn install_leather(&self) -> Arc<StubExtension> {
        let stub = self.host.install(ProviderType::Leather);
        stub.reply(
            "getAddresses",
            json!({ "result": { "addresses": [
                { "address": TAPROOT_ADDRESS, "publicKey": ORDINALS_PUBKEY, "type": "p2tr" },
                { "address": SEGWIT_ADDRESS, "publicKey": PAYMENT_PUBKEY, "type": "p2wpkh" },
            ]}}),
        );
        stub.reply("getBalance", json!({ "result": "0.00123456" }));
        stub.reply(
            "signMessage",
            json!({ "result": { "signature": "leather-signature" } }),
        );
        stub.reply("signPsbt", json!({ "result": { "hex": "deadbeef" } }));
        stub.reply("sendTransfer", json!({ "result": { "txid": "feedface" } }));
        stub
    }

    pub fn install_orange(&self) -> Arc<StubExtension> {
        let stub = self.host.install(ProviderType::Orange);
        stub.reply(
            "getAccounts",
            json!({ "addresses": [
                { "address": TAPROOT_ADDRESS, "publicKey": ORDINALS_PUBKEY, "purpose": "ordinals" },
                { "address": SEGWIT_ADDRESS, "publicKey": PAYMENT_PUBKEY, "purpose": "payment" },
            ]}),
        );
        stub.reply("getNetwork", json!({ "name": "Mainnet" }));
        stub.reply("changeNetwork", Value::Null);
        stub.reply("getBalance", json!({ "confirmed": 80_000 }));
        stub
    }
}

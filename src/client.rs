//! Connection state machine and operation orchestration.
//!
//! The [`WalletConnector`] is the single writer allowed to transition the
//! `connected`/`provider` pair. It serializes concurrent connect attempts
//! through the store's synchronous connect guard, routes every operation
//! through the active adapter, and acts as the single-threaded dispatcher
//! for asynchronous extension events (account changes, network changes,
//! wallet-initiated disconnects).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use bitcoin::psbt::Psbt;
use tokio::task::JoinHandle;

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::extension::{ExtensionEvent, ExtensionHost};
use crate::network::{self, NetworkType};
use crate::persist::{FileStore, SessionPersistence, SessionSnapshot, SessionStore};
use crate::provider::{ProviderRegistry, ProviderType, WalletProvider};
use crate::psbt::{BuildOutcome, PsbtBuilder, PsbtTransaction, TxLifecycle, Utxo};
use crate::relay::TransactionRelay;
use crate::store::{ConnectionState, ConnectorStore, StateUpdate};

pub struct WalletConnector {
    store: Arc<ConnectorStore>,
    persistence: Arc<SessionPersistence>,
    registry: Arc<ProviderRegistry>,
    lifecycle: Arc<TxLifecycle>,
    network: Arc<RwLock<NetworkType>>,
    relay: Option<TransactionRelay>,
    event_tasks: Mutex<Vec<JoinHandle<()>>>,
    event_wired: Mutex<HashSet<ProviderType>>,
}

impl WalletConnector {
    /// Build a connector from environment configuration with the default
    /// file-backed session store.
    pub fn new(host: Arc<dyn ExtensionHost>) -> Self {
        let config = ConnectorConfig::from_env();
        let session_store = Box::new(FileStore::new_with_base_dir(
            config.storage_dir.clone(),
            "session",
        ));
        Self::with_config(config, host, session_store)
    }

    /// Build a connector with explicit configuration and session store
    /// (for testing).
    pub fn with_config(
        config: ConnectorConfig,
        host: Arc<dyn ExtensionHost>,
        session_store: Box<dyn SessionStore>,
    ) -> Self {
        let store = Arc::new(ConnectorStore::new());
        let persistence = Arc::new(SessionPersistence::new(
            session_store,
            config.storage_namespace.clone(),
        ));
        let registry = Arc::new(ProviderRegistry::new(
            store.clone(),
            persistence.clone(),
            host,
        ));
        let relay = config.relay_url.as_deref().map(TransactionRelay::new);
        Self {
            store,
            persistence,
            registry,
            lifecycle: Arc::new(TxLifecycle::new()),
            network: Arc::new(RwLock::new(config.network)),
            relay,
            event_tasks: Mutex::new(Vec::new()),
            event_wired: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<ConnectorStore> {
        &self.store
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.store.snapshot()
    }

    /// The canonical network active for this session.
    pub fn network(&self) -> NetworkType {
        *self.network.read().expect("network lock poisoned")
    }

    /// Startup: detect installed providers, rehydrate the last connected
    /// provider's persisted identity (provisionally, never `connected`),
    /// and wire its change notifications.
    pub async fn initialize(&self) -> Result<(), ConnectorError> {
        self.registry.detect();
        if let Some(last) = self.persistence.last_provider()? {
            let adapter = self.registry.adapter(last);
            adapter.initialize().await?;
            self.wire_events(last);
        }
        self.store.apply(StateUpdate {
            is_initializing: Some(false),
            ..Default::default()
        });
        log::info!("connector initialized");
        Ok(())
    }

    /// Re-run provider detection; called on a provider-announced signal.
    pub fn refresh_providers(&self) -> HashMap<ProviderType, bool> {
        self.registry.detect()
    }

    /// Connect to a provider. The connect-in-progress flag is taken
    /// synchronously before the first await, so a second concurrent
    /// attempt fails without reaching any extension.
    pub async fn connect(&self, provider: ProviderType) -> Result<(), ConnectorError> {
        let snapshot = self.store.snapshot();
        if snapshot.connected && snapshot.provider == Some(provider) {
            return Ok(());
        }
        if snapshot.connected {
            // Switching wallets: tear the previous session down first so
            // `connected` and `is_connecting` are never true together
            if let Some(previous) = snapshot.provider {
                self.registry.adapter(previous).dispose().await;
            }
            self.lifecycle.discard("switching providers");
            self.store.apply(StateUpdate {
                connected: Some(false),
                provider: Some(None),
                ..StateUpdate::cleared()
            });
        }
        if !self.store.try_begin_connect() {
            return Err(ConnectorError::InvalidInput(
                "a connect attempt is already in progress".to_string(),
            ));
        }
        let result = self.connect_inner(provider).await;
        if result.is_err() {
            // Rejection or failure leaves everything but the guard as it was
            self.store.apply(StateUpdate {
                is_connecting: Some(false),
                ..Default::default()
            });
        }
        result
    }

    async fn connect_inner(&self, provider: ProviderType) -> Result<(), ConnectorError> {
        if !self.registry.host().probe(provider) {
            return Err(ConnectorError::NotInstalled(provider));
        }

        let adapter = self.registry.adapter(provider);
        adapter.initialize().await?;
        let identity = adapter.connect().await?;

        self.store.apply(StateUpdate {
            provider: Some(Some(provider)),
            connected: Some(true),
            is_connecting: Some(false),
            ..Default::default()
        });

        let balance = match adapter.get_balance().await {
            Ok(balance) => {
                self.store.apply(StateUpdate {
                    balance: Some(Some(balance)),
                    ..Default::default()
                });
                Some(balance)
            }
            Err(e) => {
                log::debug!("{}: balance unavailable after connect: {}", provider, e);
                None
            }
        };

        self.persistence.persist(
            provider,
            &SessionSnapshot {
                address: identity.address,
                payment_address: identity.payment_address,
                public_key: identity.public_key,
                payment_public_key: identity.payment_public_key,
                balance,
            },
        )?;
        self.persistence.set_last_provider(Some(provider))?;

        self.wire_events(provider);
        log::info!("connected to {}", provider);
        Ok(())
    }

    /// Disconnect the active provider, clearing its state and persisted
    /// session. Always succeeds locally.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        if let Some(provider) = self.store.snapshot().provider {
            let adapter = self.registry.adapter(provider);
            adapter.dispose().await;
            adapter.disconnect().await;
            self.persistence.clear(provider)?;
            self.persistence.set_last_provider(None)?;
            log::info!("disconnected from {}", provider);
        }
        self.lifecycle.discard("provider disconnected");
        self.store.apply(StateUpdate {
            connected: Some(false),
            is_connecting: Some(false),
            provider: Some(None),
            ..StateUpdate::cleared()
        });
        self.abort_event_tasks();
        Ok(())
    }

    /// Current network as the provider reports it; falls back to the
    /// session network for providers without a network query.
    pub async fn get_network(&self) -> Result<NetworkType, ConnectorError> {
        if let Ok((_, adapter)) = self.active_adapter() {
            match adapter.get_network().await {
                Ok(reported) => return Ok(reported),
                Err(ConnectorError::Unsupported { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.network())
    }

    /// Request a network change through the active provider. A rejected
    /// switch leaves the session network unchanged; a successful one
    /// discards any in-flight transaction.
    pub async fn switch_network(&self, requested: NetworkType) -> Result<NetworkType, ConnectorError> {
        if requested == self.network() {
            return Ok(requested);
        }
        let reached = match self.active_adapter() {
            Ok((provider, adapter)) => {
                let reached = adapter.switch_network(requested).await?;
                if reached != requested {
                    log::info!(
                        "{}: {} degraded to {}",
                        provider,
                        requested,
                        reached
                    );
                }
                reached
            }
            // No active provider: the session network is ours alone
            Err(_) => requested,
        };
        *self.network.write().expect("network lock poisoned") = reached;
        self.lifecycle.discard("network changed");
        Ok(reached)
    }

    /// Balance in satoshis for the active provider's payment address,
    /// written through to the store and the persisted session.
    pub async fn get_balance(&self) -> Result<u64, ConnectorError> {
        let (provider, adapter) = self.active_adapter()?;
        let balance = adapter.get_balance().await?;
        self.store.apply(StateUpdate {
            balance: Some(Some(balance)),
            ..Default::default()
        });
        let mut snapshot = self.persistence.restore(provider)?;
        snapshot.balance = Some(balance);
        self.persistence.persist(provider, &snapshot)?;
        Ok(balance)
    }

    pub async fn request_accounts(&self) -> Result<Vec<String>, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        adapter.request_accounts().await
    }

    pub async fn get_public_key(&self) -> Result<String, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        adapter.get_public_key().await
    }

    /// Sign a message with the given address, defaulting to the primary
    /// address. The signature encoding is provider-defined.
    pub async fn sign_message(
        &self,
        message: &str,
        address: Option<&str>,
    ) -> Result<String, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        let snapshot = self.store.snapshot();
        let address = address.unwrap_or(snapshot.address.as_str());
        adapter.sign_message(message, address).await
    }

    /// Sign a message and exchange it for an authorization token at the
    /// configured relay endpoint.
    pub async fn authorize(&self, message: &str) -> Result<Option<String>, ConnectorError> {
        let relay = self.relay.as_ref().ok_or_else(|| {
            ConnectorError::InvalidInput("no relay endpoint configured".to_string())
        })?;
        let signature = self.sign_message(message, None).await?;
        let address = self.store.snapshot().address;
        relay.authorize(message, &signature, &address).await
    }

    /// Single-output convenience send. Fails fast locally when the known
    /// balance cannot cover the amount plus the provider's dust/fee
    /// floor, without any extension round-trip.
    pub async fn send_btc(&self, to: &str, amount_sats: u64) -> Result<String, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        if let Some(balance) = self.store.snapshot().balance {
            let required = amount_sats + adapter.minimum_send_floor();
            if balance < required {
                return Err(ConnectorError::InsufficientFunds {
                    available: balance,
                    required,
                });
            }
        }
        adapter.send_btc(to, amount_sats).await
    }

    pub async fn inscribe(
        &self,
        content_base64: &str,
        mime_type: &str,
    ) -> Result<String, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        adapter.inscribe(content_base64, mime_type).await
    }

    /// Build (or keep) the in-flight unsigned PSBT from a UTXO snapshot.
    ///
    /// Rebuilding from an identical snapshot is a no-op so UTXO polling
    /// does not reset signing progress.
    pub fn build_transaction(
        &self,
        utxos: &[Utxo],
        recipient: &str,
        amount_sats: u64,
        fee_rate_sat_vb: u64,
    ) -> Result<BuildOutcome, ConnectorError> {
        let snapshot = self.store.snapshot();
        if !snapshot.connected {
            return Err(ConnectorError::InvalidInput(
                "no wallet connected".to_string(),
            ));
        }
        let change_address = if snapshot.payment_address.is_empty() {
            snapshot.address
        } else {
            snapshot.payment_address
        };
        let psbt = PsbtBuilder::new(self.network()).build_send(
            utxos,
            recipient,
            amount_sats,
            &change_address,
            fee_rate_sat_vb,
        )?;
        Ok(self.lifecycle.install(&psbt))
    }

    /// Sign the in-flight transaction through the active provider.
    ///
    /// `finalize` asks the provider to finalize the signed inputs;
    /// `broadcast` additionally submits the result. Broadcast without
    /// finalize is rejected as invalid before anything reaches the
    /// extension.
    pub async fn sign_transaction(
        &self,
        finalize: bool,
        broadcast: bool,
    ) -> Result<PsbtTransaction, ConnectorError> {
        if broadcast && !finalize {
            return Err(ConnectorError::InvalidInput(
                "broadcast without finalize is not a valid combination".to_string(),
            ));
        }
        let (_, adapter) = self.active_adapter()?;
        let (generation, unsigned_hex) = self.lifecycle.begin_sign()?;

        if broadcast {
            // Known-insufficient balance fails before the extension is asked
            if let Some(balance) = self.store.snapshot().balance {
                let spend = total_output_sats(&unsigned_hex)?;
                if balance < spend {
                    return Err(ConnectorError::InsufficientFunds {
                        available: balance,
                        required: spend,
                    });
                }
            }
        }

        let reply = adapter.sign_psbt(&unsigned_hex, finalize, broadcast).await?;
        self.lifecycle.complete_sign(generation, &reply, finalize)
    }

    /// Push the signed in-flight transaction. Providers without a push
    /// surface fall back to the configured relay endpoint. A failed push
    /// discards the transaction; the caller must rebuild.
    pub async fn push_transaction(&self) -> Result<String, ConnectorError> {
        let (_, adapter) = self.active_adapter()?;
        let (generation, signed_hex) = self.lifecycle.begin_push()?;

        let pushed = match adapter.push_psbt(&signed_hex).await {
            Ok(txid) => Ok(txid),
            Err(ConnectorError::Unsupported {
                provider,
                operation,
            }) => match self.relay.as_ref() {
                Some(relay) => {
                    let raw = raw_tx_hex(&signed_hex)?;
                    relay.broadcast(&raw).await
                }
                None => Err(ConnectorError::Unsupported {
                    provider,
                    operation,
                }),
            },
            Err(e) => Err(e),
        };

        match pushed {
            Ok(txid) => {
                self.lifecycle.complete_push(generation, &txid)?;
                Ok(txid)
            }
            Err(e) => {
                self.lifecycle.fail_push();
                Err(e)
            }
        }
    }

    /// Explicitly discard the in-flight transaction.
    pub fn reset_transaction(&self) {
        self.lifecycle.discard("explicit reset");
    }

    pub fn transaction(&self) -> Option<PsbtTransaction> {
        self.lifecycle.snapshot()
    }

    /// Deliver an extension event to the dispatcher. Exposed for host
    /// environments that route notifications themselves instead of
    /// through [`crate::extension::ExtensionHandle::subscribe_events`].
    pub fn dispatch_event(&self, provider: ProviderType, event: ExtensionEvent) {
        dispatch_extension_event(&self.store, &self.lifecycle, &self.network, provider, event);
    }

    fn active_adapter(
        &self,
    ) -> Result<(ProviderType, Arc<dyn WalletProvider>), ConnectorError> {
        let snapshot = self.store.snapshot();
        let provider = snapshot
            .provider
            .filter(|_| snapshot.connected)
            .ok_or_else(|| {
                ConnectorError::InvalidInput("no wallet connected".to_string())
            })?;
        Ok((provider, self.registry.adapter(provider)))
    }

    fn wire_events(&self, provider: ProviderType) {
        if !self
            .event_wired
            .lock()
            .expect("event set poisoned")
            .insert(provider)
        {
            return;
        }
        let Some(handle) = self.registry.host().handle(provider) else {
            return;
        };
        let Some(mut events) = handle.subscribe_events() else {
            return;
        };
        let store = self.store.clone();
        let lifecycle = self.lifecycle.clone();
        let network = self.network.clone();
        let task = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                dispatch_extension_event(&store, &lifecycle, &network, provider, event);
            }
        });
        self.event_tasks
            .lock()
            .expect("event task list poisoned")
            .push(task);
    }

    fn abort_event_tasks(&self) {
        let mut tasks = self.event_tasks.lock().expect("event task list poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
        self.event_wired.lock().expect("event set poisoned").clear();
    }
}

impl Drop for WalletConnector {
    fn drop(&mut self) {
        self.abort_event_tasks();
    }
}

/// Inbound extension events go through the same field-set batching as
/// adapter-originated writes. Network changes and wallet-initiated
/// disconnects invalidate any in-flight transaction immediately.
fn dispatch_extension_event(
    store: &ConnectorStore,
    lifecycle: &TxLifecycle,
    session_network: &RwLock<NetworkType>,
    provider: ProviderType,
    event: ExtensionEvent,
) {
    match event {
        ExtensionEvent::AccountsChanged { accounts } => {
            if store.snapshot().provider != Some(provider) {
                return;
            }
            let address = accounts.first().cloned();
            store.apply(StateUpdate {
                accounts: Some(accounts),
                address,
                ..Default::default()
            });
        }
        ExtensionEvent::NetworkChanged { network: native } => {
            if store.snapshot().provider != Some(provider) {
                return;
            }
            let canonical = network::from_provider_network(&native, provider);
            *session_network.write().expect("network lock poisoned") = canonical;
            lifecycle.discard("network changed by wallet");
            log::info!("{}: network changed to {}", provider, canonical);
        }
        ExtensionEvent::Disconnected => {
            if store.snapshot().provider != Some(provider) {
                return;
            }
            lifecycle.discard("wallet disconnected");
            store.apply(StateUpdate {
                connected: Some(false),
                is_connecting: Some(false),
                provider: Some(None),
                ..StateUpdate::cleared()
            });
            log::info!("{}: wallet dropped the session", provider);
        }
    }
}

/// Total output value of an unsigned PSBT, for the pre-broadcast local
/// balance check.
fn total_output_sats(unsigned_hex: &str) -> Result<u64, ConnectorError> {
    let bytes = hex::decode(unsigned_hex)
        .map_err(|e| ConnectorError::InvalidInput(format!("psbt not hex: {}", e)))?;
    let psbt = Psbt::deserialize(&bytes)
        .map_err(|e| ConnectorError::InvalidInput(format!("invalid psbt: {}", e)))?;
    Ok(psbt
        .unsigned_tx
        .output
        .iter()
        .map(|o| o.value.to_sat())
        .sum())
}

/// Raw transaction hex for relay broadcast: extract from a finalized PSBT,
/// or pass through payloads that are already raw transactions.
fn raw_tx_hex(signed_hex: &str) -> Result<String, ConnectorError> {
    let bytes = hex::decode(signed_hex)
        .map_err(|e| ConnectorError::InvalidInput(format!("payload not hex: {}", e)))?;
    match Psbt::deserialize(&bytes) {
        Ok(psbt) => {
            let tx = psbt.extract_tx().map_err(|e| {
                ConnectorError::InvalidInput(format!("transaction not finalized: {}", e))
            })?;
            Ok(bitcoin::consensus::encode::serialize_hex(&tx))
        }
        Err(_) => Ok(signed_hex.to_string()),
    }
}

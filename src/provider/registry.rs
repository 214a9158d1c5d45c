//! Provider detection and adapter instantiation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::extension::ExtensionHost;
use crate::persist::SessionPersistence;
use crate::store::{ConnectorStore, StateUpdate};

use super::{
    LeatherAdapter, MagicEdenAdapter, OkxAdapter, OpNetAdapter, OrangeAdapter, OylAdapter,
    PhantomAdapter, ProviderType, UnisatAdapter, WalletProvider, WizzAdapter, XverseAdapter,
};

/// Detects installed providers and hands out adapter singletons.
///
/// Exactly one adapter instance exists per provider identity for the whole
/// process, reused across connect/disconnect cycles within a session.
pub struct ProviderRegistry {
    store: Arc<ConnectorStore>,
    persistence: Arc<SessionPersistence>,
    host: Arc<dyn ExtensionHost>,
    adapters: Mutex<HashMap<ProviderType, Arc<dyn WalletProvider>>>,
}

impl ProviderRegistry {
    pub fn new(
        store: Arc<ConnectorStore>,
        persistence: Arc<SessionPersistence>,
        host: Arc<dyn ExtensionHost>,
    ) -> Self {
        Self {
            store,
            persistence,
            host,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &Arc<dyn ExtensionHost> {
        &self.host
    }

    /// Probe every provider binding and publish the presence map to the
    /// shared store. Re-run on a provider-announced signal so wallets
    /// installed mid-session become visible.
    pub fn detect(&self) -> HashMap<ProviderType, bool> {
        let presence: HashMap<ProviderType, bool> = ProviderType::ALL
            .iter()
            .map(|p| (*p, self.host.probe(*p)))
            .collect();
        let installed: Vec<&ProviderType> =
            presence.iter().filter(|(_, v)| **v).map(|(k, _)| k).collect();
        log::debug!("detected wallet extensions: {:?}", installed);
        self.store.apply(StateUpdate {
            has_provider: Some(presence.clone()),
            ..Default::default()
        });
        presence
    }

    /// The adapter singleton for a provider, created on first use.
    pub fn adapter(&self, provider: ProviderType) -> Arc<dyn WalletProvider> {
        let mut adapters = self.adapters.lock().expect("adapter map poisoned");
        adapters
            .entry(provider)
            .or_insert_with(|| self.instantiate(provider))
            .clone()
    }

    fn instantiate(&self, provider: ProviderType) -> Arc<dyn WalletProvider> {
        let store = self.store.clone();
        let persistence = self.persistence.clone();
        let host = self.host.clone();
        match provider {
            ProviderType::Unisat => Arc::new(UnisatAdapter::new(store, persistence, host)),
            ProviderType::Xverse => Arc::new(XverseAdapter::new(store, persistence, host)),
            ProviderType::Leather => Arc::new(LeatherAdapter::new(store, persistence, host)),
            ProviderType::Okx => Arc::new(OkxAdapter::new(store, persistence, host)),
            ProviderType::Oyl => Arc::new(OylAdapter::new(store, persistence, host)),
            ProviderType::MagicEden => Arc::new(MagicEdenAdapter::new(store, persistence, host)),
            ProviderType::Phantom => Arc::new(PhantomAdapter::new(store, persistence, host)),
            ProviderType::Wizz => Arc::new(WizzAdapter::new(store, persistence, host)),
            ProviderType::Orange => Arc::new(OrangeAdapter::new(store, persistence, host)),
            ProviderType::OpNet => Arc::new(OpNetAdapter::new(store, persistence, host)),
        }
    }
}

//! Session persistence.
//!
//! A reload should show the last known wallet identity before the
//! extension re-confirms it. Only the identity fields and balance are
//! persisted, keyed `<namespace>:<provider>:<field>`, values plain
//! strings. Restored values are provisional: they are overwritten by the
//! first live adapter response and never imply an active connection.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::PersistError;
use crate::provider::ProviderType;

const FIELD_ADDRESS: &str = "address";
const FIELD_PAYMENT_ADDRESS: &str = "payment-address";
const FIELD_PUBLIC_KEY: &str = "public-key";
const FIELD_PAYMENT_PUBLIC_KEY: &str = "payment-public-key";
const FIELD_BALANCE: &str = "balance";

/// Reserved key recording the most recently connected provider, so startup
/// knows which provider's fields to rehydrate.
const KEY_LAST_PROVIDER: &str = "last-provider";

/// Plain string key/value storage. Absence of a key means "never
/// persisted," not an error.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// The persisted slice of connection state for one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub address: String,
    pub payment_address: String,
    pub public_key: String,
    pub payment_public_key: String,
    pub balance: Option<u64>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
            && self.payment_address.is_empty()
            && self.public_key.is_empty()
            && self.payment_public_key.is_empty()
            && self.balance.is_none()
    }
}

/// Namespaced persistence over any [`SessionStore`] backend.
pub struct SessionPersistence {
    store: Box<dyn SessionStore>,
    namespace: String,
}

impl SessionPersistence {
    pub fn new(store: Box<dyn SessionStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn key(&self, provider: ProviderType, field: &str) -> String {
        format!("{}:{}:{}", self.namespace, provider, field)
    }

    /// Read back the persisted fields for a provider. Missing keys map to
    /// empty/absent values.
    pub fn restore(&self, provider: ProviderType) -> Result<SessionSnapshot, PersistError> {
        let get = |field: &str| self.store.get(&self.key(provider, field));
        let balance = match get(FIELD_BALANCE)? {
            Some(raw) => raw.parse::<u64>().ok(),
            None => None,
        };
        Ok(SessionSnapshot {
            address: get(FIELD_ADDRESS)?.unwrap_or_default(),
            payment_address: get(FIELD_PAYMENT_ADDRESS)?.unwrap_or_default(),
            public_key: get(FIELD_PUBLIC_KEY)?.unwrap_or_default(),
            payment_public_key: get(FIELD_PAYMENT_PUBLIC_KEY)?.unwrap_or_default(),
            balance,
        })
    }

    /// Overwrite the persisted fields for a provider.
    pub fn persist(
        &self,
        provider: ProviderType,
        snapshot: &SessionSnapshot,
    ) -> Result<(), PersistError> {
        self.store
            .set(&self.key(provider, FIELD_ADDRESS), &snapshot.address)?;
        self.store.set(
            &self.key(provider, FIELD_PAYMENT_ADDRESS),
            &snapshot.payment_address,
        )?;
        self.store
            .set(&self.key(provider, FIELD_PUBLIC_KEY), &snapshot.public_key)?;
        self.store.set(
            &self.key(provider, FIELD_PAYMENT_PUBLIC_KEY),
            &snapshot.payment_public_key,
        )?;
        match snapshot.balance {
            Some(balance) => self
                .store
                .set(&self.key(provider, FIELD_BALANCE), &balance.to_string())?,
            None => self.store.remove(&self.key(provider, FIELD_BALANCE))?,
        }
        Ok(())
    }

    /// Drop everything persisted for a provider (explicit disconnect).
    pub fn clear(&self, provider: ProviderType) -> Result<(), PersistError> {
        for field in [
            FIELD_ADDRESS,
            FIELD_PAYMENT_ADDRESS,
            FIELD_PUBLIC_KEY,
            FIELD_PAYMENT_PUBLIC_KEY,
            FIELD_BALANCE,
        ] {
            self.store.remove(&self.key(provider, field))?;
        }
        Ok(())
    }

    pub fn last_provider(&self) -> Result<Option<ProviderType>, PersistError> {
        let key = format!("{}:{}", self.namespace, KEY_LAST_PROVIDER);
        Ok(self
            .store
            .get(&key)?
            .and_then(|raw| raw.parse::<ProviderType>().ok()))
    }

    pub fn set_last_provider(&self, provider: Option<ProviderType>) -> Result<(), PersistError> {
        let key = format!("{}:{}", self.namespace, KEY_LAST_PROVIDER);
        match provider {
            Some(provider) => self.store.set(&key, provider.as_str()),
            None => self.store.remove(&key),
        }
    }
}

/// In-memory backend for tests and short-lived embedders.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().expect("store poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().expect("store poisoned").remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON document per namespace under a base
/// directory.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at the default location (`./.satlink`).
    pub fn new(namespace: &str) -> Self {
        Self::new_with_base_dir(PathBuf::from("./.satlink"), namespace)
    }

    /// Create a store with a custom base directory (for testing).
    pub fn new_with_base_dir(base_dir: PathBuf, namespace: &str) -> Self {
        Self {
            path: base_dir.join(format!("{}.json", namespace)),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, String>, PersistError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let _guard = self.lock.lock().expect("file store poisoned");
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let _guard = self.lock.lock().expect("file store poisoned");
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let _guard = self.lock.lock().expect("file store poisoned");
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

//! Shared reactive connection state.
//!
//! One process-wide container holds the connection/account state every
//! adapter reads and writes. Writes are applied as atomic field-set
//! batches; subscribers observe each field change with the changed key and
//! the old/new values, never a partially applied batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::provider::ProviderType;

/// Connection and account state shared by all adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    /// The active adapter, or none when disconnected.
    pub provider: Option<ProviderType>,
    pub address: String,
    pub payment_address: String,
    pub public_key: String,
    pub payment_public_key: String,
    /// Ordered address list exposed by the active provider.
    pub accounts: Vec<String>,
    /// Known balance in satoshis for the payment address.
    pub balance: Option<u64>,
    pub connected: bool,
    pub is_connecting: bool,
    /// True only until startup rehydration completes.
    pub is_initializing: bool,
    /// Install-presence per provider, refreshed on detection runs.
    pub has_provider: HashMap<ProviderType, bool>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            provider: None,
            address: String::new(),
            payment_address: String::new(),
            public_key: String::new(),
            payment_public_key: String::new(),
            accounts: Vec::new(),
            balance: None,
            connected: false,
            is_connecting: false,
            is_initializing: true,
            has_provider: ProviderType::ALL.iter().map(|p| (*p, false)).collect(),
        }
    }
}

/// Key identifying which state field changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Provider,
    Address,
    PaymentAddress,
    PublicKey,
    PaymentPublicKey,
    Accounts,
    Balance,
    Connected,
    IsConnecting,
    IsInitializing,
    HasProvider,
}

/// Old or new value of a single changed field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Provider(Option<ProviderType>),
    Text(String),
    Accounts(Vec<String>),
    Balance(Option<u64>),
    Flag(bool),
    Presence(HashMap<ProviderType, bool>),
}

/// One field-set batch. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub provider: Option<Option<ProviderType>>,
    pub address: Option<String>,
    pub payment_address: Option<String>,
    pub public_key: Option<String>,
    pub payment_public_key: Option<String>,
    pub accounts: Option<Vec<String>>,
    pub balance: Option<Option<u64>>,
    pub connected: Option<bool>,
    pub is_connecting: Option<bool>,
    pub is_initializing: Option<bool>,
    pub has_provider: Option<HashMap<ProviderType, bool>>,
}

impl StateUpdate {
    /// Batch clearing every per-connection field, applied on disconnect.
    pub fn cleared() -> Self {
        Self {
            address: Some(String::new()),
            payment_address: Some(String::new()),
            public_key: Some(String::new()),
            payment_public_key: Some(String::new()),
            accounts: Some(Vec::new()),
            balance: Some(None),
            ..Default::default()
        }
    }
}

type Subscriber = Box<dyn Fn(StateKey, &FieldValue, &FieldValue) + Send + Sync>;

/// Handle returned by [`ConnectorStore::subscribe`]; pass back to
/// [`ConnectorStore::unsubscribe`] to stop receiving changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// The single mutable resource of the connector.
///
/// Adapters own their provider's slice of fields by convention; the
/// connect/disconnect transition of `connected`/`provider` is written only
/// by the connection state machine.
pub struct ConnectorStore {
    state: RwLock<ConnectionState>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl ConnectorStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::default()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> ConnectionState {
        self.state.read().expect("state lock poisoned").clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(StateKey, &FieldValue, &FieldValue) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push((id, Box::new(callback)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .retain(|(sub_id, _)| *sub_id != id.0);
    }

    /// Apply a field-set batch atomically.
    ///
    /// All fields in the batch become visible to readers at once; only
    /// after the write lock is released are subscribers notified, one call
    /// per field whose value actually changed.
    pub fn apply(&self, update: StateUpdate) {
        let mut changes: Vec<(StateKey, FieldValue, FieldValue)> = Vec::new();
        {
            let mut state = self.state.write().expect("state lock poisoned");

            if let Some(provider) = update.provider {
                if state.provider != provider {
                    changes.push((
                        StateKey::Provider,
                        FieldValue::Provider(state.provider),
                        FieldValue::Provider(provider),
                    ));
                    state.provider = provider;
                }
            }
            if let Some(address) = update.address {
                if state.address != address {
                    changes.push((
                        StateKey::Address,
                        FieldValue::Text(std::mem::replace(&mut state.address, address.clone())),
                        FieldValue::Text(address),
                    ));
                }
            }
            if let Some(payment_address) = update.payment_address {
                if state.payment_address != payment_address {
                    changes.push((
                        StateKey::PaymentAddress,
                        FieldValue::Text(std::mem::replace(
                            &mut state.payment_address,
                            payment_address.clone(),
                        )),
                        FieldValue::Text(payment_address),
                    ));
                }
            }
            if let Some(public_key) = update.public_key {
                if state.public_key != public_key {
                    changes.push((
                        StateKey::PublicKey,
                        FieldValue::Text(std::mem::replace(
                            &mut state.public_key,
                            public_key.clone(),
                        )),
                        FieldValue::Text(public_key),
                    ));
                }
            }
            if let Some(payment_public_key) = update.payment_public_key {
                if state.payment_public_key != payment_public_key {
                    changes.push((
                        StateKey::PaymentPublicKey,
                        FieldValue::Text(std::mem::replace(
                            &mut state.payment_public_key,
                            payment_public_key.clone(),
                        )),
                        FieldValue::Text(payment_public_key),
                    ));
                }
            }
            if let Some(accounts) = update.accounts {
                if state.accounts != accounts {
                    changes.push((
                        StateKey::Accounts,
                        FieldValue::Accounts(std::mem::replace(
                            &mut state.accounts,
                            accounts.clone(),
                        )),
                        FieldValue::Accounts(accounts),
                    ));
                }
            }
            if let Some(balance) = update.balance {
                if state.balance != balance {
                    changes.push((
                        StateKey::Balance,
                        FieldValue::Balance(state.balance),
                        FieldValue::Balance(balance),
                    ));
                    state.balance = balance;
                }
            }
            if let Some(connected) = update.connected {
                if state.connected != connected {
                    changes.push((
                        StateKey::Connected,
                        FieldValue::Flag(state.connected),
                        FieldValue::Flag(connected),
                    ));
                    state.connected = connected;
                }
            }
            if let Some(is_connecting) = update.is_connecting {
                if state.is_connecting != is_connecting {
                    changes.push((
                        StateKey::IsConnecting,
                        FieldValue::Flag(state.is_connecting),
                        FieldValue::Flag(is_connecting),
                    ));
                    state.is_connecting = is_connecting;
                }
            }
            if let Some(is_initializing) = update.is_initializing {
                if state.is_initializing != is_initializing {
                    changes.push((
                        StateKey::IsInitializing,
                        FieldValue::Flag(state.is_initializing),
                        FieldValue::Flag(is_initializing),
                    ));
                    state.is_initializing = is_initializing;
                }
            }
            if let Some(has_provider) = update.has_provider {
                if state.has_provider != has_provider {
                    changes.push((
                        StateKey::HasProvider,
                        FieldValue::Presence(std::mem::replace(
                            &mut state.has_provider,
                            has_provider.clone(),
                        )),
                        FieldValue::Presence(has_provider),
                    ));
                }
            }
        }

        if changes.is_empty() {
            return;
        }
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        for (key, old, new) in &changes {
            for (_, callback) in subscribers.iter() {
                callback(*key, old, new);
            }
        }
    }

    /// Synchronous test-and-set for the connect-in-progress guard.
    ///
    /// Returns false when a connect is already pending, without touching
    /// any state. Runs entirely under the write lock so two racing connect
    /// attempts cannot both pass.
    pub fn try_begin_connect(&self) -> bool {
        let mut state = self.state.write().expect("state lock poisoned");
        if state.is_connecting {
            return false;
        }
        state.is_connecting = true;
        drop(state);

        let old = FieldValue::Flag(false);
        let new = FieldValue::Flag(true);
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        for (_, callback) in subscribers.iter() {
            callback(StateKey::IsConnecting, &old, &new);
        }
        true
    }
}

impl Default for ConnectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn batch_is_applied_atomically_and_notifies_per_field() {
        let store = ConnectorStore::new();
        let seen: Arc<Mutex<Vec<StateKey>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.subscribe(move |key, _, _| seen_clone.lock().unwrap().push(key));

        store.apply(StateUpdate {
            address: Some("bc1p...ab".into()),
            balance: Some(Some(50_000)),
            ..Default::default()
        });

        let state = store.snapshot();
        assert_eq!(state.address, "bc1p...ab");
        assert_eq!(state.balance, Some(50_000));
        let keys = seen.lock().unwrap();
        assert_eq!(keys.as_slice(), &[StateKey::Address, StateKey::Balance]);
    }

    #[test]
    fn unchanged_fields_do_not_notify() {
        let store = ConnectorStore::new();
        let count = Arc::new(Mutex::new(0usize));
        let count_clone = count.clone();
        store.subscribe(move |_, _, _| *count_clone.lock().unwrap() += 1);

        store.apply(StateUpdate {
            address: Some(String::new()),
            connected: Some(false),
            ..Default::default()
        });
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn subscriber_sees_old_and_new_values() {
        let store = ConnectorStore::new();
        let captured = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        store.subscribe(move |key, old, new| {
            if key == StateKey::Balance {
                *captured_clone.lock().unwrap() = Some((old.clone(), new.clone()));
            }
        });

        store.apply(StateUpdate {
            balance: Some(Some(1_000)),
            ..Default::default()
        });
        let (old, new) = captured.lock().unwrap().clone().unwrap();
        assert_eq!(old, FieldValue::Balance(None));
        assert_eq!(new, FieldValue::Balance(Some(1_000)));
    }

    #[test]
    fn connect_guard_rejects_second_attempt() {
        let store = ConnectorStore::new();
        assert!(store.try_begin_connect());
        assert!(!store.try_begin_connect());
        store.apply(StateUpdate {
            is_connecting: Some(false),
            ..Default::default()
        });
        assert!(store.try_begin_connect());
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = ConnectorStore::new();
        let count = Arc::new(Mutex::new(0usize));
        let count_clone = count.clone();
        let id = store.subscribe(move |_, _, _| *count_clone.lock().unwrap() += 1);
        store.unsubscribe(id);
        store.apply(StateUpdate {
            address: Some("bc1q".into()),
            ..Default::default()
        });
        assert_eq!(*count.lock().unwrap(), 0);
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use stasis_types::StoreId;

use crate::error::{StoreError, StoreResult};
use crate::listener::{ChangeListener, ListenerId, StoreChange};
use crate::value::Value;

/// A reactive key-value store.
///
/// `Store` is a shared handle: cloning it yields another handle to the same
/// backing mapping, and [`Store::id`] is the same for both. Nested stores are
/// held by handle, so placing one store inside another never copies it.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    id: StoreId,
    state: RwLock<StoreState>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_listener: AtomicU64,
}

#[derive(Default)]
struct StoreState {
    fields: BTreeMap<String, Value>,
    detached: bool,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_fields(BTreeMap::new())
    }

    /// Create a store whose backing state is `fields`.
    ///
    /// Values are moved in as-is; nested store handles keep their identity.
    pub fn from_fields<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::with_fields(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn with_fields(fields: BTreeMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: StoreId::next(),
                state: RwLock::new(StoreState {
                    fields,
                    detached: false,
                }),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Stable identity of this store.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Returns `true` if both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Current value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_state().fields.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read_state().fields.contains_key(key)
    }

    /// Field names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.read_state().fields.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_state().fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().fields.is_empty()
    }

    /// Shallow snapshot of all fields, sorted by key.
    ///
    /// Nested stores in the snapshot are handles to the live stores.
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.read_state()
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Write `value` under `key` and notify listeners.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> StoreResult<()> {
        let key = key.into();
        let value = value.into();
        let old = {
            let mut state = self.write_state();
            if state.detached {
                return Err(StoreError::Detached(self.inner.id));
            }
            state.fields.insert(key.clone(), value.clone())
        };
        trace!(store = %self.inner.id, key = %key, "store write");
        self.notify(StoreChange {
            store: self.inner.id,
            key,
            old,
            new: Some(value),
        });
        Ok(())
    }

    /// Remove `key`, returning its previous value. Listeners are notified
    /// only if the key was present.
    pub fn remove(&self, key: &str) -> StoreResult<Option<Value>> {
        let old = {
            let mut state = self.write_state();
            if state.detached {
                return Err(StoreError::Detached(self.inner.id));
            }
            state.fields.remove(key)
        };
        if old.is_some() {
            trace!(store = %self.inner.id, key, "store remove");
            self.notify(StoreChange {
                store: self.inner.id,
                key: key.to_string(),
                old: old.clone(),
                new: None,
            });
        }
        Ok(old)
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Reject all further writes. Reads keep returning the last state.
    pub fn detach(&self) {
        self.write_state().detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.read_state().detached
    }

    // ---------------------------------------------------------------
    // Listeners
    // ---------------------------------------------------------------

    /// Register a listener for writes to this store.
    pub fn subscribe(&self, listener: impl ChangeListener + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, change: StoreChange) {
        // Snapshot so listeners may subscribe, unsubscribe, or write re-entrantly.
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_change(&change);
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Store {}

impl Hash for Store {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Store {
    // Lists keys only: a store may contain itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("keys", &state.fields.keys().collect::<Vec<_>>())
            .field("detached", &state.detached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Reads and writes
    // -----------------------------------------------------------------------

    #[test]
    fn create_and_read() {
        let store = Store::from_fields([("mark", "WORKS")]);
        assert_eq!(store.get("mark"), Some(Value::from("WORKS")));
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("mark"));
    }

    #[test]
    fn set_writes_through() {
        let store = Store::new();
        assert!(store.is_empty());
        store.set("count", 1).unwrap();
        store.set("count", 2).unwrap();
        assert_eq!(store.get("count"), Some(Value::from(2)));
        assert_eq!(store.keys(), vec!["count".to_string()]);
    }

    #[test]
    fn remove_returns_previous_value() {
        let store = Store::from_fields([("a", 1), ("b", 2)]);
        assert_eq!(store.remove("a").unwrap(), Some(Value::from(1)));
        assert_eq!(store.remove("a").unwrap(), None);
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn fields_are_sorted_snapshot() {
        let store = Store::from_fields([("z", 1), ("a", 2)]);
        let keys: Vec<String> = store.fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "z"]);
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    #[test]
    fn clones_share_identity() {
        let a = Store::from_fields([("mark", "x")]);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert!(a.ptr_eq(&b));
        b.set("mark", "y").unwrap();
        assert_eq!(a.get("mark"), Some(Value::from("y")));
    }

    #[test]
    fn equal_contents_are_distinct_identities() {
        let a = Store::from_fields([("mark", "x")]);
        let b = Store::from_fields([("mark", "x")]);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn nested_store_is_not_copied() {
        let shared = Store::from_fields([("mark", "CHILD")]);
        let state = Store::from_fields([
            ("child", Value::from(&shared)),
            ("child2", Value::from(&shared)),
        ]);
        let child = state.get("child").unwrap();
        let child2 = state.get("child2").unwrap();
        assert!(child.as_store().unwrap().ptr_eq(&shared));
        assert_eq!(child, child2);
    }

    #[test]
    fn debug_on_self_referencing_store_terminates() {
        let store = Store::new();
        store.set("me", &store).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("Store"));
        assert!(debug.contains("me"));
        // Break the cycle so the test does not leak.
        store.remove("me").unwrap();
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    #[test]
    fn listeners_see_every_write() {
        let store = Store::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |change: &StoreChange| {
            sink.lock().unwrap().push((change.key.clone(), change.new.clone()));
        });

        store.set("a", 1).unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap(); // absent: no notification

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("a".to_string(), Some(Value::from(1))));
        assert_eq!(seen[1], ("a".to_string(), None));
    }

    #[test]
    fn change_carries_old_value() {
        let store = Store::from_fields([("n", 1)]);
        let old = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&old);
        store.subscribe(move |change: &StoreChange| {
            *sink.lock().unwrap() = change.old.clone();
        });
        store.set("n", 2).unwrap();
        assert_eq!(*old.lock().unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn listener_may_read_the_store() {
        let store = Store::new();
        let observed = Arc::new(Mutex::new(None));
        let (sink, reader) = (Arc::clone(&observed), store.clone());
        store.subscribe(move |change: &StoreChange| {
            *sink.lock().unwrap() = reader.get(&change.key);
        });
        store.set("k", "v").unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = Store::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = store.subscribe(move |_: &StoreChange| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.listener_count(), 1);
        store.set("x", 1).unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set("x", 2).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reads_do_not_notify() {
        let store = Store::from_fields([("x", 1)]);
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        store.subscribe(move |_: &StoreChange| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let _ = store.get("x");
        let _ = store.fields();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Detach
    // -----------------------------------------------------------------------

    #[test]
    fn detached_store_rejects_writes_but_keeps_reads() {
        let store = Store::from_fields([("mark", "kept")]);
        store.detach();
        assert!(store.is_detached());
        assert_eq!(store.set("mark", "lost"), Err(StoreError::Detached(store.id())));
        assert_eq!(store.remove("mark"), Err(StoreError::Detached(store.id())));
        assert_eq!(store.get("mark"), Some(Value::from("kept")));
    }
}

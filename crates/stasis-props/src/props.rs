use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use stasis_graph::HydrationSession;
use stasis_store::Value;
use stasis_types::{HostId, RefId};

use crate::error::{PropsError, PropsResult};

/// An attribute slot: a live value, or a pointer into a suspended table.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Live(Value),
    Deferred(RefId),
}

impl PropValue {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Attribute container bound to one host node.
///
/// `Props` is a handle; clones share the same entries.
#[derive(Clone)]
pub struct Props {
    inner: Arc<RwLock<PropsInner>>,
}

struct PropsInner {
    host: HostId,
    entries: BTreeMap<String, PropValue>,
    session: Option<Arc<HydrationSession>>,
}

impl Props {
    /// Empty container for `host`.
    pub fn new(host: HostId) -> Self {
        Self::with_entries(host, BTreeMap::new(), None)
    }

    /// Container whose attributes are the pointers `session` recorded for
    /// `host`, all deferred.
    pub fn deferred(host: HostId, session: Arc<HydrationSession>) -> Self {
        let entries = session
            .pointers(host)
            .map(|pointers| {
                pointers
                    .iter()
                    .map(|(name, id)| (name.clone(), PropValue::Deferred(*id)))
                    .collect()
            })
            .unwrap_or_default();
        Self::with_entries(host, entries, Some(session))
    }

    fn with_entries(
        host: HostId,
        entries: BTreeMap<String, PropValue>,
        session: Option<Arc<HydrationSession>>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PropsInner {
                host,
                entries,
                session,
            })),
        }
    }

    pub fn host(&self) -> HostId {
        self.read_inner().host
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------------------------------------------------------------
    // Attribute access
    // ---------------------------------------------------------------

    /// Value of `key`, materializing a deferred placeholder first.
    ///
    /// On success the placeholder is replaced by the live value. On failure
    /// it is left in place and the error is returned.
    pub fn read(&self, key: &str) -> PropsResult<Option<Value>> {
        match self.read_inner().entries.get(key) {
            None => return Ok(None),
            Some(PropValue::Live(value)) => return Ok(Some(value.clone())),
            Some(PropValue::Deferred(_)) => {}
        }

        let mut inner = self.write_inner();
        let id = match inner.entries.get(key) {
            None => return Ok(None),
            Some(PropValue::Live(value)) => return Ok(Some(value.clone())),
            Some(PropValue::Deferred(id)) => *id,
        };
        let value = inner.materialize(key, id)?;
        inner
            .entries
            .insert(key.to_string(), PropValue::Live(value.clone()));
        Ok(Some(value))
    }

    /// Store `value` under `key`, replacing any placeholder.
    pub fn write(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write_inner()
            .entries
            .insert(key.into(), PropValue::Live(value.into()));
    }

    /// Remove `key`. A deferred entry is dropped without materializing.
    pub fn remove(&self, key: &str) -> Option<PropValue> {
        self.write_inner().entries.remove(key)
    }

    /// Raw slot for `key`, without materializing.
    pub fn slot(&self, key: &str) -> Option<PropValue> {
        self.read_inner().entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read_inner().entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read_inner().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().entries.is_empty()
    }

    pub fn deferred_count(&self) -> usize {
        self.read_inner()
            .entries
            .values()
            .filter(|v| v.is_deferred())
            .count()
    }

    // ---------------------------------------------------------------
    // Whole-container operations
    // ---------------------------------------------------------------

    /// Materialize every deferred attribute.
    pub fn materialize_all(&self) -> PropsResult<()> {
        let mut inner = self.write_inner();
        let deferred: Vec<(String, RefId)> = inner
            .entries
            .iter()
            .filter_map(|(k, v)| match v {
                PropValue::Deferred(id) => Some((k.clone(), *id)),
                PropValue::Live(_) => None,
            })
            .collect();
        if deferred.is_empty() {
            return Ok(());
        }
        for (key, id) in &deferred {
            let value = inner.materialize(key, *id)?;
            inner.entries.insert(key.clone(), PropValue::Live(value));
        }
        debug!(host = %inner.host, count = deferred.len(), "materialized all attributes");
        Ok(())
    }

    /// Snapshot of all attributes as live values, materializing as needed.
    pub fn live_entries(&self) -> PropsResult<Vec<(String, Value)>> {
        self.materialize_all()?;
        let inner = self.read_inner();
        Ok(inner
            .entries
            .iter()
            .filter_map(|(k, v)| match v {
                PropValue::Live(value) => Some((k.clone(), value.clone())),
                PropValue::Deferred(_) => None,
            })
            .collect())
    }

    /// Live attribute values, skipping deferred ones.
    pub fn live_values(&self) -> Vec<Value> {
        self.read_inner()
            .entries
            .values()
            .filter_map(|v| match v {
                PropValue::Live(value) => Some(value.clone()),
                PropValue::Deferred(_) => None,
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    fn read_inner(&self) -> RwLockReadGuard<'_, PropsInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, PropsInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PropsInner {
    fn materialize(&self, key: &str, id: RefId) -> PropsResult<Value> {
        let session = self
            .session
            .as_ref()
            .ok_or(PropsError::NoSession { host: self.host })?;
        session
            .materialize(id)
            .map_err(|source| PropsError::Materialize {
                host: self.host,
                key: key.to_string(),
                source,
            })
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read_inner();
        f.debug_struct("Props")
            .field("host", &inner.host)
            .field("keys", &inner.entries.keys().collect::<Vec<_>>())
            .field("deferred", &inner.entries.values().filter(|v| v.is_deferred()).count())
            .finish()
    }
}

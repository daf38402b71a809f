//! Dehydration: live store graph → [`SerializedState`].

use std::collections::BTreeMap;

use tracing::{debug, trace};

use stasis_store::{Store, Value};
use stasis_types::{HostId, QrlDescriptor, RefId};

use crate::error::{GraphError, GraphResult};
use crate::identity::IdentityMap;
use crate::table::{table_id, Entry, SerializedState};

/// One dehydrate pass.
///
/// Hosts are added with [`Dehydrator::add_root`] in document order; the
/// identity map is shared across all of them, so a store reachable from two
/// hosts is written once. Stores are walked depth-first with an explicit
/// stack, so deeply nested or cyclic graphs cost one entry per distinct store
/// and never grow the call stack.
#[derive(Debug, Default)]
pub struct Dehydrator {
    identities: IdentityMap,
    /// Record slots are reserved when a store is first seen and filled when
    /// it is popped from `pending`.
    entries: Vec<Option<Entry>>,
    roots: BTreeMap<HostId, BTreeMap<String, RefId>>,
    pending: Vec<(Store, RefId, String)>,
    max_entries: Option<usize>,
}

impl Dehydrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`GraphError::TooLarge`] once the table would exceed `limit`
    /// entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            max_entries: Some(limit),
            ..Self::default()
        }
    }

    /// Number of distinct stores seen so far.
    pub fn store_count(&self) -> usize {
        self.identities.len()
    }

    /// Encode the attributes of `host`.
    ///
    /// Every store reachable from `attrs` is written before this returns.
    /// Unserializable values are reported with a path rooted at the host,
    /// e.g. `host:3.state.items[2]`.
    pub fn add_root<'a, I>(&mut self, host: HostId, attrs: I) -> GraphResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut pointers = BTreeMap::new();
        for (name, value) in attrs {
            let path = format!("{host}.{name}");
            let id = self.encode(value, &path)?;
            pointers.insert(name.to_string(), id);
        }
        self.drain()?;
        if !pointers.is_empty() {
            self.roots.entry(host).or_default().extend(pointers);
        }
        Ok(())
    }

    /// Close the pass and return the table.
    pub fn finish(self) -> GraphResult<SerializedState> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (index, slot) in self.entries.into_iter().enumerate() {
            let Some(entry) = slot else {
                let id = table_id(index)?;
                return Err(GraphError::corrupt(id, "record slot was never filled"));
            };
            entries.push(entry);
        }
        debug!(
            hosts = self.roots.len(),
            entries = entries.len(),
            stores = self.identities.len(),
            "dehydrated graph"
        );
        Ok(SerializedState {
            roots: self.roots,
            entries,
        })
    }

    // ---------------------------------------------------------------
    // Walk
    // ---------------------------------------------------------------

    fn encode(&mut self, value: &Value, path: &str) -> GraphResult<RefId> {
        match value {
            Value::Store(store) => {
                if let Some(id) = self.identities.get(store.id()) {
                    trace!(store = %store.id(), id = %id, "back-reference");
                    return Ok(id);
                }
                let id = self.reserve(None)?;
                self.identities.assign(store.id(), id);
                self.pending.push((store.clone(), id, path.to_string()));
                Ok(id)
            }
            Value::Qrl(qrl) => {
                let mut captures = Vec::with_capacity(qrl.captures().len());
                for (i, captured) in qrl.captures().iter().enumerate() {
                    captures.push(self.encode(captured, &format!("{path}[capture {i}]"))?);
                }
                self.reserve(Some(Entry::Qrl(QrlDescriptor::new(
                    qrl.chunk(),
                    qrl.symbol(),
                    captures,
                ))))
            }
            Value::List(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    ids.push(self.encode(item, &format!("{path}[{i}]"))?);
                }
                self.reserve(Some(Entry::List { items: ids }))
            }
            // JSON has no NaN or infinity; serde_json would write null.
            Value::Number(n) if !n.is_finite() => Err(GraphError::UnserializableValue {
                path: path.to_string(),
                type_name: value.type_name().to_string(),
            }),
            Value::Native(native) => Err(GraphError::UnserializableValue {
                path: path.to_string(),
                type_name: native.type_name().to_string(),
            }),
            scalar => match scalar.to_scalar() {
                Some(value) => self.reserve(Some(Entry::Scalar { value })),
                None => Err(GraphError::UnserializableValue {
                    path: path.to_string(),
                    type_name: scalar.type_name().to_string(),
                }),
            },
        }
    }

    fn drain(&mut self) -> GraphResult<()> {
        while let Some((store, id, path)) = self.pending.pop() {
            let mut fields = BTreeMap::new();
            for (key, value) in store.fields() {
                let field_id = self.encode(&value, &format!("{path}.{key}"))?;
                fields.insert(key, field_id);
            }
            self.entries[id.as_usize()] = Some(Entry::Record { fields });
        }
        Ok(())
    }

    fn reserve(&mut self, entry: Option<Entry>) -> GraphResult<RefId> {
        let count = self.entries.len() + 1;
        if let Some(limit) = self.max_entries {
            if count > limit {
                return Err(GraphError::TooLarge { count, limit });
            }
        }
        let id = table_id(self.entries.len())?;
        self.entries.push(entry);
        Ok(id)
    }
}

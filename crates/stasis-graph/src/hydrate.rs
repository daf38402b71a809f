//! Hydration: table ids → live values, one id at a time.
//!
//! Stores are registered in the [`ReconstructionMap`] before their fields are
//! populated. A field that points back at a store still being populated finds
//! it in the map, which is what lets cycles and shared references resolve to
//! the same instance instead of recursing or duplicating.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace, warn};

use stasis_store::{Qrl, Store, Value};
use stasis_types::{HostId, RefId};

use crate::error::{GraphError, GraphResult};
use crate::table::{Entry, SerializedState};

/// Table id → reconstructed store, for one hydration scope.
#[derive(Debug, Default)]
pub struct ReconstructionMap {
    stores: HashMap<RefId, Store>,
}

impl ReconstructionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RefId) -> Option<&Store> {
        self.stores.get(&id)
    }

    pub fn contains(&self, id: RefId) -> bool {
        self.stores.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn stores(&self) -> impl Iterator<Item = &Store> + '_ {
        self.stores.values()
    }
}

/// A single materialization request against a table and a map.
///
/// On failure every store this reconstructor registered is removed from the
/// map again and detached, so a later request starts from the last good state
/// and the abandoned stores reject writes.
pub struct Reconstructor<'a> {
    table: &'a SerializedState,
    map: &'a mut ReconstructionMap,
    /// Non-store entries currently being decoded, for self-containment checks.
    in_progress: HashSet<RefId>,
    /// Stores registered but not yet populated.
    pending: Vec<(Store, RefId)>,
    journal: Vec<RefId>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(table: &'a SerializedState, map: &'a mut ReconstructionMap) -> Self {
        Self {
            table,
            map,
            in_progress: HashSet::new(),
            pending: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Materialize entry `id`, populating every store it reaches.
    pub fn materialize(mut self, id: RefId) -> GraphResult<Value> {
        if id.as_usize() >= self.table.len() {
            return Err(GraphError::corrupt(
                id,
                format!("no such entry (table has {} entries)", self.table.len()),
            ));
        }
        match self.decode(id).and_then(|value| self.populate().map(|()| value)) {
            Ok(value) => {
                if !self.journal.is_empty() {
                    debug!(entry = %id, stores = self.journal.len(), "materialized");
                }
                Ok(value)
            }
            Err(err) => {
                for registered in &self.journal {
                    if let Some(store) = self.map.stores.remove(registered) {
                        store.detach();
                    }
                }
                warn!(entry = %id, rolled_back = self.journal.len(), error = %err, "materialization failed");
                Err(err)
            }
        }
    }

    fn populate(&mut self) -> GraphResult<()> {
        let table = self.table;
        while let Some((store, id)) = self.pending.pop() {
            let Some(Entry::Record { fields }) = table.entry(id) else {
                return Err(GraphError::corrupt(id, "registered store is not a record"));
            };
            for (key, field) in fields {
                let value = self.decode_ref(id, *field)?;
                store.set(key.clone(), value)?;
            }
        }
        Ok(())
    }

    /// Decode `target`, reporting a dangling pointer against `referrer`.
    fn decode_ref(&mut self, referrer: RefId, target: RefId) -> GraphResult<Value> {
        if target.as_usize() >= self.table.len() {
            return Err(GraphError::corrupt(
                referrer,
                format!(
                    "dangling reference to entry {target} (table has {} entries)",
                    self.table.len()
                ),
            ));
        }
        self.decode(target)
    }

    fn decode(&mut self, id: RefId) -> GraphResult<Value> {
        if let Some(store) = self.map.get(id) {
            trace!(entry = %id, "reuse reconstructed store");
            return Ok(Value::Store(store.clone()));
        }
        let table = self.table;
        let entry = table
            .entry(id)
            .ok_or_else(|| GraphError::corrupt(id, "no such entry"))?;
        match entry {
            Entry::Scalar { value } => Ok(Value::from(value.clone())),
            Entry::Record { .. } => {
                let store = Store::new();
                self.map.stores.insert(id, store.clone());
                self.journal.push(id);
                self.pending.push((store.clone(), id));
                Ok(Value::Store(store))
            }
            Entry::List { items } => {
                self.enter(id)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.decode_ref(id, *item)?);
                }
                self.in_progress.remove(&id);
                Ok(Value::List(values))
            }
            Entry::Qrl(descriptor) => {
                self.enter(id)?;
                let mut captures = Vec::with_capacity(descriptor.captures.len());
                for captured in &descriptor.captures {
                    captures.push(self.decode_ref(id, *captured)?);
                }
                self.in_progress.remove(&id);
                Ok(Value::Qrl(Qrl::new(
                    descriptor.chunk.as_str(),
                    descriptor.symbol.as_str(),
                    captures,
                )))
            }
        }
    }

    fn enter(&mut self, id: RefId) -> GraphResult<()> {
        if self.in_progress.insert(id) {
            Ok(())
        } else {
            Err(GraphError::corrupt(id, "value contains itself"))
        }
    }
}

/// A table plus the reconstruction map shared by everything hydrated from it.
///
/// Every Props container under one resumed root materializes through the same
/// session, so attributes on sibling nodes that pointed at the same store
/// before suspension get the same store back.
#[derive(Debug)]
pub struct HydrationSession {
    table: Arc<SerializedState>,
    map: Mutex<ReconstructionMap>,
}

impl HydrationSession {
    pub fn new(table: impl Into<Arc<SerializedState>>) -> Self {
        Self {
            table: table.into(),
            map: Mutex::new(ReconstructionMap::new()),
        }
    }

    pub fn table(&self) -> &SerializedState {
        &self.table
    }

    /// Attribute pointers the table recorded for `host`.
    pub fn pointers(&self, host: HostId) -> Option<&BTreeMap<String, RefId>> {
        self.table.root(host)
    }

    /// Materialize `id`, reusing any store this session already rebuilt.
    pub fn materialize(&self, id: RefId) -> GraphResult<Value> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        Reconstructor::new(&self.table, &mut map).materialize(id)
    }

    /// Materialize every attribute recorded for `host`.
    pub fn materialize_root(&self, host: HostId) -> GraphResult<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        if let Some(pointers) = self.table.root(host) {
            for (name, id) in pointers {
                out.insert(name.clone(), self.materialize(*id)?);
            }
        }
        Ok(out)
    }

    /// Handles to every store this session has rebuilt.
    pub fn stores(&self) -> Vec<Store> {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stores()
            .cloned()
            .collect()
    }

    /// Number of stores rebuilt so far.
    pub fn materialized_count(&self) -> usize {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StateCodec;
    use crate::dehydrate::Dehydrator;
    use stasis_types::{QrlDescriptor, Scalar};

    use proptest::prelude::*;

    const HOST: HostId = HostId::new(1);

    fn roundtrip(name: &str, value: &Value) -> HydrationSession {
        let mut dehydrator = Dehydrator::new();
        dehydrator.add_root(HOST, [(name, value)]).unwrap();
        HydrationSession::new(dehydrator.finish().unwrap())
    }

    /// Like [`roundtrip`], but through the sealed JSON envelope.
    fn wire_roundtrip(name: &str, value: &Value) -> HydrationSession {
        let mut dehydrator = Dehydrator::new();
        dehydrator.add_root(HOST, [(name, value)]).unwrap();
        let json = StateCodec::encode(&dehydrator.finish().unwrap()).unwrap();
        HydrationSession::new(StateCodec::decode(&json).unwrap())
    }

    fn root(session: &HydrationSession, name: &str) -> Store {
        let id = session.pointers(HOST).unwrap()[name];
        session.materialize(id).unwrap().as_store().unwrap().clone()
    }

    fn field_store(store: &Store, key: &str) -> Store {
        store.get(key).unwrap().as_store().unwrap().clone()
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    #[test]
    fn shared_child_comes_back_shared() {
        let shared = Store::from_fields([("mark", "CHILD")]);
        let state = Store::from_fields([
            ("mark", Value::from("WORKS")),
            ("child", Value::from(&shared)),
            ("child2", Value::from(&shared)),
        ]);
        let session = roundtrip("state", &Value::from(&state));

        let state = root(&session, "state");
        let child = field_store(&state, "child");
        assert!(child.ptr_eq(&field_store(&state, "child2")));
        assert!(!child.ptr_eq(&shared));
        assert_eq!(state.get("mark"), Some(Value::from("WORKS")));
        assert_eq!(child.get("mark"), Some(Value::from("CHILD")));
    }

    #[test]
    fn cycle_comes_back_as_cycle() {
        let foo = Store::from_fields([("mark", Value::from("foo")), ("bar", Value::from(Store::new()))]);
        let bar = Store::from_fields([("mark", Value::from("bar")), ("foo", Value::from(&foo))]);
        foo.set("bar", &bar).unwrap();
        let session = roundtrip("foo", &Value::from(&foo));

        let foo2 = root(&session, "foo");
        let bar2 = field_store(&foo2, "bar");
        assert!(field_store(&bar2, "foo").ptr_eq(&foo2));
        assert_eq!(bar2.get("mark"), Some(Value::from("bar")));
        // break the cycle so the test does not leak
        foo.remove("bar").unwrap();
        foo2.remove("bar").unwrap();
    }

    #[test]
    fn materialize_twice_returns_same_store() {
        let session = roundtrip("s", &Value::from(Store::from_fields([("n", 1)])));
        let first = root(&session, "s");
        let second = root(&session, "s");
        assert!(first.ptr_eq(&second));
        assert_eq!(session.materialized_count(), 1);
        assert!(session.stores()[0].ptr_eq(&first));
    }

    #[test]
    fn separate_sessions_do_not_alias() {
        let mut dehydrator = Dehydrator::new();
        let value = Value::from(Store::from_fields([("n", 1)]));
        dehydrator.add_root(HOST, [("s", &value)]).unwrap();
        let table = Arc::new(dehydrator.finish().unwrap());
        let a = HydrationSession::new(Arc::clone(&table));
        let b = HydrationSession::new(table);
        assert!(!root(&a, "s").ptr_eq(&root(&b, "s")));
    }

    #[test]
    fn qrl_captures_share_stores() {
        let counter = Store::from_fields([("count", 3)]);
        let qrl = Qrl::new("./c.js", "inc", vec![Value::from(&counter)]);
        let state = Store::from_fields([("handler", Value::from(qrl)), ("counter", Value::from(&counter))]);
        let session = roundtrip("state", &Value::from(&state));

        let state = root(&session, "state");
        let handler = state.get("handler").unwrap();
        let qrl = handler.as_qrl().unwrap();
        assert_eq!(qrl.chunk(), "./c.js");
        assert_eq!(qrl.symbol(), "inc");
        assert!(!qrl.is_resolved());
        assert_eq!(qrl.captures(), &[Value::from(field_store(&state, "counter"))]);
    }

    #[test]
    fn materialize_root_returns_all_attributes() {
        let store = Value::from(Store::new());
        let label = Value::from("hello");
        let mut dehydrator = Dehydrator::new();
        dehydrator
            .add_root(HOST, [("store", &store), ("label", &label)])
            .unwrap();
        let session = HydrationSession::new(dehydrator.finish().unwrap());
        let attrs = session.materialize_root(HOST).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["label"], Value::from("hello"));
        assert!(session.materialize_root(HostId::new(9)).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Corruption
    // -----------------------------------------------------------------------

    /// Eleven entries (ids 0..=10); entry 0 is a record whose `child` field
    /// points at id 99.
    fn corrupt_table() -> SerializedState {
        let mut entries = vec![Entry::Record {
            fields: BTreeMap::from([
                ("mark".to_string(), RefId::new(1)),
                ("ok".to_string(), RefId::new(2)),
                ("child".to_string(), RefId::new(99)),
            ]),
        }];
        entries.push(Entry::Scalar {
            value: Scalar::from("WORKS"),
        });
        entries.push(Entry::Record {
            fields: BTreeMap::new(),
        });
        while entries.len() < 11 {
            entries.push(Entry::Scalar { value: Scalar::Null });
        }
        let mut state = SerializedState::new();
        state.entries = entries;
        state
            .roots
            .insert(HOST, BTreeMap::from([("state".to_string(), RefId::new(0))]));
        state
    }

    #[test]
    fn dangling_reference_is_corrupt_graph() {
        let session = HydrationSession::new(corrupt_table());
        let err = session.materialize(RefId::new(0)).unwrap_err();
        match err {
            GraphError::CorruptGraph { id, reason } => {
                assert_eq!(id, RefId::new(0));
                assert!(reason.contains("99"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.materialized_count(), 0);
    }

    #[test]
    fn failure_leaves_earlier_stores_intact() {
        let session = HydrationSession::new(corrupt_table());
        let ok = session.materialize(RefId::new(2)).unwrap();
        assert!(session.materialize(RefId::new(0)).is_err());
        assert_eq!(session.materialized_count(), 1);
        let again = session.materialize(RefId::new(2)).unwrap();
        assert_eq!(ok, again);
    }

    #[test]
    fn out_of_range_root_is_corrupt() {
        let session = HydrationSession::new(corrupt_table());
        assert!(matches!(
            session.materialize(RefId::new(11)),
            Err(GraphError::CorruptGraph { .. })
        ));
    }

    #[test]
    fn self_containing_list_is_corrupt() {
        let mut state = SerializedState::new();
        state.entries = vec![Entry::List {
            items: vec![RefId::new(0)],
        }];
        let session = HydrationSession::new(state);
        assert!(matches!(
            session.materialize(RefId::new(0)),
            Err(GraphError::CorruptGraph { .. })
        ));
    }

    #[test]
    fn qrl_capture_problems_are_corrupt() {
        for captures in [vec![RefId::new(5)], vec![RefId::new(0)]] {
            let mut state = SerializedState::new();
            state.entries = vec![Entry::Qrl(QrlDescriptor::new("c", "s", captures))];
            let session = HydrationSession::new(state);
            assert!(matches!(
                session.materialize(RefId::new(0)),
                Err(GraphError::CorruptGraph { .. })
            ));
        }
    }

    #[test]
    fn qrl_names_survive_the_wire() {
        let counter = Store::from_fields([("count", 0)]);
        for (chunk, symbol) in [("./pages/[id].js", "onClick"), ("", "s"), ("./c.js", "a#b")] {
            let qrl = Qrl::new(chunk, symbol, vec![Value::from(&counter)]);
            let session = wire_roundtrip("h", &Value::from(qrl));
            let id = session.pointers(HOST).unwrap()["h"];
            let value = session.materialize(id).unwrap();
            let rebuilt = value.as_qrl().unwrap();
            assert_eq!(rebuilt.chunk(), chunk);
            assert_eq!(rebuilt.symbol(), symbol);
            let captured = rebuilt.captures()[0].as_store().unwrap();
            assert_eq!(captured.get("count"), Some(Value::from(0)));
        }
    }

    // -----------------------------------------------------------------------
    // Property: arbitrary sharing/cycle topologies survive a round trip
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn topology_roundtrip(
            count in 1usize..12,
            edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            let stores: Vec<Store> = (0..count)
                .map(|i| Store::from_fields([("mark", i as i32)]))
                .collect();
            let mut expected = Vec::new();
            for (n, (from, to)) in edges.iter().enumerate() {
                let (from, to) = (from % count, to % count);
                let key = format!("e{n}");
                stores[from].set(key.clone(), &stores[to]).unwrap();
                expected.push((from, key, to));
            }
            let holder = Value::List(stores.iter().map(Value::from).collect());
            let session = roundtrip("all", &holder);

            let id = session.pointers(HOST).unwrap()["all"];
            let rebuilt = session.materialize(id).unwrap();
            let rebuilt: Vec<Store> = rebuilt
                .as_list()
                .unwrap()
                .iter()
                .map(|v| v.as_store().unwrap().clone())
                .collect();
            prop_assert_eq!(rebuilt.len(), count);
            prop_assert_eq!(session.materialized_count(), count);

            for (i, store) in rebuilt.iter().enumerate() {
                prop_assert_eq!(store.get("mark"), Some(Value::from(i as i32)));
            }
            for (from, key, to) in &expected {
                let target = field_store(&rebuilt[*from], key);
                prop_assert!(target.ptr_eq(&rebuilt[*to]));
            }

            for store in stores.iter().chain(&rebuilt) {
                for key in store.keys() {
                    if key != "mark" {
                        store.remove(&key).unwrap();
                    }
                }
            }
        }
    }

    proptest! {
        #[test]
        fn qrl_names_roundtrip_through_wire(
            chunk in any::<String>().prop_filter("non-empty", |s| !s.is_empty()),
            symbol in any::<String>().prop_filter("non-empty", |s| !s.is_empty()),
            text in any::<String>(),
        ) {
            let qrl = Qrl::new(chunk.clone(), symbol.clone(), vec![Value::from(text.clone())]);
            let session = wire_roundtrip("h", &Value::from(qrl));
            let id = session.pointers(HOST).unwrap()["h"];
            let value = session.materialize(id).unwrap();
            let rebuilt = value.as_qrl().unwrap();
            prop_assert_eq!(rebuilt.chunk(), chunk.as_str());
            prop_assert_eq!(rebuilt.symbol(), symbol.as_str());
            prop_assert_eq!(rebuilt.captures(), &[Value::from(text)][..]);
        }
    }
}

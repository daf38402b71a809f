use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stasis_graph::{Dehydrator, Envelope, GraphError, HydrationSession, SerializedState, StateCodec};
use stasis_host::{HostError, HostTree};
use stasis_props::{Props, PropsTable};
use stasis_store::{Store, Value};
use stasis_types::{HostId, StoreId};

use crate::config::RuntimeConfig;
use crate::error::{SdkError, SdkResult};

/// Suspended form of a document.
#[derive(Serialize, Deserialize)]
struct Page {
    tree: HostTree,
    states: BTreeMap<HostId, Envelope>,
}

/// A host tree together with its Props and attached serialized state.
#[derive(Debug)]
pub struct Document {
    config: RuntimeConfig,
    tree: HostTree,
    props: PropsTable,
    /// Table attached to each dehydrated (or resumed) root.
    attached: BTreeMap<HostId, SerializedState>,
    /// One hydration scope per resumed root.
    sessions: BTreeMap<HostId, Arc<HydrationSession>>,
}

impl Document {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            tree: HostTree::new(),
            props: PropsTable::new(),
            attached: BTreeMap::new(),
            sessions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn tree(&self) -> &HostTree {
        &self.tree
    }

    pub fn root(&self) -> HostId {
        self.tree.document()
    }

    // ---- Host tree ----

    pub fn create_element(&mut self, tag: impl Into<String>) -> HostId {
        self.tree.create_element(tag)
    }

    pub fn append_child(&mut self, parent: HostId, child: HostId) -> SdkResult<()> {
        Ok(self.tree.append_child(parent, child)?)
    }

    /// Remove `host` and its subtree.
    ///
    /// The Props of every removed node are dropped. Stores that were
    /// reachable from those Props and are not reachable from any remaining
    /// Props (or from a surviving hydration session) are detached, so later
    /// writes through stale handles fail instead of changing live state.
    pub fn remove_node(&mut self, host: HostId) -> SdkResult<Vec<HostId>> {
        let removed = self.tree.remove(host)?;

        let mut dropped = Vec::new();
        for id in &removed {
            if let Some(props) = self.props.remove(*id) {
                dropped.extend(props.live_values());
            }
            self.sessions.remove(id);
            self.attached.remove(id);
        }

        let mut candidates = HashMap::new();
        collect_stores(dropped, &mut candidates);

        let mut survivors: Vec<Value> = Vec::new();
        for (_, props) in self.props.iter() {
            survivors.extend(props.live_values());
        }
        for session in self.sessions.values() {
            survivors.extend(session.stores().into_iter().map(Value::Store));
        }
        let mut reachable = HashMap::new();
        collect_stores(survivors, &mut reachable);

        let mut detached = 0;
        for (id, store) in candidates {
            if !reachable.contains_key(&id) {
                store.detach();
                detached += 1;
            }
        }
        debug!(root = %host, nodes = removed.len(), detached, "removed node");
        Ok(removed)
    }

    // ---- Props ----

    /// The Props container for `host`, creating it if absent.
    ///
    /// Under a resumed root the new container starts with the attributes the
    /// suspended table recorded for `host`, all deferred.
    pub fn get_props(&mut self, host: HostId) -> SdkResult<Props> {
        if !self.tree.contains(host) {
            return Err(HostError::NodeNotFound(host).into());
        }
        if let Some(props) = self.props.get(host) {
            return Ok(props);
        }
        Ok(match self.session_for(host) {
            Some(session) => self.props.get_or_hydrate(host, &session),
            None => self.props.get_or_create(host),
        })
    }

    /// The hydration session of the nearest resumed ancestor-or-self.
    fn session_for(&self, host: HostId) -> Option<Arc<HydrationSession>> {
        let mut current = Some(host);
        while let Some(id) = current {
            if let Some(session) = self.sessions.get(&id) {
                return Some(Arc::clone(session));
            }
            current = self.tree.parent(id);
        }
        None
    }

    // ---- Dehydrate ----

    /// Serialize every Props container under `root` and attach the table to
    /// `root`.
    ///
    /// Hosts are visited in document order. Deferred attributes are
    /// materialized first, so the new table carries everything the previous
    /// one did. Hydration sessions at or below `root` are then discarded, as
    /// are tables attached to nodes strictly below `root`, which the new
    /// table supersedes.
    pub fn dehydrate(&mut self, root: HostId) -> SdkResult<&SerializedState> {
        if !self.tree.contains(root) {
            return Err(HostError::NodeNotFound(root).into());
        }
        let hosts = self.tree.descendants(root);
        let mut dehydrator = match self.config.max_entries {
            Some(limit) => Dehydrator::with_limit(limit),
            None => Dehydrator::new(),
        };
        for host in &hosts {
            let props = match self.props.get(*host) {
                Some(props) => props,
                None => match self.session_for(*host) {
                    Some(session) if session.pointers(*host).is_some() => {
                        self.props.get_or_hydrate(*host, &session)
                    }
                    _ => continue,
                },
            };
            let entries = props.live_entries()?;
            dehydrator.add_root(*host, entries.iter().map(|(k, v)| (k.as_str(), v)))?;
        }
        let state = dehydrator.finish()?;

        for host in &hosts {
            self.sessions.remove(host);
            if *host != root {
                self.attached.remove(host);
            }
        }
        info!(
            root = %root,
            hosts = state.roots.len(),
            entries = state.len(),
            stores = state.record_count(),
            "dehydrated"
        );
        self.attached.insert(root, state);
        Ok(&self.attached[&root])
    }

    /// The table attached to `root` by the last dehydrate or resume.
    pub fn serialized(&self, root: HostId) -> Option<&SerializedState> {
        self.attached.get(&root)
    }

    // ---- Suspend / resume ----

    /// The host tree and every attached table, as JSON.
    ///
    /// Tables are written as last dehydrated; mutations made since then are
    /// not included.
    pub fn suspend(&self) -> SdkResult<String> {
        let mut states = BTreeMap::new();
        for (root, state) in &self.attached {
            states.insert(*root, StateCodec::seal(state)?);
        }
        let page = Page {
            tree: self.tree.clone(),
            states,
        };
        serde_json::to_string(&page).map_err(|e| SdkError::Serialization(e.to_string()))
    }

    /// Rebuild a document from [`Document::suspend`] output.
    ///
    /// No store is rebuilt here; every attribute starts deferred and is
    /// materialized on first read.
    pub fn resume(json: &str, config: RuntimeConfig) -> SdkResult<Self> {
        let page: Page =
            serde_json::from_str(json).map_err(|e| SdkError::Serialization(e.to_string()))?;
        page.tree.validate()?;
        let mut document = Self::new(config);
        document.tree = page.tree;

        for (root, envelope) in page.states {
            if !document.tree.contains(root) {
                return Err(HostError::NodeNotFound(root).into());
            }
            let state = StateCodec::unseal(envelope, document.config.verify_digest)?;
            if let Some(limit) = document.config.max_entries {
                if state.len() > limit {
                    return Err(GraphError::TooLarge {
                        count: state.len(),
                        limit,
                    }
                    .into());
                }
            }
            if document.config.validate_on_resume {
                state.validate()?;
            }
            info!(root = %root, entries = state.len(), "resumed");
            document
                .sessions
                .insert(root, Arc::new(HydrationSession::new(state.clone())));
            document.attached.insert(root, state);
        }
        Ok(document)
    }

    pub fn suspend_to_path(&self, path: impl AsRef<Path>) -> SdkResult<()> {
        std::fs::write(path, self.suspend()?)?;
        Ok(())
    }

    pub fn resume_from_path(path: impl AsRef<Path>, config: RuntimeConfig) -> SdkResult<Self> {
        Self::resume(&std::fs::read_to_string(path)?, config)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Every store reachable from `values`, keyed by identity.
fn collect_stores(values: Vec<Value>, out: &mut HashMap<StoreId, Store>) {
    let mut stack = values;
    while let Some(value) = stack.pop() {
        match value {
            Value::Store(store) => {
                if out.contains_key(&store.id()) {
                    continue;
                }
                stack.extend(store.fields().into_iter().map(|(_, v)| v));
                out.insert(store.id(), store);
            }
            Value::List(items) => stack.extend(items),
            Value::Qrl(qrl) => stack.extend(qrl.captures().iter().cloned()),
            _ => {}
        }
    }
}
